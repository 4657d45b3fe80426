//! 通用 CRUD 命令处理器

use std::sync::Arc;

use serde_json::Value;

use super::local_endpoint::{CommandOutput, CommandResult, LocalEndpointBuilder};
use super::record_store::{parse_id, parse_update, RecordStore};
use crate::catalog::{CrudOp, ResourceCommands};

/// 为资源声明的每个操作注册处理器
pub fn register_crud(
    builder: LocalEndpointBuilder,
    resource: &ResourceCommands,
    store: Arc<RecordStore>,
) -> LocalEndpointBuilder {
    resource
        .commands
        .iter()
        .fold(builder, |builder, (op, command)| match op {
            CrudOp::List => builder.command_with(*command, store.clone(), list),
            CrudOp::Create => builder.command_with(*command, store.clone(), create),
            CrudOp::Get => builder.command_with(*command, store.clone(), get),
            CrudOp::Update => builder.command_with(*command, store.clone(), update),
            CrudOp::Delete => builder.command_with(*command, store.clone(), delete),
        })
}

async fn list(store: Arc<RecordStore>, _payload: Value) -> CommandResult {
    Ok(CommandOutput::new(
        format!("{} retrieved successfully", store.plural()),
        Value::Array(store.list()),
    ))
}

async fn create(store: Arc<RecordStore>, payload: Value) -> CommandResult {
    let record = store.insert(payload)?;
    Ok(CommandOutput::new(
        format!("{} created successfully", store.singular()),
        record,
    ))
}

async fn get(store: Arc<RecordStore>, payload: Value) -> CommandResult {
    let record = store.get(parse_id(&payload)?)?;
    Ok(CommandOutput::new(
        format!("{} retrieved successfully", store.singular()),
        record,
    ))
}

async fn update(store: Arc<RecordStore>, payload: Value) -> CommandResult {
    let (id, changes) = parse_update(payload)?;
    let record = store.update(id, changes)?;
    Ok(CommandOutput::new(
        format!("{} updated successfully", store.singular()),
        record,
    ))
}

async fn delete(store: Arc<RecordStore>, payload: Value) -> CommandResult {
    let record = store.remove(parse_id(&payload)?)?;
    Ok(CommandOutput::new(
        format!("{} deleted successfully", store.singular()),
        record,
    ))
}
