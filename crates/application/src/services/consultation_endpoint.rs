use std::sync::Arc;

use domain::EndpointId;

use super::crud::register_crud;
use super::local_endpoint::LocalEndpoint;
use super::record_store::RecordStore;
use crate::catalog::CONSULTATION_RESOURCES;

/// 构建会诊端点：会诊及其关联文书各自一张记录表
pub fn consultation_endpoint() -> LocalEndpoint {
    CONSULTATION_RESOURCES
        .iter()
        .fold(
            LocalEndpoint::builder(EndpointId::consultations()),
            |builder, resource| {
                register_crud(builder, resource, Arc::new(RecordStore::for_resource(resource)))
            },
        )
        .build()
}
