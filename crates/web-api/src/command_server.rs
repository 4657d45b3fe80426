//! 命令服务器
//!
//! `POST /internal/{endpoint}/commands` 接收 `{command, payload}`，交给本进程承载的端点执行，
//! 原样返回回复信封。另一个网关实例把本实例配置为 `http` 端点即可远程调用。

use axum::{
    extract::{Path, State},
    routing::post,
    Json, Router,
};
use domain::{CommandReply, CommandRequest, EndpointId};
use tracing::debug;

use crate::{error::ApiError, state::AppState};

pub(crate) fn routes() -> Router<AppState> {
    Router::new().route("/internal/{endpoint}/commands", post(execute_command))
}

async fn execute_command(
    State(state): State<AppState>,
    Path(endpoint): Path<String>,
    Json(request): Json<CommandRequest>,
) -> Result<Json<CommandReply>, ApiError> {
    let id = EndpointId::new(endpoint);
    let local = state
        .local_endpoints
        .get(&id)
        .ok_or_else(|| ApiError::not_found(format!("endpoint `{}` is not hosted here", id)))?;

    debug!(endpoint = %id, command = %request.command, "执行远程命令");
    Ok(Json(local.execute(request).await))
}
