//! Web API 层。
//!
//! 提供 Axum 路由：网关资源路由把 HTTP 请求转换为后端命令并交给分发器，
//! 命令服务器把本进程承载的端点暴露给其他网关实例。

mod command_server;
mod error;
mod routes;
mod state;

pub use error::{ApiError, ErrorBody};
pub use routes::{router, GATEWAY_HEADER};
pub use state::AppState;
