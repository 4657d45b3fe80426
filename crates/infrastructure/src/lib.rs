//! 基础设施层实现。
//!
//! 提供 Redis Stream 通知总线、远程端点 HTTP 客户端，以及按配置装配运行时组件的构建器。

pub mod builder;
pub mod error;
pub mod http_endpoint;
pub mod redis_bus;

pub use builder::Infrastructure;
pub use error::InfrastructureError;
pub use http_endpoint::HttpBackendEndpoint;
pub use redis_bus::RedisStreamBus;
