//! 后端端点抽象
//!
//! 端点只通过命名命令对外暴露。分发器负责限定等待时间，端点本身不负责。

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use domain::{CommandName, CommandRequest, EndpointId};
use serde_json::Value;
use thiserror::Error;

/// 端点调用的传输层错误
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EndpointError {
    /// 无法建立连接或请求在传输层失败
    #[error("endpoint unreachable: {0}")]
    Unreachable(String),
    /// 回复无法解析
    #[error("malformed reply: {0}")]
    MalformedReply(String),
}

/// 后端端点
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait BackendEndpoint: Send + Sync {
    /// 端点标识
    fn id(&self) -> EndpointId;

    /// 端点声明的命令词汇表
    fn commands(&self) -> Vec<CommandName>;

    /// 调用命令，返回原始回复信封
    async fn invoke(&self, request: CommandRequest) -> Result<Value, EndpointError>;
}

/// 端点注册表
#[derive(Clone, Default)]
pub struct EndpointRegistry {
    endpoints: BTreeMap<EndpointId, Arc<dyn BackendEndpoint>>,
}

impl EndpointRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 注册端点（同名端点会被替换）
    pub fn register(&mut self, endpoint: Arc<dyn BackendEndpoint>) -> &mut Self {
        self.endpoints.insert(endpoint.id(), endpoint);
        self
    }

    pub fn with(mut self, endpoint: Arc<dyn BackendEndpoint>) -> Self {
        self.register(endpoint);
        self
    }

    pub fn get(&self, id: &EndpointId) -> Option<Arc<dyn BackendEndpoint>> {
        self.endpoints.get(id).cloned()
    }

    pub fn contains(&self, id: &EndpointId) -> bool {
        self.endpoints.contains_key(id)
    }

    /// 端点是否声明了该命令
    pub fn declares(&self, id: &EndpointId, command: &CommandName) -> bool {
        self.endpoints
            .get(id)
            .map(|endpoint| endpoint.commands().contains(command))
            .unwrap_or(false)
    }

    pub fn ids(&self) -> impl Iterator<Item = &EndpointId> {
        self.endpoints.keys()
    }

    pub fn len(&self) -> usize {
        self.endpoints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.endpoints.is_empty()
    }
}

impl std::fmt::Debug for EndpointRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EndpointRegistry")
            .field("endpoints", &self.endpoints.keys().collect::<Vec<_>>())
            .finish()
    }
}
