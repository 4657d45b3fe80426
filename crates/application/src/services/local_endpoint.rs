//! 进程内端点
//!
//! 显式的命令处理器表。处理器返回 `CommandOutput` 或 `CommandFailure`，
//! 在端点边界统一转换为回复信封；处理器 panic 也只影响当前这次调用。

use std::collections::BTreeMap;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use async_trait::async_trait;
use domain::{CommandName, CommandReply, CommandRequest, EndpointId};
use futures::future::BoxFuture;
use futures::FutureExt;
use serde_json::Value;
use tracing::{error, warn};

use crate::endpoint::{BackendEndpoint, EndpointError};
use crate::error::CommandFailure;

/// 命令处理成功的输出
#[derive(Debug, Clone, PartialEq)]
pub struct CommandOutput {
    pub message: String,
    pub data: Value,
}

impl CommandOutput {
    pub fn new(message: impl Into<String>, data: Value) -> Self {
        Self {
            message: message.into(),
            data,
        }
    }
}

pub type CommandResult = Result<CommandOutput, CommandFailure>;

type Handler = Arc<dyn Fn(Value) -> BoxFuture<'static, CommandResult> + Send + Sync>;

pub struct LocalEndpointBuilder {
    id: EndpointId,
    handlers: BTreeMap<CommandName, Handler>,
}

impl LocalEndpointBuilder {
    /// 注册命令处理器，同名命令以最后一次注册为准
    pub fn command<F, Fut>(mut self, name: impl Into<CommandName>, handler: F) -> Self
    where
        F: Fn(Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = CommandResult> + Send + 'static,
    {
        let handler: Handler = Arc::new(move |payload| handler(payload).boxed());
        self.handlers.insert(name.into(), handler);
        self
    }

    /// 注册携带共享状态的命令处理器
    pub fn command_with<S, F, Fut>(
        self,
        name: impl Into<CommandName>,
        state: Arc<S>,
        handler: F,
    ) -> Self
    where
        S: Send + Sync + 'static,
        F: Fn(Arc<S>, Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = CommandResult> + Send + 'static,
    {
        self.command(name, move |payload| handler(state.clone(), payload))
    }

    pub fn build(self) -> LocalEndpoint {
        LocalEndpoint {
            id: self.id,
            handlers: self.handlers,
        }
    }
}

/// 进程内端点
pub struct LocalEndpoint {
    id: EndpointId,
    handlers: BTreeMap<CommandName, Handler>,
}

impl LocalEndpoint {
    pub fn builder(id: EndpointId) -> LocalEndpointBuilder {
        LocalEndpointBuilder {
            id,
            handlers: BTreeMap::new(),
        }
    }

    /// 执行命令并生成回复信封
    pub async fn execute(&self, request: CommandRequest) -> CommandReply {
        let Some(handler) = self.handlers.get(&request.command) else {
            warn!(endpoint = %self.id, command = %request.command, "未知命令");
            return CommandReply::error(format!("Unknown command `{}`", request.command));
        };

        match AssertUnwindSafe(handler(request.payload)).catch_unwind().await {
            Ok(Ok(output)) => CommandReply::success(output.message, output.data),
            Ok(Err(CommandFailure::NotFound(message))) => CommandReply::not_found(message),
            Ok(Err(CommandFailure::Failed(message))) => CommandReply::error(message),
            Err(_) => {
                error!(endpoint = %self.id, command = %request.command, "命令处理器 panic");
                CommandReply::error(format!(
                    "An error occurred while executing `{}`",
                    request.command
                ))
            }
        }
    }
}

#[async_trait]
impl BackendEndpoint for LocalEndpoint {
    fn id(&self) -> EndpointId {
        self.id.clone()
    }

    fn commands(&self) -> Vec<CommandName> {
        self.handlers.keys().cloned().collect()
    }

    async fn invoke(&self, request: CommandRequest) -> Result<Value, EndpointError> {
        Ok(self.execute(request).await.into_value())
    }
}
