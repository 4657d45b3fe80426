//! 命令分发器
//!
//! 调用后端端点，在等待上限内竞争回复，并把原始信封归一化为
//! [`ClassifiedResult`]。分发器无状态：不重试、不缓存，错误不会越过边界。

use std::sync::Arc;
use std::time::Duration;

use domain::{
    ClassifiedResult, CommandKind, CommandName, CommandReply, CommandRequest, EndpointId,
    ReplyStatus,
};
use serde_json::Value;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::endpoint::{EndpointError, EndpointRegistry};
use crate::routing::CommandBinding;

/// 后端没有给出消息时使用的“未找到”提示
pub const DEFAULT_NOT_FOUND_MESSAGE: &str = "Resource not found";

/// 命令分发器
#[derive(Clone, Debug)]
pub struct Dispatcher {
    registry: Arc<EndpointRegistry>,
    default_timeout: Duration,
}

impl Dispatcher {
    pub fn new(registry: EndpointRegistry, default_timeout: Duration) -> Self {
        Self {
            registry: Arc::new(registry),
            default_timeout,
        }
    }

    pub fn registry(&self) -> &EndpointRegistry {
        &self.registry
    }

    pub fn default_timeout(&self) -> Duration {
        self.default_timeout
    }

    /// 按路由绑定分发
    pub async fn dispatch(&self, binding: &CommandBinding, payload: Value) -> ClassifiedResult {
        self.dispatch_to(
            &binding.endpoint,
            &binding.command,
            binding.kind,
            payload,
            binding.effective_timeout(self.default_timeout),
        )
        .await
    }

    /// 直接向端点分发命令
    ///
    /// `timeout` 为 `None` 时一直等待端点回复。超时后调用被放弃，
    /// 端点任务继续在后台运行直到自行结束，其结果被丢弃。
    pub async fn dispatch_to(
        &self,
        endpoint_id: &EndpointId,
        command: &CommandName,
        kind: CommandKind,
        payload: Value,
        timeout: Option<Duration>,
    ) -> ClassifiedResult {
        let Some(endpoint) = self.registry.get(endpoint_id) else {
            let result = ClassifiedResult::ProtocolError {
                detail: format!("endpoint `{}` is not registered", endpoint_id),
            };
            log_result(endpoint_id, command, &result, Duration::ZERO);
            return result;
        };

        let started = Instant::now();
        let request = CommandRequest::new(command.clone(), payload);
        let call = tokio::spawn(async move { endpoint.invoke(request).await });

        let joined = match timeout {
            Some(limit) => match tokio::time::timeout(limit, call).await {
                Ok(joined) => joined,
                Err(_) => {
                    let result = ClassifiedResult::Unavailable {
                        reason: format!(
                            "endpoint `{}` did not reply to `{}` within {}ms",
                            endpoint_id,
                            command,
                            limit.as_millis()
                        ),
                    };
                    log_result(endpoint_id, command, &result, started.elapsed());
                    return result;
                }
            },
            None => call.await,
        };

        let result = match joined {
            Ok(Ok(reply)) => classify(kind, reply),
            Ok(Err(EndpointError::Unreachable(reason))) => ClassifiedResult::Unavailable { reason },
            Ok(Err(EndpointError::MalformedReply(detail))) => {
                ClassifiedResult::ProtocolError { detail }
            }
            Err(join_err) => ClassifiedResult::ProtocolError {
                detail: format!("endpoint task failed: {}", join_err),
            },
        };

        log_result(endpoint_id, command, &result, started.elapsed());
        result
    }
}

/// 把原始回复归一化为分类结果
pub fn classify(kind: CommandKind, reply: Value) -> ClassifiedResult {
    let reply: CommandReply = match serde_json::from_value(reply) {
        Ok(reply) => reply,
        Err(err) => {
            return ClassifiedResult::ProtocolError {
                detail: format!("reply is not a command envelope: {}", err),
            }
        }
    };

    match reply.status {
        ReplyStatus::Success => ClassifiedResult::Ok {
            data: reply.data.unwrap_or(Value::Null),
        },
        ReplyStatus::Error if kind.reports_not_found() && reply.success == Some(false) => {
            ClassifiedResult::NotFound {
                message: reply
                    .message
                    .filter(|message| !message.is_empty())
                    .unwrap_or_else(|| DEFAULT_NOT_FOUND_MESSAGE.to_string()),
            }
        }
        ReplyStatus::Error => match reply.message {
            Some(message) => ClassifiedResult::BackendFailure { message },
            None => ClassifiedResult::ProtocolError {
                detail: "error reply carries no message".to_string(),
            },
        },
    }
}

fn log_result(
    endpoint: &EndpointId,
    command: &CommandName,
    result: &ClassifiedResult,
    elapsed: Duration,
) {
    let elapsed_ms = elapsed.as_millis() as u64;
    match result {
        ClassifiedResult::Ok { .. } => {
            debug!(endpoint = %endpoint, command = %command, elapsed_ms, "命令分发成功")
        }
        ClassifiedResult::NotFound { message } => {
            info!(endpoint = %endpoint, command = %command, elapsed_ms, message = %message, "记录不存在")
        }
        ClassifiedResult::Unavailable { reason } => {
            warn!(endpoint = %endpoint, command = %command, elapsed_ms, reason = %reason, "端点不可用")
        }
        ClassifiedResult::BackendFailure { message } => {
            warn!(endpoint = %endpoint, command = %command, elapsed_ms, message = %message, "后端报告失败")
        }
        ClassifiedResult::ProtocolError { detail } => {
            error!(endpoint = %endpoint, command = %command, elapsed_ms, detail = %detail, "回复不符合信封契约")
        }
    }
}
