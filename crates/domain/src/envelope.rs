//! 命令信封
//!
//! 分发器与后端端点之间的请求/回复契约。回复只有两种形态：
//! `{status: "success", data}` 或 `{status: "error", message}`，
//! 删除和查找命令可以额外携带 `success` 布尔字段。

use crate::CommandName;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// 命令请求
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandRequest {
    /// 命令名称
    pub command: CommandName,
    /// 请求负载（对分发器不透明）
    #[serde(default)]
    pub payload: Value,
}

impl CommandRequest {
    pub fn new(command: impl Into<CommandName>, payload: Value) -> Self {
        Self {
            command: command.into(),
            payload,
        }
    }
}

/// 回复状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReplyStatus {
    Success,
    Error,
}

/// 命令回复信封
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandReply {
    pub status: ReplyStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub success: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl CommandReply {
    /// 成功回复
    pub fn success(message: impl Into<String>, data: Value) -> Self {
        Self {
            status: ReplyStatus::Success,
            success: Some(true),
            message: Some(message.into()),
            data: Some(data),
        }
    }

    /// 错误回复
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            status: ReplyStatus::Error,
            success: None,
            message: Some(message.into()),
            data: None,
        }
    }

    /// 记录不存在的错误回复（`success=false`）
    pub fn not_found(message: impl Into<String>) -> Self {
        Self {
            status: ReplyStatus::Error,
            success: Some(false),
            message: Some(message.into()),
            data: None,
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == ReplyStatus::Success
    }

    /// 转换为线上传输的 JSON 值
    pub fn into_value(self) -> Value {
        serde_json::to_value(self).unwrap_or_else(|err| {
            serde_json::json!({ "status": "error", "message": err.to_string() })
        })
    }
}
