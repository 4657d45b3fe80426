//! 分类结果
//!
//! 分发器把后端的原始回复归一化为以下五种结果之一。

use serde_json::Value;
use std::fmt;

/// 分发器的归一化结果
#[derive(Debug, Clone, PartialEq)]
pub enum ClassifiedResult {
    /// 成功，`data` 原样转发
    Ok { data: Value },
    /// 超时或端点不可达
    Unavailable { reason: String },
    /// 删除/查找没有匹配的记录
    NotFound { message: String },
    /// 端点报告了业务层错误
    BackendFailure { message: String },
    /// 回复不符合信封契约（`detail` 只用于日志，不暴露给调用方）
    ProtocolError { detail: String },
}

impl ClassifiedResult {
    pub fn label(&self) -> &'static str {
        match self {
            ClassifiedResult::Ok { .. } => "ok",
            ClassifiedResult::Unavailable { .. } => "unavailable",
            ClassifiedResult::NotFound { .. } => "not_found",
            ClassifiedResult::BackendFailure { .. } => "backend_failure",
            ClassifiedResult::ProtocolError { .. } => "protocol_error",
        }
    }

    pub fn is_ok(&self) -> bool {
        matches!(self, ClassifiedResult::Ok { .. })
    }
}

impl fmt::Display for ClassifiedResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ClassifiedResult::Ok { .. } => write!(f, "ok"),
            ClassifiedResult::Unavailable { reason } => write!(f, "unavailable: {}", reason),
            ClassifiedResult::NotFound { message } => write!(f, "not found: {}", message),
            ClassifiedResult::BackendFailure { message } => {
                write!(f, "backend failure: {}", message)
            }
            ClassifiedResult::ProtocolError { detail } => write!(f, "protocol error: {}", detail),
        }
    }
}
