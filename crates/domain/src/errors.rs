//! 领域模型错误定义
//!
//! 本地端点在处理命令时产生的错误，最终都会被转换为错误信封。

use thiserror::Error;

/// 领域模型错误类型
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DomainError {
    /// 负载格式错误
    #[error("invalid payload: {message}")]
    InvalidPayload { message: String },

    /// 验证错误
    #[error("validation failed: {field}: {message}")]
    ValidationError { field: String, message: String },

    /// 资源不存在错误
    #[error("{resource_type} {resource_id} not found")]
    ResourceNotFound {
        resource_type: String,
        resource_id: String,
    },
}

impl DomainError {
    /// 创建负载格式错误
    pub fn invalid_payload(message: impl Into<String>) -> Self {
        Self::InvalidPayload {
            message: message.into(),
        }
    }

    /// 创建验证错误
    pub fn validation_error(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ValidationError {
            field: field.into(),
            message: message.into(),
        }
    }

    /// 创建资源不存在错误
    pub fn resource_not_found(
        resource_type: impl Into<String>,
        resource_id: impl Into<String>,
    ) -> Self {
        Self::ResourceNotFound {
            resource_type: resource_type.into(),
            resource_id: resource_id.into(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, DomainError::ResourceNotFound { .. })
    }
}

impl From<serde_json::Error> for DomainError {
    fn from(err: serde_json::Error) -> Self {
        DomainError::invalid_payload(err.to_string())
    }
}

impl From<validator::ValidationErrors> for DomainError {
    fn from(errors: validator::ValidationErrors) -> Self {
        let field = errors
            .field_errors()
            .keys()
            .next()
            .map(|name| name.to_string())
            .unwrap_or_else(|| "payload".to_string());
        DomainError::validation_error(field, errors.to_string())
    }
}

/// 领域模型结果类型
pub type DomainResult<T> = Result<T, DomainError>;
