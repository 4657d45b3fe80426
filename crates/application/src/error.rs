use domain::DomainError;
use thiserror::Error;

/// 本地命令处理失败
///
/// 端点边界会把它转换为错误信封，`NotFound` 会带上 `success=false`。
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CommandFailure {
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    Failed(String),
}

impl CommandFailure {
    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed(message.into())
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound(message.into())
    }
}

impl From<serde_json::Error> for CommandFailure {
    fn from(err: serde_json::Error) -> Self {
        DomainError::from(err).into()
    }
}

impl From<DomainError> for CommandFailure {
    fn from(err: DomainError) -> Self {
        if err.is_not_found() {
            CommandFailure::NotFound(err.to_string())
        } else {
            CommandFailure::Failed(err.to_string())
        }
    }
}
