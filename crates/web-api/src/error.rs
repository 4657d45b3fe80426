use application::RoutingError;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use domain::ClassifiedResult;
use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub code: &'static str,
    pub message: String,
}

#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    body: ErrorBody,
}

impl ApiError {
    pub fn new(status: StatusCode, code: &'static str, message: impl Into<String>) -> Self {
        Self {
            status,
            body: ErrorBody {
                code,
                message: message.into(),
            },
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, "NOT_FOUND", message)
    }

    pub fn internal_server_error(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR", message)
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }
}

/// 非成功的分类结果到 HTTP 响应的映射
///
/// 协议错误的细节只写日志，响应体使用固定文案。
impl From<ClassifiedResult> for ApiError {
    fn from(result: ClassifiedResult) -> Self {
        match result {
            ClassifiedResult::Unavailable { .. } => ApiError::new(
                StatusCode::SERVICE_UNAVAILABLE,
                "SERVICE_UNAVAILABLE",
                "Service unavailable",
            ),
            ClassifiedResult::NotFound { message } => ApiError::not_found(message),
            ClassifiedResult::BackendFailure { message } => ApiError::new(
                StatusCode::INTERNAL_SERVER_ERROR,
                "BACKEND_FAILURE",
                message,
            ),
            ClassifiedResult::ProtocolError { .. } => ApiError::new(
                StatusCode::INTERNAL_SERVER_ERROR,
                "PROTOCOL_ERROR",
                "Unexpected response from backend",
            ),
            ClassifiedResult::Ok { .. } => ApiError::internal_server_error("unexpected success"),
        }
    }
}

impl From<RoutingError> for ApiError {
    fn from(error: RoutingError) -> Self {
        ApiError::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            "ROUTING_ERROR",
            error.to_string(),
        )
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(self.body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classified_failures_map_to_status_codes() {
        let cases = [
            (
                ClassifiedResult::Unavailable {
                    reason: "timeout".into(),
                },
                StatusCode::SERVICE_UNAVAILABLE,
            ),
            (
                ClassifiedResult::NotFound {
                    message: "Service not found".into(),
                },
                StatusCode::NOT_FOUND,
            ),
            (
                ClassifiedResult::BackendFailure {
                    message: "boom".into(),
                },
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
            (
                ClassifiedResult::ProtocolError {
                    detail: "missing status".into(),
                },
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];

        for (result, status) in cases {
            assert_eq!(ApiError::from(result).status(), status);
        }
    }

    #[test]
    fn protocol_error_detail_is_not_exposed() {
        let error = ApiError::from(ClassifiedResult::ProtocolError {
            detail: "secret internals".into(),
        });
        assert!(!error.body.message.contains("secret"));
        assert_eq!(error.body.code, "PROTOCOL_ERROR");
    }
}
