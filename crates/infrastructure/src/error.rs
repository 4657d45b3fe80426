use application::RoutingError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum InfrastructureError {
    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),
    #[error("http client error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("routing error: {0}")]
    Routing(#[from] RoutingError),
    #[error("invalid endpoint configuration for `{endpoint}`: {message}")]
    InvalidEndpoint { endpoint: String, message: String },
}
