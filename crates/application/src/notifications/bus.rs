//! 通知总线抽象
//!
//! 总线提供至少一次投递：消息在确认之前由总线持有，会话丢失后未确认的
//! 消息会重新投递。

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use domain::QueueStat;
use thiserror::Error;

/// 投递标签，确认时原样交还给总线
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DeliveryTag(String);

impl DeliveryTag {
    pub fn new(tag: impl Into<String>) -> Self {
        Self(tag.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DeliveryTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// 一次消息投递
#[derive(Debug, Clone, PartialEq)]
pub struct Delivery {
    pub tag: DeliveryTag,
    pub payload: Vec<u8>,
    /// 是否为重新投递
    pub redelivered: bool,
}

/// 总线错误
#[derive(Debug, Clone, PartialEq, Error)]
pub enum BusError {
    #[error("bus unavailable: {0}")]
    Unavailable(String),
    #[error("bus connection lost: {0}")]
    ConnectionLost(String),
    #[error("queue `{0}` is not declared")]
    UnknownQueue(String),
    #[error("unknown delivery `{0}`")]
    UnknownDelivery(String),
    #[error("bus operation failed: {0}")]
    Operation(String),
}

impl BusError {
    /// 是否为连接层错误（消费者需要重连）
    pub fn is_connection_error(&self) -> bool {
        matches!(self, BusError::Unavailable(_) | BusError::ConnectionLost(_))
    }
}

/// 通知总线
#[async_trait]
pub trait NotificationBus: Send + Sync {
    /// 声明持久队列（幂等）
    async fn declare(&self, queue: &str) -> Result<(), BusError>;

    /// 发布持久消息
    async fn publish(&self, queue: &str, payload: Vec<u8>) -> Result<(), BusError>;

    /// 以指定消费者名订阅队列
    async fn subscribe(&self, queue: &str, consumer: &str)
        -> Result<Box<dyn BusSession>, BusError>;

    /// 队列统计
    async fn stat(&self, queue: &str) -> Result<QueueStat, BusError>;
}

/// 订阅会话
///
/// 会话独占一条连接，只能由一个任务驱动。
#[async_trait]
pub trait BusSession: Send {
    /// 最多等待 `wait`，没有消息时返回 `None`
    async fn receive(&mut self, wait: Duration) -> Result<Option<Delivery>, BusError>;

    async fn ack(&mut self, tag: &DeliveryTag) -> Result<(), BusError>;

    /// 通过本会话的连接读取队列统计
    async fn stat(&mut self) -> Result<QueueStat, BusError>;
}
