//! 毒消息策略
//!
//! 无法解码的消息交给策略处理，处理完成后消费者仍然确认该消息，
//! 避免它被无限重新投递。

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tracing::warn;

use super::bus::{BusError, Delivery, NotificationBus};

/// 策略对毒消息的处置结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PoisonDisposition {
    /// 只记录日志后丢弃
    Dropped,
    /// 原始消息体已转存到死信队列
    DeadLettered,
}

impl fmt::Display for PoisonDisposition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PoisonDisposition::Dropped => write!(f, "dropped"),
            PoisonDisposition::DeadLettered => write!(f, "dead_lettered"),
        }
    }
}

#[async_trait]
pub trait PoisonPolicy: Send + Sync {
    fn name(&self) -> &'static str;

    /// 处理一条无法解码的消息
    ///
    /// 返回连接层错误时消费者不会确认该消息，而是按连接丢失处理。
    async fn handle(
        &self,
        queue: &str,
        delivery: &Delivery,
        reason: &str,
    ) -> Result<PoisonDisposition, BusError>;
}

/// 默认策略：记录日志并丢弃
#[derive(Debug, Clone, Copy, Default)]
pub struct DropPoisonMessage;

#[async_trait]
impl PoisonPolicy for DropPoisonMessage {
    fn name(&self) -> &'static str {
        "drop"
    }

    async fn handle(
        &self,
        queue: &str,
        delivery: &Delivery,
        reason: &str,
    ) -> Result<PoisonDisposition, BusError> {
        warn!(
            queue,
            tag = %delivery.tag,
            bytes = delivery.payload.len(),
            reason,
            "无法解码的通知消息，丢弃"
        );
        Ok(PoisonDisposition::Dropped)
    }
}

/// 把原始消息体转存到死信队列
pub struct DeadLetterPoisonMessage {
    bus: Arc<dyn NotificationBus>,
    dead_letter_queue: String,
    declared: AtomicBool,
}

impl DeadLetterPoisonMessage {
    pub fn new(bus: Arc<dyn NotificationBus>, dead_letter_queue: impl Into<String>) -> Self {
        Self {
            bus,
            dead_letter_queue: dead_letter_queue.into(),
            declared: AtomicBool::new(false),
        }
    }

    pub fn dead_letter_queue(&self) -> &str {
        &self.dead_letter_queue
    }
}

#[async_trait]
impl PoisonPolicy for DeadLetterPoisonMessage {
    fn name(&self) -> &'static str {
        "dead_letter"
    }

    async fn handle(
        &self,
        queue: &str,
        delivery: &Delivery,
        reason: &str,
    ) -> Result<PoisonDisposition, BusError> {
        if !self.declared.load(Ordering::Acquire) {
            self.bus.declare(&self.dead_letter_queue).await?;
            self.declared.store(true, Ordering::Release);
        }
        self.bus
            .publish(&self.dead_letter_queue, delivery.payload.clone())
            .await?;

        warn!(
            queue,
            dead_letter_queue = %self.dead_letter_queue,
            tag = %delivery.tag,
            reason,
            "无法解码的通知消息已转入死信队列"
        );
        Ok(PoisonDisposition::DeadLettered)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notifications::bus::DeliveryTag;
    use crate::notifications::InMemoryNotificationBus;

    fn poison() -> Delivery {
        Delivery {
            tag: DeliveryTag::new("7"),
            payload: b"{broken".to_vec(),
            redelivered: false,
        }
    }

    #[tokio::test]
    async fn drop_policy_only_logs() {
        let disposition = DropPoisonMessage
            .handle("patient_created", &poison(), "expected value")
            .await
            .unwrap();
        assert_eq!(disposition, PoisonDisposition::Dropped);
    }

    #[tokio::test]
    async fn dead_letter_policy_copies_raw_payload() {
        let bus = InMemoryNotificationBus::new();
        let policy = DeadLetterPoisonMessage::new(Arc::new(bus.clone()), "patient_created.dlq");

        let disposition = policy
            .handle("patient_created", &poison(), "expected value")
            .await
            .unwrap();

        assert_eq!(disposition, PoisonDisposition::DeadLettered);
        assert_eq!(
            bus.stat("patient_created.dlq").await.unwrap().pending_count,
            1
        );
        let mut session = bus.subscribe("patient_created.dlq", "inspector").await.unwrap();
        let copied = session
            .receive(std::time::Duration::from_millis(10))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(copied.payload, b"{broken");
    }

    #[tokio::test]
    async fn dead_letter_policy_surfaces_connection_errors() {
        let bus = InMemoryNotificationBus::new();
        bus.set_available(false);
        let policy = DeadLetterPoisonMessage::new(Arc::new(bus), "dlq");

        let err = policy.handle("q", &poison(), "bad").await.unwrap_err();
        assert!(err.is_connection_error());
    }
}
