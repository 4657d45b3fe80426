//! 通知生产者
//!
//! 只在持久化成功之后发布。发布只等待总线接收，不等待消费者。

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use domain::NotificationEvent;
use tracing::{debug, info};

use super::bus::{BusError, NotificationBus};

/// 事件发布接口
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait EventPublisher: Send + Sync {
    async fn publish(&self, event: &NotificationEvent) -> Result<(), BusError>;
}

/// 向单个持久队列发布通知
pub struct NotificationPublisher {
    bus: Arc<dyn NotificationBus>,
    queue: String,
    declared: AtomicBool,
}

impl NotificationPublisher {
    pub fn new(bus: Arc<dyn NotificationBus>, queue: impl Into<String>) -> Self {
        Self {
            bus,
            queue: queue.into(),
            declared: AtomicBool::new(false),
        }
    }

    pub fn queue(&self) -> &str {
        &self.queue
    }

    async fn ensure_declared(&self) -> Result<(), BusError> {
        if !self.declared.load(Ordering::Acquire) {
            self.bus.declare(&self.queue).await?;
            self.declared.store(true, Ordering::Release);
            info!(queue = %self.queue, "通知队列已声明");
        }
        Ok(())
    }
}

#[async_trait]
impl EventPublisher for NotificationPublisher {
    async fn publish(&self, event: &NotificationEvent) -> Result<(), BusError> {
        let payload = event
            .encode()
            .map_err(|err| BusError::Operation(format!("failed to encode event: {}", err)))?;

        self.ensure_declared().await?;
        match self.bus.publish(&self.queue, payload.clone()).await {
            // 总线重启后队列可能丢失，重新声明后重试一次
            Err(BusError::UnknownQueue(_)) => {
                self.declared.store(false, Ordering::Release);
                self.ensure_declared().await?;
                self.bus.publish(&self.queue, payload).await?;
            }
            other => other?,
        }

        debug!(queue = %self.queue, "通知已发布");
        Ok(())
    }
}
