//! 实体创建通知核心：总线抽象、生产者、带重连状态机的消费者以及有界缓冲区

pub mod backoff;
pub mod buffer;
pub mod bus;
pub mod consumer;
pub mod memory_bus;
pub mod poison;
pub mod producer;

pub use backoff::{BackoffPolicy, FixedBackoff, DEFAULT_RECONNECT_DELAY};
pub use buffer::{NotificationBuffer, DEFAULT_BUFFER_CAPACITY};
pub use bus::{BusError, BusSession, Delivery, DeliveryTag, NotificationBus};
pub use consumer::{
    ConsumerError, ConsumerHandle, ConsumerSettings, DeliveryProcessor, NotificationConsumer,
};
pub use memory_bus::InMemoryNotificationBus;
pub use poison::{DeadLetterPoisonMessage, DropPoisonMessage, PoisonDisposition, PoisonPolicy};
pub use producer::{EventPublisher, NotificationPublisher};
