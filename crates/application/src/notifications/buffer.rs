//! 有界通知缓冲区
//!
//! 容量满时丢弃最旧的事件，丢弃会被计数并记录日志。

use std::collections::VecDeque;

use domain::NotificationEvent;
use tokio::sync::RwLock;
use tracing::warn;

pub const DEFAULT_BUFFER_CAPACITY: usize = 10_000;

#[derive(Debug, Default)]
struct BufferState {
    events: VecDeque<NotificationEvent>,
    evicted: u64,
}

/// 已消费通知的进程内缓冲区
#[derive(Debug)]
pub struct NotificationBuffer {
    state: RwLock<BufferState>,
    capacity: usize,
}

impl Default for NotificationBuffer {
    fn default() -> Self {
        Self::new(DEFAULT_BUFFER_CAPACITY)
    }
}

impl NotificationBuffer {
    /// 创建缓冲区，容量至少为 1
    pub fn new(capacity: usize) -> Self {
        Self {
            state: RwLock::new(BufferState::default()),
            capacity: capacity.max(1),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// 追加事件，返回被挤出的最旧事件
    pub async fn push(&self, event: NotificationEvent) -> Option<NotificationEvent> {
        let mut state = self.state.write().await;
        let evicted = if state.events.len() >= self.capacity {
            state.evicted += 1;
            state.events.pop_front()
        } else {
            None
        };
        state.events.push_back(event);

        if evicted.is_some() {
            warn!(
                capacity = self.capacity,
                evicted_total = state.evicted,
                "通知缓冲区已满，丢弃最旧的事件"
            );
        }
        evicted
    }

    /// 按消费顺序返回所有事件的副本
    pub async fn snapshot(&self) -> Vec<NotificationEvent> {
        self.state.read().await.events.iter().cloned().collect()
    }

    pub async fn len(&self) -> usize {
        self.state.read().await.events.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.state.read().await.events.is_empty()
    }

    /// 累计被丢弃的事件数
    pub async fn evicted_count(&self) -> u64 {
        self.state.read().await.evicted
    }
}
