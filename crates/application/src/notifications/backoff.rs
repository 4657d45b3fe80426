use std::time::Duration;

/// 重连退避策略
pub trait BackoffPolicy: Send + Sync {
    /// 第 `attempt` 次（从 1 开始）重连前的等待时间
    fn next_delay(&self, attempt: u32) -> Duration;
}

pub const DEFAULT_RECONNECT_DELAY: Duration = Duration::from_secs(5);

/// 固定间隔、无抖动、不限次数
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FixedBackoff {
    delay: Duration,
}

impl FixedBackoff {
    pub fn new(delay: Duration) -> Self {
        Self { delay }
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }
}

impl Default for FixedBackoff {
    fn default() -> Self {
        Self::new(DEFAULT_RECONNECT_DELAY)
    }
}

impl BackoffPolicy for FixedBackoff {
    fn next_delay(&self, _attempt: u32) -> Duration {
        self.delay
    }
}
