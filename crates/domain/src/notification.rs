//! 实体创建通知与队列快照

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// 患者创建通知队列名称
pub const PATIENT_CREATED_QUEUE: &str = "patient_created";

/// 实体创建通知
///
/// 携带实体持久化之后的完整表示。线上格式就是实体本身的 JSON。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NotificationEvent(Value);

impl NotificationEvent {
    pub fn new(payload: Value) -> Self {
        Self(payload)
    }

    /// 从已持久化的实体创建通知
    pub fn from_entity<T: Serialize>(entity: &T) -> Result<Self, serde_json::Error> {
        Ok(Self(serde_json::to_value(entity)?))
    }

    pub fn payload(&self) -> &Value {
        &self.0
    }

    pub fn into_payload(self) -> Value {
        self.0
    }

    /// 编码为队列消息体
    pub fn encode(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(&self.0)
    }

    /// 从队列消息体解码
    pub fn decode(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        Ok(Self(serde_json::from_slice(bytes)?))
    }
}

/// 队列统计（来自总线的时间点读数）
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueStat {
    /// 已入队但尚未确认的消息数
    pub pending_count: u64,
    /// 活跃消费者数量
    pub active_consumer_count: u64,
}

/// 队列快照
///
/// `drained` 是一次内省中观察并确认的消息样本，不保证完整。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueSnapshot {
    pub queue: String,
    pub pending_count: u64,
    pub active_consumer_count: u64,
    pub drained: Vec<NotificationEvent>,
    pub captured_at: DateTime<Utc>,
}

impl QueueSnapshot {
    pub fn new(queue: impl Into<String>, stat: QueueStat, drained: Vec<NotificationEvent>) -> Self {
        Self {
            queue: queue.into(),
            pending_count: stat.pending_count,
            active_consumer_count: stat.active_consumer_count,
            drained,
            captured_at: Utc::now(),
        }
    }
}

/// 消费者与总线之间的连接状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionState::Disconnected => write!(f, "disconnected"),
            ConnectionState::Connecting => write!(f, "connecting"),
            ConnectionState::Connected => write!(f, "connected"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn event_wire_format_is_the_entity_itself() {
        let event = NotificationEvent::new(json!({"id": 1, "name": "A"}));
        let bytes = event.encode().unwrap();
        assert_eq!(serde_json::from_slice::<Value>(&bytes).unwrap(), json!({"id": 1, "name": "A"}));
        assert_eq!(NotificationEvent::decode(&bytes).unwrap(), event);
    }

    #[test]
    fn decode_rejects_garbage() {
        assert!(NotificationEvent::decode(b"{not json").is_err());
    }

    #[test]
    fn snapshot_uses_camel_case_field_names() {
        let stat = QueueStat {
            pending_count: 2,
            active_consumer_count: 1,
        };
        let value = serde_json::to_value(QueueSnapshot::new("patient_created", stat, vec![])).unwrap();
        assert_eq!(value["pendingCount"], 2);
        assert_eq!(value["activeConsumerCount"], 1);
        assert_eq!(value["drained"], json!([]));
    }
}
