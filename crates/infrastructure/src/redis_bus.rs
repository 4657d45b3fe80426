//! Redis Stream 通知总线
//!
//! 每个队列对应一个 Stream 和一个消费者组：
//! - 声明：`XGROUP CREATE <queue> <group> 0 MKSTREAM`，组已存在时忽略 BUSYGROUP
//! - 发布：`XADD <queue> * payload <bytes>`
//! - 接收：先读取本消费者的待确认历史（`0`，视为重新投递），再阻塞读取新消息（`>`）
//! - 确认：`XACK` 与 `XDEL` 在同一个 MULTI/EXEC 中执行，使 `XLEN` 始终等于未确认的消息数
//! - 统计：`XLEN` 加上 `XINFO CONSUMERS` 中空闲时间小于阈值的消费者数

use std::sync::Arc;
use std::time::Duration;

use application::{BusError, BusSession, Delivery, DeliveryTag, NotificationBus};
use async_trait::async_trait;
use domain::QueueStat;
use redis::aio::{ConnectionManager, MultiplexedConnection};
use redis::streams::{StreamInfoConsumersReply, StreamReadReply};
use tokio::sync::OnceCell;
use tracing::{debug, info};

const PAYLOAD_FIELD: &str = "payload";

/// Redis 错误到总线错误的映射
fn bus_error(err: redis::RedisError) -> BusError {
    if err.is_connection_refusal() {
        BusError::Unavailable(err.to_string())
    } else if err.is_io_error() || err.is_connection_dropped() || err.is_timeout() {
        BusError::ConnectionLost(err.to_string())
    } else if err.code() == Some("NOGROUP") {
        // Stream 或消费者组被删除，重连时重新声明
        BusError::ConnectionLost(err.to_string())
    } else {
        BusError::Operation(err.to_string())
    }
}

async fn create_group<C>(conn: &mut C, queue: &str, group: &str) -> Result<(), BusError>
where
    C: redis::aio::ConnectionLike + Send,
{
    let result: Result<String, redis::RedisError> = redis::cmd("XGROUP")
        .arg("CREATE")
        .arg(queue)
        .arg(group)
        .arg("0")
        .arg("MKSTREAM")
        .query_async(conn)
        .await;

    match result {
        Ok(_) => {
            info!(queue, group, "消费者组已创建");
            Ok(())
        }
        Err(err) if err.code() == Some("BUSYGROUP") => {
            debug!(queue, group, "消费者组已存在");
            Ok(())
        }
        Err(err) => Err(bus_error(err)),
    }
}

async fn queue_stat<C>(
    conn: &mut C,
    queue: &str,
    group: &str,
    consumer_idle: Duration,
) -> Result<QueueStat, BusError>
where
    C: redis::aio::ConnectionLike + Send,
{
    let pending_count: u64 = redis::cmd("XLEN")
        .arg(queue)
        .query_async(conn)
        .await
        .map_err(bus_error)?;

    let consumers: StreamInfoConsumersReply = redis::cmd("XINFO")
        .arg("CONSUMERS")
        .arg(queue)
        .arg(group)
        .query_async(conn)
        .await
        .map_err(bus_error)?;

    let idle_limit = consumer_idle.as_millis() as usize;
    let active_consumer_count = consumers
        .consumers
        .iter()
        .filter(|consumer| consumer.idle < idle_limit)
        .count() as u64;

    Ok(QueueStat {
        pending_count,
        active_consumer_count,
    })
}

/// 基于 Redis Stream 消费者组的通知总线
pub struct RedisStreamBus {
    client: Arc<redis::Client>,
    group: String,
    consumer_idle: Duration,
    manager: OnceCell<ConnectionManager>,
}

impl RedisStreamBus {
    pub fn new(
        url: &str,
        group: impl Into<String>,
        consumer_idle: Duration,
    ) -> Result<Self, redis::RedisError> {
        Ok(Self {
            client: Arc::new(redis::Client::open(url)?),
            group: group.into(),
            consumer_idle,
            manager: OnceCell::new(),
        })
    }

    pub fn group(&self) -> &str {
        &self.group
    }

    /// 共享的自动重连连接，用于声明、发布和统计
    async fn connection(&self) -> Result<ConnectionManager, BusError> {
        self.manager
            .get_or_try_init(|| self.client.get_connection_manager())
            .await
            .cloned()
            .map_err(bus_error)
    }
}

#[async_trait]
impl NotificationBus for RedisStreamBus {
    async fn declare(&self, queue: &str) -> Result<(), BusError> {
        let mut conn = self.connection().await?;
        create_group(&mut conn, queue, &self.group).await
    }

    async fn publish(&self, queue: &str, payload: Vec<u8>) -> Result<(), BusError> {
        let mut conn = self.connection().await?;
        let id: String = redis::cmd("XADD")
            .arg(queue)
            .arg("*")
            .arg(PAYLOAD_FIELD)
            .arg(payload)
            .query_async(&mut conn)
            .await
            .map_err(bus_error)?;
        debug!(queue, message_id = %id, "通知已写入 Stream");
        Ok(())
    }

    async fn subscribe(
        &self,
        queue: &str,
        consumer: &str,
    ) -> Result<Box<dyn BusSession>, BusError> {
        // 每个会话独占一条连接，阻塞读取不会影响共享连接上的发布
        let conn = self
            .client
            .get_multiplexed_async_connection()
            .await
            .map_err(bus_error)?;
        info!(queue, group = %self.group, consumer, "已订阅通知 Stream");

        Ok(Box::new(RedisStreamSession {
            conn,
            queue: queue.to_string(),
            group: self.group.clone(),
            consumer: consumer.to_string(),
            consumer_idle: self.consumer_idle,
            replaying: true,
        }))
    }

    async fn stat(&self, queue: &str) -> Result<QueueStat, BusError> {
        let mut conn = self.connection().await?;
        queue_stat(&mut conn, queue, &self.group, self.consumer_idle).await
    }
}

/// `XACK` 与 `XDEL` 放在同一个事务中，避免条目离开 PEL 后仍留在 Stream 里
fn ack_pipeline(queue: &str, group: &str, id: &str) -> redis::Pipeline {
    let mut pipe = redis::pipe();
    pipe.atomic()
        .cmd("XACK")
        .arg(queue)
        .arg(group)
        .arg(id)
        .cmd("XDEL")
        .arg(queue)
        .arg(id);
    pipe
}

struct RedisStreamSession {
    conn: MultiplexedConnection,
    queue: String,
    group: String,
    consumer: String,
    consumer_idle: Duration,
    /// 是否仍在读取本消费者的待确认历史
    replaying: bool,
}

impl RedisStreamSession {
    async fn read(
        &mut self,
        id: &str,
        block: Option<Duration>,
    ) -> Result<Option<Delivery>, BusError> {
        let mut cmd = redis::cmd("XREADGROUP");
        cmd.arg("GROUP")
            .arg(&self.group)
            .arg(&self.consumer)
            .arg("COUNT")
            .arg(1);
        if let Some(block) = block {
            // BLOCK 0 表示无限等待，至少阻塞 1ms
            cmd.arg("BLOCK").arg(block.as_millis().max(1) as u64);
        }
        cmd.arg("STREAMS").arg(&self.queue).arg(id);

        let reply: Option<StreamReadReply> = cmd
            .query_async(&mut self.conn)
            .await
            .map_err(bus_error)?;

        let entry = reply.and_then(|reply| {
            reply
                .keys
                .into_iter()
                .flat_map(|key| key.ids)
                .next()
        });

        Ok(entry.map(|entry| Delivery {
            payload: entry.get::<Vec<u8>>(PAYLOAD_FIELD).unwrap_or_default(),
            tag: DeliveryTag::new(entry.id),
            redelivered: id != ">",
        }))
    }
}

#[async_trait]
impl BusSession for RedisStreamSession {
    async fn receive(&mut self, wait: Duration) -> Result<Option<Delivery>, BusError> {
        if self.replaying {
            match self.read("0", None).await? {
                Some(delivery) => return Ok(Some(delivery)),
                None => self.replaying = false,
            }
        }
        self.read(">", Some(wait)).await
    }

    async fn ack(&mut self, tag: &DeliveryTag) -> Result<(), BusError> {
        let (acked, _deleted): (i64, i64) = ack_pipeline(&self.queue, &self.group, tag.as_str())
            .query_async(&mut self.conn)
            .await
            .map_err(bus_error)?;
        if acked == 0 {
            return Err(BusError::UnknownDelivery(tag.to_string()));
        }
        Ok(())
    }

    async fn stat(&mut self) -> Result<QueueStat, BusError> {
        queue_stat(&mut self.conn, &self.queue, &self.group, self.consumer_idle).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_url_is_rejected() {
        assert!(RedisStreamBus::new("not-a-url", "group", Duration::from_secs(30)).is_err());
    }

    #[test]
    fn server_errors_are_operation_failures() {
        let err = redis::RedisError::from((redis::ErrorKind::TypeError, "wrong type"));
        assert!(matches!(bus_error(err), BusError::Operation(_)));
    }

    #[test]
    fn ack_and_delete_are_sent_as_one_transaction() {
        let packed = ack_pipeline("patient_created", "medgate", "1-0").get_packed_pipeline();
        let text = String::from_utf8(packed).unwrap();

        let multi = text.find("MULTI").unwrap();
        let xack = text.find("XACK").unwrap();
        let xdel = text.find("XDEL").unwrap();
        let exec = text.find("EXEC").unwrap();
        assert!(multi < xack && xack < xdel && xdel < exec);
    }

    #[test]
    fn io_errors_are_connection_errors() {
        let io = std::io::Error::new(std::io::ErrorKind::ConnectionReset, "reset by peer");
        assert!(bus_error(redis::RedisError::from(io)).is_connection_error());
    }
}
