//! 进程内通知总线
//!
//! 每个队列一个 FIFO，按会话跟踪未确认消息。会话丢失（断开、被切断或被丢弃）
//! 时，它持有的未确认消息按原顺序放回队首并标记为重新投递。
//! `set_available` 与 `sever_sessions` 用于模拟总线故障。

use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use domain::QueueStat;
use parking_lot::Mutex;
use tokio::sync::Notify;
use tokio::time::Instant;
use tracing::{debug, info};

use super::bus::{BusError, BusSession, Delivery, DeliveryTag, NotificationBus};

#[derive(Debug, Clone)]
struct StoredMessage {
    seq: u64,
    payload: Vec<u8>,
    redelivered: bool,
}

#[derive(Debug, Default)]
struct QueueState {
    ready: VecDeque<StoredMessage>,
    unacked: BTreeMap<u64, (u64, StoredMessage)>,
    consumers: HashSet<u64>,
}

impl QueueState {
    fn stat(&self) -> QueueStat {
        QueueStat {
            pending_count: (self.ready.len() + self.unacked.len()) as u64,
            active_consumer_count: self.consumers.len() as u64,
        }
    }

    /// 把会话持有的未确认消息放回队首
    fn requeue_session(&mut self, session: u64) -> usize {
        let owned: Vec<u64> = self
            .unacked
            .iter()
            .filter(|(_, (owner, _))| *owner == session)
            .map(|(seq, _)| *seq)
            .collect();
        self.requeue(owned)
    }

    fn requeue_all(&mut self) -> usize {
        let all: Vec<u64> = self.unacked.keys().copied().collect();
        self.requeue(all)
    }

    fn requeue(&mut self, seqs: Vec<u64>) -> usize {
        let count = seqs.len();
        for seq in seqs.into_iter().rev() {
            if let Some((_, mut message)) = self.unacked.remove(&seq) {
                message.redelivered = true;
                self.ready.push_front(message);
            }
        }
        count
    }
}

#[derive(Debug)]
struct BusState {
    available: bool,
    epoch: u64,
    next_session: u64,
    next_seq: u64,
    queues: HashMap<String, QueueState>,
}

impl BusState {
    fn ensure_available(&self) -> Result<(), BusError> {
        if self.available {
            Ok(())
        } else {
            Err(BusError::Unavailable("in-memory bus is offline".to_string()))
        }
    }

    fn queue_mut(&mut self, queue: &str) -> Result<&mut QueueState, BusError> {
        self.queues
            .get_mut(queue)
            .ok_or_else(|| BusError::UnknownQueue(queue.to_string()))
    }

    fn sever(&mut self) -> usize {
        self.epoch += 1;
        self.queues
            .values_mut()
            .map(|queue| {
                queue.consumers.clear();
                queue.requeue_all()
            })
            .sum()
    }
}

#[derive(Debug)]
struct Shared {
    state: Mutex<BusState>,
    notify: Notify,
}

/// 进程内通知总线
#[derive(Debug, Clone)]
pub struct InMemoryNotificationBus {
    shared: Arc<Shared>,
}

impl Default for InMemoryNotificationBus {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryNotificationBus {
    pub fn new() -> Self {
        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(BusState {
                    available: true,
                    epoch: 0,
                    next_session: 0,
                    next_seq: 0,
                    queues: HashMap::new(),
                }),
                notify: Notify::new(),
            }),
        }
    }

    /// 切断所有会话（模拟连接丢失），总线本身保持可用
    pub fn sever_sessions(&self) {
        let requeued = self.shared.state.lock().sever();
        info!(requeued, "内存总线切断所有会话");
        self.shared.notify.notify_waiters();
    }

    /// 切换总线可用性；下线时同时切断所有会话
    pub fn set_available(&self, available: bool) {
        {
            let mut state = self.shared.state.lock();
            state.available = available;
            if !available {
                state.sever();
            }
        }
        info!(available, "内存总线可用性变更");
        self.shared.notify.notify_waiters();
    }

    pub fn is_available(&self) -> bool {
        self.shared.state.lock().available
    }

    /// 队列中等待投递的消息数（不含未确认消息）
    pub fn ready_count(&self, queue: &str) -> usize {
        self.shared
            .state
            .lock()
            .queues
            .get(queue)
            .map(|queue| queue.ready.len())
            .unwrap_or(0)
    }
}

#[async_trait]
impl NotificationBus for InMemoryNotificationBus {
    async fn declare(&self, queue: &str) -> Result<(), BusError> {
        let mut state = self.shared.state.lock();
        state.ensure_available()?;
        state.queues.entry(queue.to_string()).or_default();
        Ok(())
    }

    async fn publish(&self, queue: &str, payload: Vec<u8>) -> Result<(), BusError> {
        {
            let mut state = self.shared.state.lock();
            state.ensure_available()?;
            let seq = state.next_seq;
            state.next_seq += 1;
            state.queue_mut(queue)?.ready.push_back(StoredMessage {
                seq,
                payload,
                redelivered: false,
            });
        }
        self.shared.notify.notify_waiters();
        Ok(())
    }

    async fn subscribe(
        &self,
        queue: &str,
        consumer: &str,
    ) -> Result<Box<dyn BusSession>, BusError> {
        let mut state = self.shared.state.lock();
        state.ensure_available()?;
        let id = state.next_session;
        state.next_session += 1;
        let epoch = state.epoch;
        state.queue_mut(queue)?.consumers.insert(id);
        debug!(queue, consumer, session = id, "内存总线建立订阅会话");

        Ok(Box::new(MemorySession {
            shared: self.shared.clone(),
            queue: queue.to_string(),
            id,
            epoch,
        }))
    }

    async fn stat(&self, queue: &str) -> Result<QueueStat, BusError> {
        let mut state = self.shared.state.lock();
        state.ensure_available()?;
        Ok(state.queue_mut(queue)?.stat())
    }
}

struct MemorySession {
    shared: Arc<Shared>,
    queue: String,
    id: u64,
    epoch: u64,
}

impl MemorySession {
    fn check(&self, state: &BusState) -> Result<(), BusError> {
        if !state.available || state.epoch != self.epoch {
            return Err(BusError::ConnectionLost(format!(
                "session {} on `{}` was severed",
                self.id, self.queue
            )));
        }
        Ok(())
    }

    fn try_take(&self) -> Result<Option<Delivery>, BusError> {
        let mut state = self.shared.state.lock();
        self.check(&state)?;
        let queue = state.queue_mut(&self.queue)?;
        Ok(queue.ready.pop_front().map(|message| {
            let delivery = Delivery {
                tag: DeliveryTag::new(message.seq.to_string()),
                payload: message.payload.clone(),
                redelivered: message.redelivered,
            };
            queue.unacked.insert(message.seq, (self.id, message));
            delivery
        }))
    }
}

#[async_trait]
impl BusSession for MemorySession {
    async fn receive(&mut self, wait: Duration) -> Result<Option<Delivery>, BusError> {
        let deadline = Instant::now() + wait;
        loop {
            let notified = self.shared.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if let Some(delivery) = self.try_take()? {
                return Ok(Some(delivery));
            }
            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                return Ok(None);
            }
        }
    }

    async fn ack(&mut self, tag: &DeliveryTag) -> Result<(), BusError> {
        let mut state = self.shared.state.lock();
        self.check(&state)?;
        let seq: u64 = tag
            .as_str()
            .parse()
            .map_err(|_| BusError::UnknownDelivery(tag.to_string()))?;
        let queue = state.queue_mut(&self.queue)?;
        match queue.unacked.get(&seq) {
            Some((owner, _)) if *owner == self.id => {
                queue.unacked.remove(&seq);
                Ok(())
            }
            _ => Err(BusError::UnknownDelivery(tag.to_string())),
        }
    }

    async fn stat(&mut self) -> Result<QueueStat, BusError> {
        let mut state = self.shared.state.lock();
        self.check(&state)?;
        Ok(state.queue_mut(&self.queue)?.stat())
    }
}

impl Drop for MemorySession {
    fn drop(&mut self) {
        let requeued = {
            let mut state = self.shared.state.lock();
            match state.queues.get_mut(&self.queue) {
                Some(queue) => {
                    queue.consumers.remove(&self.id);
                    queue.requeue_session(self.id)
                }
                None => 0,
            }
        };
        if requeued > 0 {
            debug!(queue = %self.queue, session = self.id, requeued, "会话关闭，未确认消息重新入队");
            self.shared.notify.notify_waiters();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn bus_with_queue() -> InMemoryNotificationBus {
        let bus = InMemoryNotificationBus::new();
        bus.declare("q").await.unwrap();
        bus
    }

    #[tokio::test]
    async fn publish_requires_declared_queue() {
        let bus = InMemoryNotificationBus::new();
        let err = bus.publish("q", b"x".to_vec()).await.unwrap_err();
        assert_eq!(err, BusError::UnknownQueue("q".into()));
    }

    #[tokio::test]
    async fn delivers_in_fifo_order_and_tracks_pending() {
        let bus = bus_with_queue().await;
        for body in ["a", "b", "c"] {
            bus.publish("q", body.as_bytes().to_vec()).await.unwrap();
        }
        let mut session = bus.subscribe("q", "c1").await.unwrap();

        let mut seen = Vec::new();
        while let Some(delivery) = session.receive(Duration::from_millis(10)).await.unwrap() {
            seen.push(String::from_utf8(delivery.payload.clone()).unwrap());
            if seen.len() == 2 {
                break;
            }
            session.ack(&delivery.tag).await.unwrap();
        }
        assert_eq!(seen, vec!["a", "b"]);

        let stat = bus.stat("q").await.unwrap();
        // "b" is unacked and "c" is ready
        assert_eq!(stat.pending_count, 2);
        assert_eq!(stat.active_consumer_count, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn receive_waits_for_publish() {
        let bus = bus_with_queue().await;
        let mut session = bus.subscribe("q", "c1").await.unwrap();

        let publisher = bus.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            publisher.publish("q", b"late".to_vec()).await.unwrap();
        });

        let delivery = session.receive(Duration::from_secs(1)).await.unwrap().unwrap();
        assert_eq!(delivery.payload, b"late");
        assert!(!delivery.redelivered);
    }

    #[tokio::test(start_paused = true)]
    async fn receive_times_out_empty() {
        let bus = bus_with_queue().await;
        let mut session = bus.subscribe("q", "c1").await.unwrap();
        let started = Instant::now();

        assert!(session.receive(Duration::from_millis(300)).await.unwrap().is_none());
        assert!(started.elapsed() >= Duration::from_millis(300));
    }

    #[tokio::test]
    async fn severed_session_loses_connection_and_messages_are_redelivered() {
        let bus = bus_with_queue().await;
        bus.publish("q", b"one".to_vec()).await.unwrap();
        bus.publish("q", b"two".to_vec()).await.unwrap();

        let mut session = bus.subscribe("q", "c1").await.unwrap();
        let first = session.receive(Duration::from_millis(10)).await.unwrap().unwrap();
        assert_eq!(first.payload, b"one");

        bus.sever_sessions();
        assert!(matches!(
            session.receive(Duration::from_millis(10)).await,
            Err(BusError::ConnectionLost(_))
        ));
        assert!(session.ack(&first.tag).await.is_err());
        drop(session);

        let mut fresh = bus.subscribe("q", "c1").await.unwrap();
        let again = fresh.receive(Duration::from_millis(10)).await.unwrap().unwrap();
        assert_eq!(again.payload, b"one");
        assert!(again.redelivered);
        let next = fresh.receive(Duration::from_millis(10)).await.unwrap().unwrap();
        assert_eq!(next.payload, b"two");
        assert!(!next.redelivered);
    }

    #[tokio::test]
    async fn dropped_session_requeues_unacked() {
        let bus = bus_with_queue().await;
        bus.publish("q", b"one".to_vec()).await.unwrap();

        let mut session = bus.subscribe("q", "c1").await.unwrap();
        session.receive(Duration::from_millis(10)).await.unwrap().unwrap();
        assert_eq!(bus.ready_count("q"), 0);
        drop(session);

        assert_eq!(bus.ready_count("q"), 1);
        assert_eq!(bus.stat("q").await.unwrap().active_consumer_count, 0);
    }

    #[tokio::test]
    async fn offline_bus_rejects_operations() {
        let bus = bus_with_queue().await;
        bus.set_available(false);

        assert!(bus.publish("q", b"x".to_vec()).await.unwrap_err().is_connection_error());
        assert!(bus.subscribe("q", "c1").await.is_err());

        bus.set_available(true);
        assert!(bus.subscribe("q", "c1").await.is_ok());
    }

    #[tokio::test]
    async fn ack_of_foreign_delivery_is_rejected() {
        let bus = bus_with_queue().await;
        bus.publish("q", b"x".to_vec()).await.unwrap();
        let mut owner = bus.subscribe("q", "c1").await.unwrap();
        let mut other = bus.subscribe("q", "c2").await.unwrap();

        let delivery = owner.receive(Duration::from_millis(10)).await.unwrap().unwrap();
        assert!(matches!(
            other.ack(&delivery.tag).await,
            Err(BusError::UnknownDelivery(_))
        ));
        owner.ack(&delivery.tag).await.unwrap();
        assert_eq!(bus.stat("q").await.unwrap().pending_count, 0);
    }
}
