//! 通知消费者
//!
//! 单个后台任务独占总线会话：连接、订阅、消费以及队列内省都在这里完成。
//! 连接状态机为 `Disconnected -> Connecting -> Connected -> Disconnected`，
//! 任何连接层错误都会回到 `Disconnected`，按退避策略等待后自动重连。
//!
//! 内省请求通过通道交给消费任务处理，由它在自己的会话上读取统计并在观察
//! 窗口内排空消息，因此缓冲区追加和会话只会被一个任务访问。

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use domain::{ConnectionState, NotificationEvent, QueueSnapshot, QueueStat};
use thiserror::Error;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use super::backoff::BackoffPolicy;
use super::buffer::NotificationBuffer;
use super::bus::{BusError, BusSession, Delivery, DeliveryTag, NotificationBus};
use super::poison::PoisonPolicy;

const REQUEST_CHANNEL_CAPACITY: usize = 16;

/// 消费者配置
#[derive(Debug, Clone, PartialEq)]
pub struct ConsumerSettings {
    pub queue: String,
    pub consumer_name: String,
    /// 单次接收的最长等待，也是内省请求的最大响应延迟
    pub poll_interval: Duration,
    /// 内省的观察窗口
    pub observation_window: Duration,
    /// 连接、确认、统计的上限，接收在等待时长之外额外获得该宽限
    pub operation_timeout: Duration,
}

impl ConsumerSettings {
    pub fn new(queue: impl Into<String>, consumer_name: impl Into<String>) -> Self {
        Self {
            queue: queue.into(),
            consumer_name: consumer_name.into(),
            poll_interval: Duration::from_millis(250),
            observation_window: Duration::from_secs(1),
            operation_timeout: Duration::from_secs(5),
        }
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    pub fn with_observation_window(mut self, observation_window: Duration) -> Self {
        self.observation_window = observation_window;
        self
    }

    pub fn with_operation_timeout(mut self, operation_timeout: Duration) -> Self {
        self.operation_timeout = operation_timeout;
        self
    }
}

/// 在期限内完成会话操作，超时按连接丢失处理
async fn within<T, F>(limit: Duration, operation: &str, future: F) -> Result<T, BusError>
where
    F: Future<Output = Result<T, BusError>>,
{
    tokio::time::timeout(limit, future).await.map_err(|_| {
        BusError::ConnectionLost(format!(
            "{} did not complete within {}ms",
            operation,
            limit.as_millis()
        ))
    })?
}

/// 给每个会话操作加上期限的会话包装
///
/// 半开连接上的请求可能永远不返回，超时后消费者会重连。
struct DeadlineSession {
    inner: Box<dyn BusSession>,
    grace: Duration,
}

#[async_trait]
impl BusSession for DeadlineSession {
    async fn receive(&mut self, wait: Duration) -> Result<Option<Delivery>, BusError> {
        within(wait + self.grace, "receive", self.inner.receive(wait)).await
    }

    async fn ack(&mut self, tag: &DeliveryTag) -> Result<(), BusError> {
        within(self.grace, "ack", self.inner.ack(tag)).await
    }

    async fn stat(&mut self) -> Result<QueueStat, BusError> {
        within(self.grace, "stat", self.inner.stat()).await
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConsumerError {
    #[error("notification consumer is not connected (state: {0})")]
    NotConnected(ConnectionState),
    #[error(transparent)]
    Bus(#[from] BusError),
    #[error("notification consumer has stopped")]
    Stopped,
}

type IntrospectionReply = oneshot::Sender<Result<QueueSnapshot, ConsumerError>>;

/// 消费者的外部句柄
#[derive(Clone)]
pub struct ConsumerHandle {
    queue: String,
    requests: mpsc::Sender<IntrospectionReply>,
    state: watch::Receiver<ConnectionState>,
    buffer: Arc<NotificationBuffer>,
    shutdown: Arc<AtomicBool>,
}

impl ConsumerHandle {
    pub fn queue(&self) -> &str {
        &self.queue
    }

    /// 队列内省：读取统计，有待处理消息时在观察窗口内排空
    pub async fn introspect(&self) -> Result<QueueSnapshot, ConsumerError> {
        let (reply, response) = oneshot::channel();
        self.requests
            .send(reply)
            .await
            .map_err(|_| ConsumerError::Stopped)?;
        response.await.map_err(|_| ConsumerError::Stopped)?
    }

    /// 缓冲区中的全部通知（按消费顺序）
    pub async fn notifications(&self) -> Vec<NotificationEvent> {
        self.buffer.snapshot().await
    }

    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    pub async fn wait_for_state(&self, target: ConnectionState) -> Result<(), ConsumerError> {
        let mut state = self.state.clone();
        state
            .wait_for(|current| *current == target)
            .await
            .map(|_| ())
            .map_err(|_| ConsumerError::Stopped)
    }

    pub fn buffer(&self) -> &Arc<NotificationBuffer> {
        &self.buffer
    }

    /// 请求消费任务停止（在下一次轮询时生效）
    pub fn shutdown(&self) {
        self.shutdown.store(true, Ordering::SeqCst);
    }
}

/// 单条消息的处理：解码、追加、确认
pub struct DeliveryProcessor {
    queue: String,
    buffer: Arc<NotificationBuffer>,
    poison: Arc<dyn PoisonPolicy>,
}

impl DeliveryProcessor {
    pub fn new(
        queue: impl Into<String>,
        buffer: Arc<NotificationBuffer>,
        poison: Arc<dyn PoisonPolicy>,
    ) -> Self {
        Self {
            queue: queue.into(),
            buffer,
            poison,
        }
    }

    /// 处理一条投递，返回解码成功的事件
    ///
    /// 毒消息交给策略后同样确认。只有连接层错误会向上返回。
    pub async fn process(
        &self,
        session: &mut dyn BusSession,
        delivery: Delivery,
    ) -> Result<Option<NotificationEvent>, BusError> {
        let event = match NotificationEvent::decode(&delivery.payload) {
            Ok(event) => {
                self.buffer.push(event.clone()).await;
                Some(event)
            }
            Err(err) => {
                let reason = err.to_string();
                match self.poison.handle(&self.queue, &delivery, &reason).await {
                    Ok(disposition) => {
                        debug!(queue = %self.queue, policy = self.poison.name(), %disposition, "毒消息已处理")
                    }
                    Err(err) if err.is_connection_error() => return Err(err),
                    Err(err) => error!(
                        queue = %self.queue,
                        policy = self.poison.name(),
                        error = %err,
                        "毒消息策略执行失败，仍然确认该消息"
                    ),
                }
                None
            }
        };

        session.ack(&delivery.tag).await?;
        debug!(
            queue = %self.queue,
            tag = %delivery.tag,
            redelivered = delivery.redelivered,
            "通知消息已确认"
        );
        Ok(event)
    }

    /// 在会话上执行一次队列内省
    pub async fn introspect(
        &self,
        session: &mut dyn BusSession,
        window: Duration,
    ) -> Result<QueueSnapshot, BusError> {
        let stat = session.stat().await?;
        let mut drained = Vec::new();

        if stat.pending_count > 0 {
            let deadline = Instant::now() + window;
            loop {
                let now = Instant::now();
                if now >= deadline {
                    break;
                }
                match session.receive(deadline - now).await? {
                    Some(delivery) => {
                        if let Some(event) = self.process(session, delivery).await? {
                            drained.push(event);
                        }
                    }
                    None => break,
                }
            }
        }

        info!(
            queue = %self.queue,
            pending = stat.pending_count,
            consumers = stat.active_consumer_count,
            drained = drained.len(),
            "队列内省完成"
        );
        Ok(QueueSnapshot::new(self.queue.clone(), stat, drained))
    }
}

/// 后台通知消费者
pub struct NotificationConsumer {
    bus: Arc<dyn NotificationBus>,
    settings: ConsumerSettings,
    backoff: Arc<dyn BackoffPolicy>,
    processor: DeliveryProcessor,
    requests: mpsc::Receiver<IntrospectionReply>,
    state: watch::Sender<ConnectionState>,
    shutdown: Arc<AtomicBool>,
}

impl NotificationConsumer {
    pub fn new(
        bus: Arc<dyn NotificationBus>,
        settings: ConsumerSettings,
        buffer: Arc<NotificationBuffer>,
        backoff: Arc<dyn BackoffPolicy>,
        poison: Arc<dyn PoisonPolicy>,
    ) -> (Self, ConsumerHandle) {
        let (request_tx, request_rx) = mpsc::channel(REQUEST_CHANNEL_CAPACITY);
        let (state_tx, state_rx) = watch::channel(ConnectionState::Disconnected);
        let shutdown = Arc::new(AtomicBool::new(false));

        let handle = ConsumerHandle {
            queue: settings.queue.clone(),
            requests: request_tx,
            state: state_rx,
            buffer: buffer.clone(),
            shutdown: shutdown.clone(),
        };
        let consumer = Self {
            processor: DeliveryProcessor::new(settings.queue.clone(), buffer, poison),
            bus,
            settings,
            backoff,
            requests: request_rx,
            state: state_tx,
            shutdown,
        };
        (consumer, handle)
    }

    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }

    /// 运行消费循环直到收到停止请求
    pub async fn run(mut self) {
        info!(
            queue = %self.settings.queue,
            consumer = %self.settings.consumer_name,
            "通知消费者启动"
        );
        let mut attempt: u32 = 0;

        while !self.is_shutdown() {
            self.transition(ConnectionState::Connecting);

            match self.connect().await {
                Ok(mut session) => {
                    attempt = 0;
                    self.transition(ConnectionState::Connected);
                    match self.consume(session.as_mut()).await {
                        Ok(()) => break,
                        Err(err) => {
                            warn!(queue = %self.settings.queue, error = %err, "通知总线连接丢失")
                        }
                    }
                }
                Err(err) => {
                    warn!(queue = %self.settings.queue, attempt, error = %err, "连接通知总线失败")
                }
            }

            self.transition(ConnectionState::Disconnected);
            attempt = attempt.saturating_add(1);
            let delay = self.backoff.next_delay(attempt);
            info!(
                queue = %self.settings.queue,
                attempt,
                delay_ms = delay.as_millis() as u64,
                "等待后重新连接"
            );
            self.wait_backoff(delay).await;
        }

        self.transition(ConnectionState::Disconnected);
        info!(queue = %self.settings.queue, "通知消费者已停止");
    }

    fn is_shutdown(&self) -> bool {
        self.shutdown.load(Ordering::SeqCst)
    }

    fn transition(&self, next: ConnectionState) {
        let previous = self.state.send_replace(next);
        if previous != next {
            info!(
                queue = %self.settings.queue,
                from = %previous,
                to = %next,
                "消费者连接状态变更"
            );
        }
    }

    async fn connect(&self) -> Result<Box<dyn BusSession>, BusError> {
        let grace = self.settings.operation_timeout;
        within(grace, "declare", self.bus.declare(&self.settings.queue)).await?;
        let inner = within(
            grace,
            "subscribe",
            self.bus
                .subscribe(&self.settings.queue, &self.settings.consumer_name),
        )
        .await?;
        Ok(Box::new(DeadlineSession { inner, grace }))
    }

    /// 已连接状态下的消费循环，只有连接层错误会返回 `Err`
    async fn consume(&mut self, session: &mut dyn BusSession) -> Result<(), BusError> {
        loop {
            if self.is_shutdown() {
                return Ok(());
            }

            while let Ok(reply) = self.requests.try_recv() {
                match self
                    .processor
                    .introspect(session, self.settings.observation_window)
                    .await
                {
                    Ok(snapshot) => {
                        let _ = reply.send(Ok(snapshot));
                    }
                    Err(err) if err.is_connection_error() => {
                        let _ = reply.send(Err(ConsumerError::Bus(err.clone())));
                        return Err(err);
                    }
                    Err(err) => {
                        let _ = reply.send(Err(ConsumerError::Bus(err)));
                    }
                }
            }

            match session.receive(self.settings.poll_interval).await {
                Ok(Some(delivery)) => {
                    if let Err(err) = self.processor.process(session, delivery).await {
                        if err.is_connection_error() {
                            return Err(err);
                        }
                        // 确认失败的消息留在总线上，重连后重新投递
                        error!(queue = %self.settings.queue, error = %err, "通知消息处理失败");
                    }
                }
                Ok(None) => {}
                Err(err) if err.is_connection_error() => return Err(err),
                Err(err) => {
                    error!(queue = %self.settings.queue, error = %err, "接收通知消息失败");
                    return Err(err);
                }
            }
        }
    }

    /// 退避等待期间拒绝内省请求，并按轮询间隔检查停止标志
    async fn wait_backoff(&mut self, delay: Duration) {
        let deadline = Instant::now() + delay;
        loop {
            if self.is_shutdown() {
                return;
            }
            let now = Instant::now();
            if now >= deadline {
                return;
            }
            let slice = (deadline - now).min(self.settings.poll_interval);

            tokio::select! {
                _ = tokio::time::sleep(slice) => {}
                Some(reply) = self.requests.recv() => {
                    let _ = reply.send(Err(ConsumerError::NotConnected(*self.state.borrow())));
                }
            }
        }
    }
}
