//! 通知管道集成测试
//!
//! 生产者 -> 内存总线 -> 消费者 -> 缓冲区，覆盖顺序、重连和毒消息处理。

use std::sync::Arc;
use std::time::Duration;

use application::{
    BusSession, ConsumerHandle, ConsumerSettings, DeadLetterPoisonMessage, DropPoisonMessage,
    EventPublisher, FixedBackoff, InMemoryNotificationBus, NotificationBuffer, NotificationBus,
    NotificationConsumer, NotificationPublisher, PoisonPolicy,
};
use domain::{ConnectionState, NotificationEvent, PATIENT_CREATED_QUEUE};
use serde_json::json;
use tokio::task::JoinHandle;
use tokio::time::Instant;

const RECONNECT_DELAY: Duration = Duration::from_secs(5);
const POLL_INTERVAL: Duration = Duration::from_millis(100);

fn start_consumer(
    bus: &InMemoryNotificationBus,
    poison: Arc<dyn PoisonPolicy>,
) -> (JoinHandle<()>, ConsumerHandle) {
    let (consumer, handle) = NotificationConsumer::new(
        Arc::new(bus.clone()),
        ConsumerSettings::new(PATIENT_CREATED_QUEUE, "services-1")
            .with_poll_interval(POLL_INTERVAL),
        Arc::new(NotificationBuffer::new(1_000)),
        Arc::new(FixedBackoff::new(RECONNECT_DELAY)),
        poison,
    );
    (consumer.spawn(), handle)
}

async fn wait_for_buffer(handle: &ConsumerHandle, expected: usize) {
    for _ in 0..1_000 {
        if handle.buffer().len().await >= expected {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("buffer never reached {expected} events");
}

#[tokio::test(start_paused = true)]
async fn published_events_are_buffered_exactly_once_in_order() {
    let bus = InMemoryNotificationBus::new();
    let publisher = NotificationPublisher::new(Arc::new(bus.clone()), PATIENT_CREATED_QUEUE);
    let (_task, handle) = start_consumer(&bus, Arc::new(DropPoisonMessage));
    handle
        .wait_for_state(ConnectionState::Connected)
        .await
        .unwrap();

    for id in 1..=25 {
        publisher
            .publish(&NotificationEvent::new(json!({"id_patient": id})))
            .await
            .unwrap();
    }
    wait_for_buffer(&handle, 25).await;
    // 再等待几个轮询周期，确认没有重复
    tokio::time::sleep(POLL_INTERVAL * 5).await;

    let ids: Vec<i64> = handle
        .notifications()
        .await
        .iter()
        .map(|event| event.payload()["id_patient"].as_i64().unwrap())
        .collect();
    assert_eq!(ids, (1..=25).collect::<Vec<_>>());
    assert_eq!(bus.stat(PATIENT_CREATED_QUEUE).await.unwrap().pending_count, 0);
}

#[tokio::test(start_paused = true)]
async fn two_entities_are_buffered_in_creation_order() {
    let bus = InMemoryNotificationBus::new();
    let publisher = NotificationPublisher::new(Arc::new(bus.clone()), PATIENT_CREATED_QUEUE);

    publisher
        .publish(&NotificationEvent::new(json!({"id": 1, "name": "A"})))
        .await
        .unwrap();
    publisher
        .publish(&NotificationEvent::new(json!({"id": 2, "name": "B"})))
        .await
        .unwrap();

    let (_task, handle) = start_consumer(&bus, Arc::new(DropPoisonMessage));
    wait_for_buffer(&handle, 2).await;

    assert_eq!(
        handle.notifications().await,
        vec![
            NotificationEvent::new(json!({"id": 1, "name": "A"})),
            NotificationEvent::new(json!({"id": 2, "name": "B"})),
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn consumption_resumes_within_one_backoff_after_restoration() {
    let bus = InMemoryNotificationBus::new();
    let publisher = NotificationPublisher::new(Arc::new(bus.clone()), PATIENT_CREATED_QUEUE);
    let (_task, handle) = start_consumer(&bus, Arc::new(DropPoisonMessage));
    handle
        .wait_for_state(ConnectionState::Connected)
        .await
        .unwrap();

    bus.set_available(false);
    handle
        .wait_for_state(ConnectionState::Disconnected)
        .await
        .unwrap();
    let lost_at = Instant::now();
    bus.set_available(true);

    handle
        .wait_for_state(ConnectionState::Connected)
        .await
        .unwrap();
    assert!(lost_at.elapsed() <= RECONNECT_DELAY + POLL_INTERVAL);

    publisher
        .publish(&NotificationEvent::new(json!({"id_patient": 7})))
        .await
        .unwrap();
    wait_for_buffer(&handle, 1).await;
    assert_eq!(handle.notifications().await[0].payload()["id_patient"], 7);
}

#[tokio::test(start_paused = true)]
async fn consumer_keeps_retrying_while_bus_is_down() {
    let bus = InMemoryNotificationBus::new();
    bus.set_available(false);
    let (_task, handle) = start_consumer(&bus, Arc::new(DropPoisonMessage));

    // 三个退避周期之后仍在重试
    tokio::time::sleep(RECONNECT_DELAY * 3 + Duration::from_millis(50)).await;
    assert_ne!(handle.state(), ConnectionState::Connected);

    bus.set_available(true);
    let restored_at = Instant::now();
    handle
        .wait_for_state(ConnectionState::Connected)
        .await
        .unwrap();
    assert!(restored_at.elapsed() <= RECONNECT_DELAY);
}

#[tokio::test(start_paused = true)]
async fn unacknowledged_message_is_redelivered_after_session_loss() {
    let bus = InMemoryNotificationBus::new();
    bus.declare(PATIENT_CREATED_QUEUE).await.unwrap();
    bus.publish(PATIENT_CREATED_QUEUE, br#"{"id": 1}"#.to_vec())
        .await
        .unwrap();

    // 一个中途崩溃的消费者拿走了消息但没有确认
    {
        let mut crashed = bus.subscribe(PATIENT_CREATED_QUEUE, "crashed").await.unwrap();
        let taken = crashed.receive(Duration::from_millis(10)).await.unwrap();
        assert!(taken.is_some());
    }

    let (_task, handle) = start_consumer(&bus, Arc::new(DropPoisonMessage));
    wait_for_buffer(&handle, 1).await;
    assert_eq!(handle.notifications().await[0].payload()["id"], 1);
}

#[tokio::test(start_paused = true)]
async fn poison_messages_are_dead_lettered_and_acknowledged() {
    let bus = InMemoryNotificationBus::new();
    bus.declare(PATIENT_CREATED_QUEUE).await.unwrap();
    bus.publish(PATIENT_CREATED_QUEUE, b"<<not json>>".to_vec())
        .await
        .unwrap();
    bus.publish(PATIENT_CREATED_QUEUE, br#"{"id": 2}"#.to_vec())
        .await
        .unwrap();

    let policy = Arc::new(DeadLetterPoisonMessage::new(
        Arc::new(bus.clone()),
        "patient_created.dead_letter",
    ));
    let (_task, handle) = start_consumer(&bus, policy);
    wait_for_buffer(&handle, 1).await;

    assert_eq!(handle.notifications().await.len(), 1);
    assert_eq!(bus.stat(PATIENT_CREATED_QUEUE).await.unwrap().pending_count, 0);
    assert_eq!(
        bus.stat("patient_created.dead_letter")
            .await
            .unwrap()
            .pending_count,
        1
    );
}

#[tokio::test(start_paused = true)]
async fn introspection_with_zero_pending_leaves_queue_untouched() {
    let bus = InMemoryNotificationBus::new();
    let (_task, handle) = start_consumer(&bus, Arc::new(DropPoisonMessage));
    handle
        .wait_for_state(ConnectionState::Connected)
        .await
        .unwrap();

    let snapshot = handle.introspect().await.unwrap();
    assert_eq!(snapshot.pending_count, 0);
    assert!(snapshot.drained.is_empty());
    assert_eq!(snapshot.active_consumer_count, 1);
    assert!(handle.buffer().is_empty().await);
}
