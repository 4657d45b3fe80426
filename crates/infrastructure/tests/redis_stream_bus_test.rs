//! Redis Stream 总线集成测试
//!
//! 只在设置了 `REDIS_INTEGRATION_TEST` 时运行，连接 `REDIS_URL`（默认 `redis://127.0.0.1:6379`），Redis 不可用时跳过。

use std::time::Duration;

use application::{BusError, BusSession, NotificationBus};
use infrastructure::RedisStreamBus;

fn redis_url() -> String {
    std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://127.0.0.1:6379".to_string())
}

fn unique_queue(label: &str) -> String {
    let nanos = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap()
        .as_nanos();
    format!("test.{label}.{nanos}")
}

async fn available_bus() -> Option<RedisStreamBus> {
    if std::env::var("REDIS_INTEGRATION_TEST").is_err() {
        return None;
    }
    let bus = RedisStreamBus::new(&redis_url(), "gateway-test", Duration::from_secs(30)).ok()?;
    match bus.declare(&unique_queue("availability")).await {
        Ok(()) => Some(bus),
        Err(err) => {
            eprintln!("跳过 Redis 集成测试：{err}");
            None
        }
    }
}

#[tokio::test]
async fn published_entries_are_delivered_then_acked_away() {
    let Some(bus) = available_bus().await else {
        return;
    };
    let queue = unique_queue("deliver");
    bus.declare(&queue).await.unwrap();
    // 重复声明是幂等的
    bus.declare(&queue).await.unwrap();

    bus.publish(&queue, br#"{"id":1}"#.to_vec()).await.unwrap();
    bus.publish(&queue, br#"{"id":2}"#.to_vec()).await.unwrap();
    assert_eq!(bus.stat(&queue).await.unwrap().pending_count, 2);

    let mut session = bus.subscribe(&queue, "consumer-a").await.unwrap();
    let first = session
        .receive(Duration::from_millis(200))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(first.payload, br#"{"id":1}"#.to_vec());
    assert!(!first.redelivered);
    session.ack(&first.tag).await.unwrap();

    let second = session
        .receive(Duration::from_millis(200))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(second.payload, br#"{"id":2}"#.to_vec());
    session.ack(&second.tag).await.unwrap();

    let stat = session.stat().await.unwrap();
    assert_eq!(stat.pending_count, 0);
    assert_eq!(stat.active_consumer_count, 1);

    assert!(session
        .receive(Duration::from_millis(50))
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn unacked_entry_is_replayed_to_a_new_session() {
    let Some(bus) = available_bus().await else {
        return;
    };
    let queue = unique_queue("replay");
    bus.declare(&queue).await.unwrap();
    bus.publish(&queue, br#"{"id":9}"#.to_vec()).await.unwrap();

    {
        let mut session = bus.subscribe(&queue, "consumer-b").await.unwrap();
        let taken = session.receive(Duration::from_millis(200)).await.unwrap();
        assert!(taken.is_some());
    }

    let mut session = bus.subscribe(&queue, "consumer-b").await.unwrap();
    let replayed = session
        .receive(Duration::from_millis(200))
        .await
        .unwrap()
        .unwrap();
    assert!(replayed.redelivered);
    assert_eq!(replayed.payload, br#"{"id":9}"#.to_vec());
    session.ack(&replayed.tag).await.unwrap();

    let err = session.ack(&replayed.tag).await.unwrap_err();
    assert!(matches!(err, BusError::UnknownDelivery(_)));
}
