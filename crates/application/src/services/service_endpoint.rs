//! 服务端点：服务记录 CRUD、已消费通知读取以及队列内省

use std::sync::Arc;

use domain::{DomainResult, EndpointId, NewService, NotificationEvent};
use serde_json::Value;
use validator::Validate;

use super::crud::register_crud;
use super::local_endpoint::{CommandOutput, CommandResult, LocalEndpoint};
use super::record_store::RecordStore;
use crate::catalog::{DISPLAY_QUEUES, GET_PATIENT_CREATED_NOTIFICATIONS, SERVICE_RESOURCE};
use crate::error::CommandFailure;
use crate::notifications::ConsumerHandle;

fn validate_new_service(payload: &Value) -> DomainResult<()> {
    let service: NewService = serde_json::from_value(payload.clone())?;
    service.validate()?;
    Ok(())
}

/// 服务记录存储
pub fn service_store() -> RecordStore {
    RecordStore::for_resource(&SERVICE_RESOURCE).with_validator(validate_new_service)
}

/// 构建服务端点
pub fn service_endpoint(store: Arc<RecordStore>, consumer: ConsumerHandle) -> LocalEndpoint {
    let consumer = Arc::new(consumer);
    register_crud(
        LocalEndpoint::builder(EndpointId::services()),
        &SERVICE_RESOURCE,
        store,
    )
    .command_with(
        GET_PATIENT_CREATED_NOTIFICATIONS,
        consumer.clone(),
        patient_created_notifications,
    )
    .command_with(DISPLAY_QUEUES, consumer, display_queues)
    .build()
}

async fn patient_created_notifications(
    consumer: Arc<ConsumerHandle>,
    _payload: Value,
) -> CommandResult {
    let events: Vec<Value> = consumer
        .notifications()
        .await
        .into_iter()
        .map(NotificationEvent::into_payload)
        .collect();
    Ok(CommandOutput::new(
        "Notifications retrieved successfully",
        Value::Array(events),
    ))
}

async fn display_queues(consumer: Arc<ConsumerHandle>, _payload: Value) -> CommandResult {
    let snapshot = consumer
        .introspect()
        .await
        .map_err(|err| CommandFailure::failed(err.to_string()))?;
    Ok(CommandOutput::new(
        "Queues displayed successfully",
        serde_json::to_value(snapshot)?,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notifications::{
        ConsumerSettings, DropPoisonMessage, FixedBackoff, InMemoryNotificationBus,
        NotificationBuffer, NotificationBus, NotificationConsumer,
    };
    use domain::{CommandRequest, ConnectionState, ReplyStatus};
    use serde_json::json;
    use std::time::Duration;

    fn consumer_for(bus: &InMemoryNotificationBus) -> (NotificationConsumer, ConsumerHandle) {
        NotificationConsumer::new(
            Arc::new(bus.clone()),
            ConsumerSettings::new("patient_created", "services-test")
                .with_poll_interval(Duration::from_millis(50)),
            Arc::new(NotificationBuffer::new(100)),
            Arc::new(FixedBackoff::default()),
            Arc::new(DropPoisonMessage),
        )
    }

    #[tokio::test]
    async fn create_validates_service_name() {
        let bus = InMemoryNotificationBus::new();
        let (_consumer, handle) = consumer_for(&bus);
        let endpoint = service_endpoint(Arc::new(service_store()), handle);

        let rejected = endpoint
            .execute(CommandRequest::new("createService", json!({"nom_service": ""})))
            .await;
        assert_eq!(rejected.status, ReplyStatus::Error);

        let created = endpoint
            .execute(CommandRequest::new("createService", json!({"nom_service": "Cardiologie"})))
            .await;
        assert_eq!(
            created.data,
            Some(json!({"id_service": 1, "nom_service": "Cardiologie"}))
        );
    }

    #[tokio::test]
    async fn delete_of_missing_service_replies_success_false() {
        let bus = InMemoryNotificationBus::new();
        let (_consumer, handle) = consumer_for(&bus);
        let endpoint = service_endpoint(Arc::new(service_store()), handle);

        let reply = endpoint
            .execute(CommandRequest::new("deleteService", json!(9)))
            .await;
        assert_eq!(reply.success, Some(false));
        assert_eq!(reply.message.as_deref(), Some("Service 9 not found"));
    }

    #[tokio::test(start_paused = true)]
    async fn notifications_and_queue_introspection() {
        let bus = InMemoryNotificationBus::new();
        let (consumer, handle) = consumer_for(&bus);
        let _task = consumer.spawn();
        handle
            .wait_for_state(ConnectionState::Connected)
            .await
            .unwrap();
        let endpoint = service_endpoint(Arc::new(service_store()), handle.clone());

        bus.publish("patient_created", serde_json::to_vec(&json!({"id_patient": 1})).unwrap())
            .await
            .unwrap();
        while handle.buffer().len().await < 1 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        let notifications = endpoint
            .execute(CommandRequest::new(GET_PATIENT_CREATED_NOTIFICATIONS, Value::Null))
            .await;
        assert_eq!(notifications.data, Some(json!([{"id_patient": 1}])));

        let queues = endpoint
            .execute(CommandRequest::new(DISPLAY_QUEUES, Value::Null))
            .await;
        let data = queues.data.unwrap();
        assert_eq!(data["queue"], "patient_created");
        assert_eq!(data["pendingCount"], 0);
        assert_eq!(data["activeConsumerCount"], 1);
        assert_eq!(data["drained"], json!([]));
    }
}
