//! 应用层实现。
//!
//! 这里提供命令分发器、路由表、通知总线消费核心，
//! 以及进程内后端端点（患者、服务、会诊）的用例实现。

pub mod catalog;
pub mod dispatcher;
pub mod endpoint;
pub mod error;
pub mod notifications;
pub mod routing;
pub mod services;

pub use catalog::{
    gateway_bindings, resources, CrudOp, ResourceCommands, CONSULTATION_RESOURCES,
    DISPLAY_QUEUES, GET_PATIENT_CREATED_NOTIFICATIONS, NOTIFICATIONS_ROUTE, PATIENT_RESOURCE,
    PATIENT_SERVICES_ROUTE, QUEUES_ROUTE, SERVICE_RESOURCE,
};
pub use dispatcher::{classify, Dispatcher, DEFAULT_NOT_FOUND_MESSAGE};
pub use endpoint::{BackendEndpoint, EndpointError, EndpointRegistry};
pub use error::CommandFailure;
pub use notifications::{
    BackoffPolicy, BusError, BusSession, ConsumerError, ConsumerHandle, ConsumerSettings,
    DeadLetterPoisonMessage, Delivery, DeliveryProcessor, DeliveryTag, DropPoisonMessage,
    EventPublisher, FixedBackoff, InMemoryNotificationBus, NotificationBuffer, NotificationBus,
    NotificationConsumer, NotificationPublisher, PoisonDisposition, PoisonPolicy,
};
pub use routing::{CommandBinding, CommandTable, RoutingError, TimeoutPolicy};
pub use services::{
    consultation_endpoint, patient_endpoint, service_endpoint, service_store, CommandOutput,
    CommandResult, LocalEndpoint, LocalEndpointBuilder, PatientService, RecordStore,
};
