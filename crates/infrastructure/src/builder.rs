use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use application::{
    consultation_endpoint, gateway_bindings, patient_endpoint, service_endpoint, service_store,
    BackendEndpoint, CommandTable, ConsumerHandle, ConsumerSettings, DeadLetterPoisonMessage,
    Dispatcher, DropPoisonMessage, EndpointRegistry, FixedBackoff, InMemoryNotificationBus,
    LocalEndpoint, NotificationBuffer, NotificationBus, NotificationConsumer,
    NotificationPublisher, PatientService, PoisonPolicy,
};
use config::{AppConfig, BusKind, EndpointConfig, EndpointTransport, PoisonPolicyKind};
use domain::{CommandName, EndpointId};
use tokio::task::JoinHandle;
use tracing::info;

use crate::error::InfrastructureError;
use crate::http_endpoint::HttpBackendEndpoint;
use crate::redis_bus::RedisStreamBus;

/// 装配完成的运行时组件
pub struct Infrastructure {
    pub dispatcher: Dispatcher,
    pub table: Arc<CommandTable>,
    /// 本进程承载的端点（命令服务器对外提供）
    pub local_endpoints: BTreeMap<EndpointId, Arc<LocalEndpoint>>,
    pub bus: Arc<dyn NotificationBus>,
    /// 只有服务端点在本进程时才有通知消费者
    pub consumer: Option<ConsumerHandle>,
    pending_consumer: Option<NotificationConsumer>,
}

impl Infrastructure {
    /// 按配置装配总线、端点、路由表和分发器
    pub fn build(config: &AppConfig) -> Result<Self, InfrastructureError> {
        let bus: Arc<dyn NotificationBus> = match config.bus.kind {
            BusKind::Memory => Arc::new(InMemoryNotificationBus::new()),
            BusKind::Redis => Arc::new(RedisStreamBus::new(
                &config.bus.url,
                config.bus.consumer_group.clone(),
                Duration::from_millis(config.bus.consumer_idle_ms),
            )?),
        };

        let mut local_endpoints = BTreeMap::new();
        let mut registry = EndpointRegistry::new();
        let mut consumer = None;
        let mut pending_consumer = None;

        for (name, endpoint_config) in config.endpoint_entries() {
            let id = EndpointId::new(name);
            match endpoint_config.transport {
                EndpointTransport::Local => {
                    let endpoint = Arc::new(match name {
                        EndpointId::SERVICES => {
                            let (task, handle) = build_consumer(config, bus.clone());
                            consumer = Some(handle.clone());
                            pending_consumer = Some(task);
                            service_endpoint(Arc::new(service_store()), handle)
                        }
                        EndpointId::PATIENTS => {
                            let publisher =
                                NotificationPublisher::new(bus.clone(), config.bus.queue.clone());
                            patient_endpoint(Arc::new(PatientService::new(Arc::new(publisher))))
                        }
                        _ => consultation_endpoint(),
                    });
                    registry.register(endpoint.clone() as Arc<dyn BackendEndpoint>);
                    local_endpoints.insert(id, endpoint);
                }
                EndpointTransport::Http => {
                    registry.register(Arc::new(http_endpoint(id, endpoint_config)?));
                }
            }
            info!(endpoint = name, transport = ?endpoint_config.transport, "端点已注册");
        }

        let table = CommandTable::resolve(gateway_bindings(), &registry)?;
        info!(routes = table.len(), "路由表已解析");

        Ok(Self {
            dispatcher: Dispatcher::new(registry, config.default_timeout()),
            table: Arc::new(table),
            local_endpoints,
            bus,
            consumer,
            pending_consumer,
        })
    }

    /// 启动后台通知消费者（只会启动一次）
    pub fn start_consumer(&mut self) -> Option<JoinHandle<()>> {
        self.pending_consumer.take().map(NotificationConsumer::spawn)
    }
}

fn build_consumer(
    config: &AppConfig,
    bus: Arc<dyn NotificationBus>,
) -> (NotificationConsumer, ConsumerHandle) {
    let poison: Arc<dyn PoisonPolicy> = match config.notifications.poison_policy {
        PoisonPolicyKind::Drop => Arc::new(DropPoisonMessage),
        PoisonPolicyKind::DeadLetter => Arc::new(DeadLetterPoisonMessage::new(
            bus.clone(),
            config.notifications.dead_letter_queue.clone(),
        )),
    };
    let settings = ConsumerSettings::new(config.bus.queue.clone(), config.bus.consumer_name.clone())
        .with_poll_interval(config.bus.poll_interval())
        .with_observation_window(config.bus.observation_window())
        .with_operation_timeout(config.bus.operation_timeout());

    NotificationConsumer::new(
        bus,
        settings,
        Arc::new(NotificationBuffer::new(config.notifications.buffer_capacity)),
        Arc::new(FixedBackoff::new(config.bus.reconnect_delay())),
        poison,
    )
}

fn http_endpoint(
    id: EndpointId,
    config: &EndpointConfig,
) -> Result<HttpBackendEndpoint, InfrastructureError> {
    let base_url = config
        .base_url
        .as_deref()
        .ok_or_else(|| InfrastructureError::InvalidEndpoint {
            endpoint: id.to_string(),
            message: "http transport requires base_url".to_string(),
        })?;
    let commands = config
        .commands
        .iter()
        .map(|command| CommandName::new(command.clone()))
        .collect();
    Ok(HttpBackendEndpoint::new(
        id,
        base_url,
        commands,
        config.request_timeout(),
    )?)
}
