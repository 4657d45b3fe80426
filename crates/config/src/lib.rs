//! 统一配置中心
//!
//! 提供网关的全局配置管理，包括：
//! - HTTP 服务设置
//! - 命令分发超时
//! - 后端端点传输方式
//! - 通知总线连接与消费参数
//! - 通知缓冲区保留策略
//!
//! 加载优先级：默认值 -> 可选配置文件（`MEDGATE_CONFIG_FILE`）-> 环境变量（`MEDGATE_*`，
//! 嵌套字段用 `__` 分隔，例如 `MEDGATE_BUS__KIND=redis`）。

use figment::providers::{Env, Format, Json, Serialized, Toml, Yaml};
use figment::Figment;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use validator::Validate;

/// 配置文件路径环境变量
pub const CONFIG_FILE_ENV: &str = "MEDGATE_CONFIG_FILE";
/// 环境变量前缀
pub const ENV_PREFIX: &str = "MEDGATE_";

/// 全局应用配置
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct AppConfig {
    /// 服务配置
    #[validate(nested)]
    pub server: ServerConfig,
    /// 分发器配置
    #[validate(nested)]
    pub dispatch: DispatchConfig,
    /// 后端端点配置
    #[validate(nested)]
    pub endpoints: EndpointsConfig,
    /// 通知总线配置
    #[validate(nested)]
    pub bus: BusConfig,
    /// 通知缓冲区配置
    #[validate(nested)]
    pub notifications: NotificationsConfig,
}

/// 服务器配置
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct ServerConfig {
    #[validate(length(min = 1))]
    pub host: String,
    #[validate(range(min = 1))]
    pub port: u16,
    /// 网关路由前缀
    pub path_prefix: String,
    #[serde(default)]
    pub cors_origins: Vec<String>,
}

/// 分发器配置
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct DispatchConfig {
    /// 默认等待上限（毫秒）
    #[validate(range(min = 1))]
    pub default_timeout_ms: u64,
}

/// 端点传输方式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EndpointTransport {
    /// 进程内端点
    Local,
    /// 通过 HTTP 调用远程端点
    Http,
}

/// 单个端点配置
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct EndpointConfig {
    pub transport: EndpointTransport,
    #[serde(default)]
    #[validate(url)]
    pub base_url: Option<String>,
    /// 传输层请求上限（毫秒），只对 HTTP 端点生效
    #[validate(range(min = 1))]
    pub request_timeout_ms: u64,
    /// 远程端点声明的命令词汇表
    #[serde(default)]
    pub commands: Vec<String>,
}

impl EndpointConfig {
    pub fn local() -> Self {
        Self {
            transport: EndpointTransport::Local,
            base_url: None,
            request_timeout_ms: 30_000,
            commands: Vec::new(),
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

/// 后端端点集合
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct EndpointsConfig {
    #[validate(nested)]
    pub services: EndpointConfig,
    #[validate(nested)]
    pub patients: EndpointConfig,
    #[validate(nested)]
    pub consultations: EndpointConfig,
}

/// 通知总线实现
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BusKind {
    /// 进程内总线
    Memory,
    /// Redis Stream
    Redis,
}

/// 通知总线配置
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct BusConfig {
    pub kind: BusKind,
    #[validate(url)]
    pub url: String,
    #[validate(length(min = 1))]
    pub queue: String,
    #[validate(length(min = 1))]
    pub consumer_group: String,
    #[validate(length(min = 1))]
    pub consumer_name: String,
    /// 断线后重连的固定间隔（毫秒）
    #[validate(range(min = 1))]
    pub reconnect_delay_ms: u64,
    /// 内省观察窗口（毫秒）
    #[validate(range(min = 1))]
    pub observation_window_ms: u64,
    /// 单次接收的最长等待（毫秒）
    #[validate(range(min = 1))]
    pub poll_interval_ms: u64,
    /// 超过该空闲时长的消费者不再计为活跃（毫秒）
    #[validate(range(min = 1))]
    pub consumer_idle_ms: u64,
    /// 会话上单次操作的额外宽限（毫秒），超时视为连接丢失
    #[validate(range(min = 1))]
    pub operation_timeout_ms: u64,
}

impl BusConfig {
    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_delay_ms)
    }

    pub fn observation_window(&self) -> Duration {
        Duration::from_millis(self.observation_window_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn operation_timeout(&self) -> Duration {
        Duration::from_millis(self.operation_timeout_ms)
    }
}

/// 毒消息处理策略
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PoisonPolicyKind {
    /// 记录日志并确认（丢弃）
    Drop,
    /// 转发到死信队列后确认
    DeadLetter,
}

/// 通知缓冲区配置
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct NotificationsConfig {
    /// 缓冲区容量，超出后淘汰最旧的通知
    #[validate(range(min = 1))]
    pub buffer_capacity: usize,
    pub poison_policy: PoisonPolicyKind,
    #[validate(length(min = 1))]
    pub dead_letter_queue: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: "127.0.0.1".into(),
                port: 5000,
                path_prefix: "/gateway".into(),
                cors_origins: vec![
                    "http://localhost:3002".into(),
                    "http://localhost:3003".into(),
                ],
            },
            dispatch: DispatchConfig {
                default_timeout_ms: 5_000,
            },
            endpoints: EndpointsConfig {
                services: EndpointConfig::local(),
                patients: EndpointConfig::local(),
                consultations: EndpointConfig::local(),
            },
            bus: BusConfig {
                kind: BusKind::Memory,
                url: "redis://127.0.0.1:6379".into(),
                queue: "patient_created".into(),
                consumer_group: "medgate-services".into(),
                consumer_name: "services-1".into(),
                reconnect_delay_ms: 5_000,
                observation_window_ms: 1_000,
                poll_interval_ms: 250,
                consumer_idle_ms: 30_000,
                operation_timeout_ms: 5_000,
            },
            notifications: NotificationsConfig {
                buffer_capacity: 10_000,
                poison_policy: PoisonPolicyKind::Drop,
                dead_letter_queue: "patient_created.dead_letter".into(),
            },
        }
    }
}

impl AppConfig {
    /// 加载配置：默认值 -> 可选文件 -> 环境变量
    pub fn load() -> Result<Self, ConfigError> {
        let cfg: AppConfig = Self::figment().extract().map_err(Box::new)?;
        cfg.check()?;
        Ok(cfg)
    }

    /// 构建分层配置源
    pub fn figment() -> Figment {
        let mut fig = Figment::new().merge(Serialized::defaults(AppConfig::default()));
        if let Ok(path) = std::env::var(CONFIG_FILE_ENV) {
            if path.ends_with(".yml") || path.ends_with(".yaml") {
                fig = fig.merge(Yaml::file(path));
            } else if path.ends_with(".json") {
                fig = fig.merge(Json::file(path));
            } else {
                fig = fig.merge(Toml::file(path));
            }
        }
        fig.merge(Env::prefixed(ENV_PREFIX).split("__"))
    }

    /// 验证配置有效性
    pub fn check(&self) -> Result<(), ConfigError> {
        self.validate()?;

        for (name, endpoint) in self.endpoint_entries() {
            if endpoint.transport == EndpointTransport::Http {
                if endpoint.base_url.is_none() {
                    return Err(ConfigError::InvalidEndpoint(format!(
                        "endpoint `{}` uses http transport but has no base_url",
                        name
                    )));
                }
                if endpoint.commands.is_empty() {
                    return Err(ConfigError::InvalidEndpoint(format!(
                        "endpoint `{}` uses http transport but declares no commands",
                        name
                    )));
                }
            }
        }

        if !self.server.path_prefix.is_empty() && !self.server.path_prefix.starts_with('/') {
            return Err(ConfigError::InvalidServerConfig(
                "path_prefix must start with '/'".to_string(),
            ));
        }

        // 内省最多等待一个轮询间隔再加观察窗口，必须在分发器超时之前完成
        let introspection_ms = self
            .bus
            .observation_window_ms
            .saturating_add(self.bus.poll_interval_ms);
        if introspection_ms >= self.dispatch.default_timeout_ms {
            return Err(ConfigError::InvalidBusConfig(format!(
                "observation_window_ms + poll_interval_ms ({}) must be below dispatch.default_timeout_ms ({})",
                introspection_ms, self.dispatch.default_timeout_ms
            )));
        }

        if self.bus.queue == self.notifications.dead_letter_queue {
            return Err(ConfigError::InvalidBusConfig(
                "dead_letter_queue must differ from the notification queue".to_string(),
            ));
        }

        Ok(())
    }

    /// 按名称列出所有端点配置
    pub fn endpoint_entries(&self) -> [(&'static str, &EndpointConfig); 3] {
        [
            ("services", &self.endpoints.services),
            ("patients", &self.endpoints.patients),
            ("consultations", &self.endpoints.consultations),
        ]
    }

    pub fn default_timeout(&self) -> Duration {
        Duration::from_millis(self.dispatch.default_timeout_ms)
    }

    /// 脱敏后的配置描述（用于日志）
    pub fn sanitize(&self) -> String {
        let mut text = format!("{:?}", self);
        if let Some(start) = text.find("redis://") {
            let scheme_end = start + "redis://".len();
            let url_end = text[scheme_end..]
                .find('"')
                .map(|i| scheme_end + i)
                .unwrap_or(text.len());
            if let Some(at) = text[scheme_end..url_end].find('@') {
                text.replace_range(start..scheme_end + at, "redis://[REDACTED]");
            }
        }
        text
    }
}

/// 配置错误类型
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    Load(#[from] Box<figment::Error>),
    #[error("invalid configuration: {0}")]
    Validation(#[from] validator::ValidationErrors),
    #[error("Invalid endpoint configuration: {0}")]
    InvalidEndpoint(String),
    #[error("Invalid server configuration: {0}")]
    InvalidServerConfig(String),
    #[error("Invalid bus configuration: {0}")]
    InvalidBusConfig(String),
}
