//! 显式命令路由表
//!
//! 每个入站路由在启动时解析为唯一的 `(端点, 命令)` 对，并校验端点存在、
//! 命令已在端点词汇表中声明、路由不重复。

use std::collections::BTreeMap;
use std::time::Duration;

use domain::{CommandKind, CommandName, EndpointId};
use thiserror::Error;

use crate::endpoint::EndpointRegistry;

/// 路由的等待上限策略
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeoutPolicy {
    /// 使用分发器的默认上限
    Default,
    /// 不限制，依赖端点自身的失败
    Unbounded,
    /// 路由专属上限
    Custom(Duration),
}

/// 单条路由绑定
#[derive(Debug, Clone, PartialEq)]
pub struct CommandBinding {
    pub route: String,
    pub endpoint: EndpointId,
    pub command: CommandName,
    pub kind: CommandKind,
    pub timeout: TimeoutPolicy,
}

impl CommandBinding {
    pub fn new(
        route: impl Into<String>,
        endpoint: impl Into<EndpointId>,
        command: impl Into<CommandName>,
        kind: CommandKind,
    ) -> Self {
        Self {
            route: route.into(),
            endpoint: endpoint.into(),
            command: command.into(),
            kind,
            timeout: TimeoutPolicy::Default,
        }
    }

    pub fn without_timeout(mut self) -> Self {
        self.timeout = TimeoutPolicy::Unbounded;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = TimeoutPolicy::Custom(timeout);
        self
    }

    /// 结合默认值得出实际上限，`None` 表示不限制
    pub fn effective_timeout(&self, default: Duration) -> Option<Duration> {
        match self.timeout {
            TimeoutPolicy::Default => Some(default),
            TimeoutPolicy::Unbounded => None,
            TimeoutPolicy::Custom(timeout) => Some(timeout),
        }
    }
}

/// 路由错误
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RoutingError {
    #[error("route `{0}` is declared more than once")]
    DuplicateRoute(String),
    #[error("route `{route}` references unknown endpoint `{endpoint}`")]
    UnknownEndpoint { route: String, endpoint: EndpointId },
    #[error("route `{route}` references command `{command}` not declared by endpoint `{endpoint}`")]
    UndeclaredCommand {
        route: String,
        endpoint: EndpointId,
        command: CommandName,
    },
    #[error("route `{0}` is not bound to any command")]
    UnknownRoute(String),
}

/// 启动时解析并校验过的路由表
#[derive(Debug, Clone, Default)]
pub struct CommandTable {
    bindings: BTreeMap<String, CommandBinding>,
}

impl CommandTable {
    /// 解析并校验路由绑定
    pub fn resolve(
        bindings: Vec<CommandBinding>,
        registry: &EndpointRegistry,
    ) -> Result<Self, RoutingError> {
        let mut table = BTreeMap::new();

        for binding in bindings {
            if !registry.contains(&binding.endpoint) {
                return Err(RoutingError::UnknownEndpoint {
                    route: binding.route,
                    endpoint: binding.endpoint,
                });
            }
            if !registry.declares(&binding.endpoint, &binding.command) {
                return Err(RoutingError::UndeclaredCommand {
                    route: binding.route,
                    endpoint: binding.endpoint,
                    command: binding.command,
                });
            }
            if table.contains_key(&binding.route) {
                return Err(RoutingError::DuplicateRoute(binding.route));
            }
            table.insert(binding.route.clone(), binding);
        }

        Ok(Self { bindings: table })
    }

    pub fn get(&self, route: &str) -> Result<&CommandBinding, RoutingError> {
        self.bindings
            .get(route)
            .ok_or_else(|| RoutingError::UnknownRoute(route.to_string()))
    }

    pub fn iter(&self) -> impl Iterator<Item = &CommandBinding> {
        self.bindings.values()
    }

    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }
}
