//! 命令路由标识
//!
//! 端点标识、命令名称以及命令种类。

use serde::{Deserialize, Serialize};
use std::fmt;

/// 后端端点标识
///
/// 每个业务域对应一个端点，例如 "services"、"patients"、"consultations"。
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EndpointId(String);

impl EndpointId {
    /// 服务记录端点
    pub const SERVICES: &'static str = "services";
    /// 患者记录端点
    pub const PATIENTS: &'static str = "patients";
    /// 会诊记录端点
    pub const CONSULTATIONS: &'static str = "consultations";

    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn services() -> Self {
        Self::new(Self::SERVICES)
    }

    pub fn patients() -> Self {
        Self::new(Self::PATIENTS)
    }

    pub fn consultations() -> Self {
        Self::new(Self::CONSULTATIONS)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EndpointId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for EndpointId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

/// 命令名称（每个端点有固定的命令词汇表）
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CommandName(String);

impl CommandName {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CommandName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for CommandName {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

/// 命令种类
///
/// 分发器只根据种类决定是否把 `success=false` 的错误回复识别为“未找到”。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommandKind {
    /// 列表读取
    List,
    /// 按标识查找
    Lookup,
    /// 创建
    Create,
    /// 更新
    Update,
    /// 删除
    Delete,
    /// 其他查询（通知缓冲区、队列状态等）
    Query,
}

impl CommandKind {
    /// 该种类的命令是否可以报告“记录不存在”
    pub fn reports_not_found(&self) -> bool {
        matches!(self, CommandKind::Lookup | CommandKind::Delete)
    }
}

impl fmt::Display for CommandKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            CommandKind::List => "list",
            CommandKind::Lookup => "lookup",
            CommandKind::Create => "create",
            CommandKind::Update => "update",
            CommandKind::Delete => "delete",
            CommandKind::Query => "query",
        };
        f.write_str(label)
    }
}
