//! 核心实体定义

pub mod patient;
pub mod service;

pub use patient::*;
pub use service::*;
