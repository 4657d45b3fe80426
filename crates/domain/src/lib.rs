//! 边缘分发网关核心领域模型
//!
//! 包含命令信封、分类结果、实体创建通知以及队列快照等核心类型。

pub mod command;
pub mod entities;
pub mod envelope;
pub mod errors;
pub mod notification;
pub mod outcome;

// 重新导出常用类型
pub use command::*;
pub use entities::*;
pub use envelope::*;
pub use errors::*;
pub use notification::*;
pub use outcome::*;
