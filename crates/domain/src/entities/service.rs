//! 服务（科室）实体定义

use serde::{Deserialize, Serialize};
use validator::Validate;

/// 服务实体
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Service {
    pub id_service: i64,
    pub nom_service: String,
}

/// 创建服务请求
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct NewService {
    #[validate(length(min = 1, message = "must not be empty"))]
    pub nom_service: String,
}
