//! 患者实体定义

use serde::{Deserialize, Serialize};
use validator::Validate;

/// 患者实体（持久化后的完整表示）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Patient {
    /// 患者ID
    pub id_patient: i64,
    /// 姓
    pub nom_patient: String,
    /// 名
    pub prenom_patient: String,
    /// 年龄
    pub age_patient: String,
    /// 病情
    pub maladie_patient: String,
    /// 状态（可选）
    #[serde(default)]
    pub status_patient: Option<String>,
}

/// 创建患者请求
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct NewPatient {
    #[validate(length(min = 1, message = "must not be empty"))]
    pub nom_patient: String,
    #[validate(length(min = 1, message = "must not be empty"))]
    pub prenom_patient: String,
    #[validate(length(min = 1, message = "must not be empty"))]
    pub age_patient: String,
    #[validate(length(min = 1, message = "must not be empty"))]
    pub maladie_patient: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status_patient: Option<String>,
}
