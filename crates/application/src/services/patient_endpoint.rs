//! 患者端点
//!
//! 创建患者时先持久化，再发布 `patient_created` 通知。发布失败不会回滚
//! 已保存的患者，只记录警告。

use std::sync::Arc;

use domain::{DomainError, DomainResult, EndpointId, NewPatient, NotificationEvent, Patient};
use serde_json::Value;
use tracing::{info, warn};
use validator::Validate;

use super::local_endpoint::{CommandOutput, CommandResult, LocalEndpoint};
use super::record_store::{parse_id, RecordStore};
use crate::catalog::{CrudOp, PATIENT_RESOURCE};
use crate::notifications::EventPublisher;

/// 患者用例
pub struct PatientService {
    store: RecordStore,
    publisher: Arc<dyn EventPublisher>,
}

impl PatientService {
    pub fn new(publisher: Arc<dyn EventPublisher>) -> Self {
        Self {
            store: RecordStore::for_resource(&PATIENT_RESOURCE),
            publisher,
        }
    }

    pub fn list(&self) -> DomainResult<Vec<Patient>> {
        self.store
            .list()
            .into_iter()
            .map(|record| serde_json::from_value(record).map_err(DomainError::from))
            .collect()
    }

    pub fn get(&self, id: i64) -> DomainResult<Patient> {
        Ok(serde_json::from_value(self.store.get(id)?)?)
    }

    /// 保存患者并发布创建通知
    pub async fn create(&self, new_patient: NewPatient) -> DomainResult<Patient> {
        new_patient.validate()?;
        let stored = self.store.insert(serde_json::to_value(&new_patient)?)?;
        let patient: Patient = serde_json::from_value(stored)?;
        info!(id_patient = patient.id_patient, "患者已保存");

        match NotificationEvent::from_entity(&patient) {
            Ok(event) => {
                if let Err(err) = self.publisher.publish(&event).await {
                    warn!(
                        id_patient = patient.id_patient,
                        error = %err,
                        "患者已保存，但创建通知发布失败"
                    );
                }
            }
            Err(err) => {
                warn!(id_patient = patient.id_patient, error = %err, "无法编码患者创建通知")
            }
        }

        Ok(patient)
    }
}

/// 构建患者端点
pub fn patient_endpoint(service: Arc<PatientService>) -> LocalEndpoint {
    let mut builder = LocalEndpoint::builder(EndpointId::patients());
    for (op, command) in PATIENT_RESOURCE.commands {
        builder = match op {
            CrudOp::List => builder.command_with(*command, service.clone(), list_patients),
            CrudOp::Create => builder.command_with(*command, service.clone(), create_patient),
            CrudOp::Get => builder.command_with(*command, service.clone(), get_patient),
            CrudOp::Update | CrudOp::Delete => builder,
        };
    }
    builder.build()
}

async fn list_patients(service: Arc<PatientService>, _payload: Value) -> CommandResult {
    let patients = service.list()?;
    Ok(CommandOutput::new(
        "Patients retrieved successfully",
        serde_json::to_value(patients)?,
    ))
}

async fn create_patient(service: Arc<PatientService>, payload: Value) -> CommandResult {
    let new_patient: NewPatient = serde_json::from_value(payload)?;
    let patient = service.create(new_patient).await?;
    Ok(CommandOutput::new(
        "Patient created successfully",
        serde_json::to_value(patient)?,
    ))
}

async fn get_patient(service: Arc<PatientService>, payload: Value) -> CommandResult {
    let patient = service.get(parse_id(&payload)?)?;
    Ok(CommandOutput::new(
        "Patient retrieved successfully",
        serde_json::to_value(patient)?,
    ))
}
