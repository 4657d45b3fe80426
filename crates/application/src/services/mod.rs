//! 进程内后端端点

pub mod consultation_endpoint;
pub mod crud;
pub mod local_endpoint;
pub mod patient_endpoint;
pub mod record_store;
pub mod service_endpoint;

pub use consultation_endpoint::consultation_endpoint;
pub use crud::register_crud;
pub use local_endpoint::{CommandOutput, CommandResult, LocalEndpoint, LocalEndpointBuilder};
pub use patient_endpoint::{patient_endpoint, PatientService};
pub use record_store::{parse_id, parse_update, RecordStore};
pub use service_endpoint::{service_endpoint, service_store};
