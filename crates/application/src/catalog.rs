//! 网关命令目录
//!
//! 每个资源的 CRUD 操作对应一个固定的命令名。网关路由表、本地端点的
//! 处理器表以及 HTTP 路由都从这里生成，保证三者使用同一套词汇。

use std::fmt;

use domain::{CommandKind, EndpointId};

use crate::routing::CommandBinding;

/// 资源上的 CRUD 操作
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CrudOp {
    List,
    Create,
    Get,
    Update,
    Delete,
}

impl CrudOp {
    pub const ALL: [CrudOp; 5] = [
        CrudOp::List,
        CrudOp::Create,
        CrudOp::Get,
        CrudOp::Update,
        CrudOp::Delete,
    ];

    /// 操作对应的命令种类
    pub fn kind(&self) -> CommandKind {
        match self {
            CrudOp::List => CommandKind::List,
            CrudOp::Create => CommandKind::Create,
            CrudOp::Get => CommandKind::Lookup,
            CrudOp::Update => CommandKind::Update,
            CrudOp::Delete => CommandKind::Delete,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            CrudOp::List => "list",
            CrudOp::Create => "create",
            CrudOp::Get => "get",
            CrudOp::Update => "update",
            CrudOp::Delete => "delete",
        }
    }
}

impl fmt::Display for CrudOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 单个资源的命令词汇
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResourceCommands {
    /// URL 路径段，同时作为路由名前缀
    pub path: &'static str,
    /// 承载该资源的端点
    pub endpoint: &'static str,
    /// 记录主键字段名
    pub key: &'static str,
    /// 回复消息中使用的单数名称
    pub singular: &'static str,
    /// 回复消息中使用的复数名称
    pub plural: &'static str,
    pub commands: &'static [(CrudOp, &'static str)],
}

impl ResourceCommands {
    pub fn command(&self, op: CrudOp) -> Option<&'static str> {
        self.commands
            .iter()
            .find(|(candidate, _)| *candidate == op)
            .map(|(_, command)| *command)
    }

    pub fn supports(&self, op: CrudOp) -> bool {
        self.command(op).is_some()
    }

    /// 路由名，例如 `consultations.get`
    pub fn route(&self, op: CrudOp) -> String {
        format!("{}.{}", self.path, op)
    }

    pub fn endpoint_id(&self) -> EndpointId {
        EndpointId::new(self.endpoint)
    }

    /// 生成该资源的全部路由绑定
    pub fn bindings(&self) -> Vec<CommandBinding> {
        self.commands
            .iter()
            .map(|(op, command)| {
                CommandBinding::new(self.route(*op), self.endpoint, *command, op.kind())
            })
            .collect()
    }
}

const fn crud(
    list: &'static str,
    create: &'static str,
    get: &'static str,
    update: &'static str,
    delete: &'static str,
) -> [(CrudOp, &'static str); 5] {
    [
        (CrudOp::List, list),
        (CrudOp::Create, create),
        (CrudOp::Get, get),
        (CrudOp::Update, update),
        (CrudOp::Delete, delete),
    ]
}

const SERVICE_COMMANDS: [(CrudOp, &str); 5] = crud(
    "getAllServices",
    "createService",
    "getServiceById",
    "updateService",
    "deleteService",
);

const PATIENT_COMMANDS: [(CrudOp, &str); 3] = [
    (CrudOp::List, "getAllPatients"),
    (CrudOp::Create, "createPatient"),
    (CrudOp::Get, "getPatientById"),
];

pub static SERVICE_RESOURCE: ResourceCommands = ResourceCommands {
    path: "services",
    endpoint: EndpointId::SERVICES,
    key: "id_service",
    singular: "Service",
    plural: "Services",
    commands: &SERVICE_COMMANDS,
};

pub static PATIENT_RESOURCE: ResourceCommands = ResourceCommands {
    path: "patients",
    endpoint: EndpointId::PATIENTS,
    key: "id_patient",
    singular: "Patient",
    plural: "Patients",
    commands: &PATIENT_COMMANDS,
};

macro_rules! consultation_resource {
    ($path:literal, $singular:literal, $plural:literal, $all:literal, $name:literal) => {
        ResourceCommands {
            path: $path,
            endpoint: EndpointId::CONSULTATIONS,
            key: "id",
            singular: $singular,
            plural: $plural,
            commands: &crud(
                $all,
                concat!("create", $name),
                concat!("get", $name, "ById"),
                concat!("update", $name),
                concat!("delete", $name),
            ),
        }
    };
}

/// 会诊端点承载的全部资源
pub static CONSULTATION_RESOURCES: [ResourceCommands; 7] = [
    consultation_resource!(
        "consultations",
        "Consultation",
        "Consultations",
        "getAllConsultations",
        "Consultation"
    ),
    consultation_resource!(
        "examens-cliniques",
        "Examen clinique",
        "Examens cliniques",
        "getAllExamensCliniques",
        "ExamenClinique"
    ),
    consultation_resource!(
        "examens-paracliniques",
        "Examen paraclinique",
        "Examens paracliniques",
        "getAllExamensParacliniques",
        "ExamenParaclinique"
    ),
    consultation_resource!(
        "lettres-hospitalisation",
        "Lettre d'hospitalisation",
        "Lettres d'hospitalisation",
        "getAllLettresHospitalisation",
        "LettreHospitalisation"
    ),
    consultation_resource!(
        "arrets-travail",
        "Arret de travail",
        "Arrets de travail",
        "getAllArretsTravail",
        "ArretTravail"
    ),
    consultation_resource!(
        "certificats-medicaux",
        "Certificat medical",
        "Certificats medicaux",
        "getAllCertificatsMedicaux",
        "CertificatMedical"
    ),
    consultation_resource!(
        "ordonnances",
        "Ordonnance",
        "Ordonnances",
        "getAllOrdonnances",
        "Ordonnance"
    ),
];

/// 读取通知缓冲区
pub const GET_PATIENT_CREATED_NOTIFICATIONS: &str = "getPatientCreatedNotifications";
/// 队列内省
pub const DISPLAY_QUEUES: &str = "displayQueues";

pub const PATIENT_SERVICES_ROUTE: &str = "patients.services";
pub const NOTIFICATIONS_ROUTE: &str = "notifications.patient_created";
pub const QUEUES_ROUTE: &str = "queues.display";

/// 所有 CRUD 资源
pub fn resources() -> impl Iterator<Item = &'static ResourceCommands> {
    [&SERVICE_RESOURCE, &PATIENT_RESOURCE]
        .into_iter()
        .chain(CONSULTATION_RESOURCES.iter())
}

/// 网关的完整路由绑定
///
/// 服务列表与通知读取两条轻量读路由不设等待上限。
pub fn gateway_bindings() -> Vec<CommandBinding> {
    let mut bindings: Vec<CommandBinding> = resources()
        .flat_map(|resource| resource.bindings())
        .map(|binding| {
            if binding.route == SERVICE_RESOURCE.route(CrudOp::List) {
                binding.without_timeout()
            } else {
                binding
            }
        })
        .collect();

    bindings.push(CommandBinding::new(
        PATIENT_SERVICES_ROUTE,
        EndpointId::SERVICES,
        "getAllServices",
        CommandKind::List,
    ));
    bindings.push(
        CommandBinding::new(
            NOTIFICATIONS_ROUTE,
            EndpointId::SERVICES,
            GET_PATIENT_CREATED_NOTIFICATIONS,
            CommandKind::Query,
        )
        .without_timeout(),
    );
    bindings.push(CommandBinding::new(
        QUEUES_ROUTE,
        EndpointId::SERVICES,
        DISPLAY_QUEUES,
        CommandKind::Query,
    ));

    bindings
}
