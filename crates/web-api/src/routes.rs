use axum::{
    extract::{Path, State},
    http::{HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, MethodRouter},
    Json, Router,
};
use serde_json::{json, Value};
use tower_http::{
    cors::{AllowOrigin, Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::warn;

use application::{
    resources, CrudOp, ResourceCommands, NOTIFICATIONS_ROUTE, PATIENT_SERVICES_ROUTE,
    QUEUES_ROUTE,
};
use config::ServerConfig;
use domain::ClassifiedResult;

use crate::{command_server, error::ApiError, state::AppState};

/// 所有成功的网关响应都带上该头
pub const GATEWAY_HEADER: &str = "x-gateway";

pub fn router(state: AppState, server: &ServerConfig) -> Router {
    let prefix = server.path_prefix.trim_end_matches('/');
    let gateway = gateway_routes();
    // axum 不允许在根路径上 nest
    let app = if prefix.is_empty() {
        Router::new().merge(gateway)
    } else {
        Router::new().nest(prefix, gateway)
    };

    app.route("/health", get(health))
        .merge(command_server::routes())
        .layer(cors_layer(&server.cors_origins))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn gateway_routes() -> Router<AppState> {
    let router = resources().fold(Router::new(), |router, resource| {
        router.merge(resource_routes(resource))
    });

    router
        .route("/patients/services", get(patient_services))
        .route("/notifications/patient-created", get(patient_created_notifications))
        .route("/queues", get(display_queues))
}

/// 按资源支持的操作生成集合路由和单条记录路由
fn resource_routes(resource: &'static ResourceCommands) -> Router<AppState> {
    let mut collection: MethodRouter<AppState> = MethodRouter::new();
    let mut item: MethodRouter<AppState> = MethodRouter::new();

    if resource.supports(CrudOp::List) {
        collection = collection.get(move |State(state): State<AppState>| async move {
            forward(&state, &resource.route(CrudOp::List), json!({})).await
        });
    }
    if resource.supports(CrudOp::Create) {
        collection = collection.post(
            move |State(state): State<AppState>, Json(body): Json<Value>| async move {
                forward(&state, &resource.route(CrudOp::Create), body).await
            },
        );
    }
    if resource.supports(CrudOp::Get) {
        item = item.get(
            move |State(state): State<AppState>, Path(id): Path<i64>| async move {
                forward(&state, &resource.route(CrudOp::Get), json!(id)).await
            },
        );
    }
    if resource.supports(CrudOp::Update) {
        item = item.put(
            move |State(state): State<AppState>,
                  Path(id): Path<i64>,
                  Json(changes): Json<Value>| async move {
                forward(
                    &state,
                    &resource.route(CrudOp::Update),
                    json!({ "id": id, "changes": changes }),
                )
                .await
            },
        );
    }
    if resource.supports(CrudOp::Delete) {
        item = item.delete(
            move |State(state): State<AppState>, Path(id): Path<i64>| async move {
                forward(&state, &resource.route(CrudOp::Delete), json!(id)).await
            },
        );
    }

    Router::new()
        .route(&format!("/{}", resource.path), collection)
        .route(&format!("/{}/{{id}}", resource.path), item)
}

async fn health() -> StatusCode {
    StatusCode::OK
}

async fn patient_services(State(state): State<AppState>) -> Result<Response, ApiError> {
    forward(&state, PATIENT_SERVICES_ROUTE, json!({})).await
}

async fn patient_created_notifications(
    State(state): State<AppState>,
) -> Result<Response, ApiError> {
    forward(&state, NOTIFICATIONS_ROUTE, json!({})).await
}

async fn display_queues(State(state): State<AppState>) -> Result<Response, ApiError> {
    forward(&state, QUEUES_ROUTE, json!({})).await
}

/// 查路由表、分发命令，并把分类结果转换为 HTTP 响应
async fn forward(state: &AppState, route: &str, payload: Value) -> Result<Response, ApiError> {
    let binding = state.table.get(route)?;
    match state.dispatcher.dispatch(binding, payload).await {
        ClassifiedResult::Ok { data } => Ok(([(GATEWAY_HEADER, "true")], Json(data)).into_response()),
        failure => Err(ApiError::from(failure)),
    }
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    if origins.iter().any(|origin| origin == "*") {
        return CorsLayer::permissive();
    }

    let allowed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                warn!(origin = %origin, "忽略无效的 CORS 来源");
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(allowed))
        .allow_methods(Any)
        .allow_headers(Any)
}
