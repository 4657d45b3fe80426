//! 网关 HTTP 路由测试
//!
//! 使用默认配置（全部本地端点 + 内存总线）装配完整网关，通过 `oneshot` 驱动路由。

use std::time::Duration;

use axum::{
    body::{to_bytes, Body},
    http::{Request, StatusCode},
    Router,
};
use config::AppConfig;
use infrastructure::Infrastructure;
use serde_json::{json, Value};
use tower::ServiceExt;
use web_api::{router, AppState, GATEWAY_HEADER};

struct TestGateway {
    app: Router,
    _infrastructure: Infrastructure,
}

fn gateway() -> TestGateway {
    let config = AppConfig::default();
    let mut infrastructure = Infrastructure::build(&config).unwrap();
    infrastructure.start_consumer();
    let app = router(AppState::from_infrastructure(&infrastructure), &config.server);
    TestGateway {
        app,
        _infrastructure: infrastructure,
    }
}

async fn send(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, bool, Value) {
    let builder = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let tagged = response.headers().get(GATEWAY_HEADER).is_some();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, tagged, body)
}

#[tokio::test]
async fn health_check_is_ok() {
    let gateway = gateway();
    let (status, _, _) = send(&gateway.app, "GET", "/health", None).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn service_crud_through_the_gateway() {
    let gateway = gateway();
    let app = &gateway.app;

    let (status, tagged, created) = send(
        app,
        "POST",
        "/gateway/services",
        Some(json!({"nom_service": "Cardiologie"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert!(tagged);
    assert_eq!(created["id_service"], 1);

    let (status, _, fetched) = send(app, "GET", "/gateway/services/1", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(fetched["nom_service"], "Cardiologie");

    let (status, _, updated) = send(
        app,
        "PUT",
        "/gateway/services/1",
        Some(json!({"nom_service": "Pédiatrie"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(updated["nom_service"], "Pédiatrie");
    assert_eq!(updated["id_service"], 1);

    let (status, _, listed) = send(app, "GET", "/gateway/patients/services", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(listed.as_array().unwrap().len(), 1);

    let (status, _, _) = send(app, "DELETE", "/gateway/services/1", None).await;
    assert_eq!(status, StatusCode::OK);

    let (status, tagged, error) = send(app, "DELETE", "/gateway/services/1", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(!tagged);
    assert_eq!(error["code"], "NOT_FOUND");
}

#[tokio::test]
async fn missing_consultation_is_not_found() {
    let gateway = gateway();
    let (status, _, error) = send(&gateway.app, "GET", "/gateway/ordonnances/42", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(error["message"].as_str().unwrap().contains("42"));
}

#[tokio::test]
async fn invalid_payload_is_a_backend_failure() {
    let gateway = gateway();
    let (status, _, error) = send(
        &gateway.app,
        "POST",
        "/gateway/services",
        Some(json!({"nom_service": ""})),
    )
    .await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(error["code"], "BACKEND_FAILURE");
}

#[tokio::test]
async fn patients_expose_no_update_or_delete() {
    let gateway = gateway();
    let (status, _, _) = send(&gateway.app, "DELETE", "/gateway/patients/1", None).await;
    assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED);
}

#[tokio::test(start_paused = true)]
async fn created_patient_shows_up_in_notifications() {
    let gateway = gateway();
    let app = &gateway.app;

    let (status, _, patient) = send(
        app,
        "POST",
        "/gateway/patients",
        Some(json!({
            "nom_patient": "Diallo",
            "prenom_patient": "Awa",
            "age_patient": "34",
            "maladie_patient": "paludisme"
        })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let mut notifications = Value::Null;
    for _ in 0..100 {
        let (status, _, body) =
            send(app, "GET", "/gateway/notifications/patient-created", None).await;
        assert_eq!(status, StatusCode::OK);
        if body.as_array().is_some_and(|events| !events.is_empty()) {
            notifications = body;
            break;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    assert_eq!(notifications, json!([patient]));

    let (status, _, snapshot) = send(app, "GET", "/gateway/queues", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(snapshot["pendingCount"], 0);
    assert_eq!(snapshot["activeConsumerCount"], 1);
}

#[tokio::test]
async fn command_server_executes_local_commands() {
    let gateway = gateway();

    let (status, _, reply) = send(
        &gateway.app,
        "POST",
        "/internal/consultations/commands",
        Some(json!({"command": "getAllArretsTravail", "payload": {}})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(reply["status"], "success");
    assert_eq!(reply["data"], json!([]));

    let (status, _, reply) = send(
        &gateway.app,
        "POST",
        "/internal/consultations/commands",
        Some(json!({"command": "dropAllTables", "payload": {}})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(reply["status"], "error");

    let (status, _, _) = send(
        &gateway.app,
        "POST",
        "/internal/billing/commands",
        Some(json!({"command": "getAll", "payload": {}})),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}
