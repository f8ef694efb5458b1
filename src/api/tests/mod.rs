use super::*;
use crate::conversion::ScriptedConversionClient;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use serde_json::Value;
use std::time::Duration;
use tempfile::tempdir;
use tower::ServiceExt;


/// Orchestrator over a temp dir with fast resilience settings
async fn create_test_orchestrator(
    client: ScriptedConversionClient,
) -> (Arc<Orchestrator>, Arc<Config>, tempfile::TempDir) {
    let temp_dir = tempdir().unwrap();
    let mut config = Config {
        input_dir: temp_dir.path().join("InputFiles"),
        output_dir: temp_dir.path().join("OutputFiles"),
        ..Default::default()
    };
    config.resilience.rate_limit_backoff = Duration::from_millis(5);
    config.resilience.inter_file_delay = Duration::ZERO;
    config.api.bind_address = "127.0.0.1:0".parse().unwrap();

    let orchestrator = Orchestrator::new(config.clone(), Arc::new(client))
        .await
        .unwrap();
    (Arc::new(orchestrator), Arc::new(config), temp_dir)
}

fn add_inputs(config: &Config, names: &[&str]) {
    for name in names {
        std::fs::write(config.input_dir.join(name), b"document").unwrap();
    }
}

async fn send(app: &Router, method: &str, uri: &str) -> (StatusCode, Value) {
    let request = Request::builder()
        .method(method)
        .uri(uri)
        .body(Body::empty())
        .unwrap();
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json = if body.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&body).unwrap()
    };
    (status, json)
}

#[tokio::test]
async fn test_api_server_spawns_and_shuts_down() {
    let (orchestrator, config, _temp_dir) =
        create_test_orchestrator(ScriptedConversionClient::new()).await;

    let (tx, rx) = tokio::sync::oneshot::channel::<()>();
    let api_handle = tokio::spawn(start_api_server(orchestrator, config, async move {
        rx.await.ok();
    }));

    tokio::time::sleep(Duration::from_millis(100)).await;
    tx.send(()).unwrap();

    let result = tokio::time::timeout(Duration::from_secs(5), api_handle)
        .await
        .unwrap()
        .unwrap();
    assert!(result.is_ok());
}

#[tokio::test]
async fn test_cors_enabled() {
    let (orchestrator, config, _temp_dir) =
        create_test_orchestrator(ScriptedConversionClient::new()).await;
    let app = create_router(orchestrator, config);

    let request = Request::builder()
        .method("OPTIONS")
        .uri("/health")
        .header("Origin", "http://localhost:3000")
        .header("Access-Control-Request-Method", "GET")
        .body(Body::empty())
        .unwrap();
    let response = app.oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert!(
        response
            .headers()
            .contains_key("access-control-allow-origin"),
        "CORS preflight should set access-control-allow-origin"
    );
}

#[tokio::test]
async fn test_cors_disabled() {
    let (orchestrator, config, _temp_dir) =
        create_test_orchestrator(ScriptedConversionClient::new()).await;
    let mut config = (*config).clone();
    config.api.cors_enabled = false;
    let app = create_router(orchestrator, Arc::new(config));

    let request = Request::builder()
        .uri("/health")
        .header("Origin", "http://localhost:3000")
        .body(Body::empty())
        .unwrap();
    let response = app.oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert!(
        !response
            .headers()
            .contains_key("access-control-allow-origin")
    );
}
