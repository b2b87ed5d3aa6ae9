//! Management API Integration Tests

use sessiond::{
    config::SessionConfig,
    management::{ApiAuthConfig, ManagementServer},
    ListenerHub, Metrics, TcpSessionFactory,
};
use std::sync::Arc;
use std::time::Duration;
use axum::{
    body::{to_bytes, Body},
    http::{Request, StatusCode},
    Router,
};
use serde_json::Value;
use tower::ServiceExt;

const API_KEY: &str = "test-key";

fn create_hub() -> Arc<ListenerHub> {
    let config = SessionConfig::default();
    Arc::new(ListenerHub::new(
        Arc::new(TcpSessionFactory::new(&config)),
        Arc::new(Metrics::new().unwrap()),
        &config,
    ))
}

fn create_router(hub: Arc<ListenerHub>) -> Router {
    let auth_config = ApiAuthConfig {
        enabled: true,
        api_key: Some(API_KEY.to_string()),
        basic_auth: None,
    };

    ManagementServer::new("127.0.0.1:0".parse().unwrap(), hub, auth_config).router()
}

fn authed(method: &str, uri: &str, body: Body) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header("x-api-key", API_KEY)
        .header("content-type", "application/json")
        .body(body)
        .unwrap()
}

async fn json_body(response: axum::response::Response) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn test_health_endpoint_is_public() {
    let app = create_router(create_hub());

    let request = Request::builder()
        .uri("/api/v1/health")
        .body(Body::empty())
        .unwrap();

    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = json_body(response).await;
    assert_eq!(body["success"], true);
    assert_eq!(body["data"]["status"], "degraded");
}

#[tokio::test]
async fn test_protected_routes_require_api_key() {
    let app = create_router(create_hub());

    let request = Request::builder()
        .uri("/api/v1/status")
        .body(Body::empty())
        .unwrap();
    let response = app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let response = app
        .oneshot(authed("GET", "/api/v1/status", Body::empty()))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = json_body(response).await;
    assert_eq!(body["data"]["listeners"], 0);
    assert_eq!(body["data"]["online_sessions"], 0);
}

#[tokio::test]
async fn test_listener_lifecycle_over_api() {
    let hub = create_hub();
    let app = create_router(Arc::clone(&hub));

    let response = app
        .clone()
        .oneshot(authed(
            "POST",
            "/api/v1/listeners",
            Body::from(r#"{"host":"127.0.0.1","port":0}"#),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = json_body(response).await;
    assert_eq!(body["success"], true);
    assert_eq!(body["data"]["state"], "listening");
    let id = body["data"]["id"].as_str().unwrap().to_string();

    let response = app
        .clone()
        .oneshot(authed("GET", "/api/v1/listeners", Body::empty()))
        .await
        .unwrap();
    let body = json_body(response).await;
    assert_eq!(body["data"].as_array().unwrap().len(), 1);
    assert_eq!(body["data"][0]["id"], id.as_str());

    let response = app
        .clone()
        .oneshot(authed("GET", &format!("/api/v1/listeners/{}", id), Body::empty()))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["data"]["summary"], "127.0.0.1:0 (0 online sessions)");
    assert!(body["data"]["sessions"].as_array().unwrap().is_empty());

    let response = app
        .clone()
        .oneshot(authed("DELETE", &format!("/api/v1/listeners/{}", id), Body::empty()))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["data"]["sessions_closed"], 0);

    let response = app
        .oneshot(authed("DELETE", &format!("/api/v1/listeners/{}", id), Body::empty()))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    assert!(hub.listeners().await.is_empty());
}

#[tokio::test]
async fn test_session_routes() {
    let hub = create_hub();
    let registry = hub.start_listener("127.0.0.1", 0).await.unwrap();
    let _client = tokio::net::TcpStream::connect(registry.local_addr().await.unwrap())
        .await
        .unwrap();

    tokio::time::timeout(Duration::from_secs(5), async {
        while registry.session_count().await != 1 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap();

    let app = create_router(Arc::clone(&hub));

    let response = app
        .clone()
        .oneshot(authed("GET", "/api/v1/sessions", Body::empty()))
        .await
        .unwrap();
    let body = json_body(response).await;
    let sessions = body["data"].as_array().unwrap();
    assert_eq!(sessions.len(), 1);
    assert_eq!(sessions[0]["listener_id"], registry.id());
    let session_id = sessions[0]["id"].as_str().unwrap().to_string();

    let response = app
        .clone()
        .oneshot(authed("DELETE", &format!("/api/v1/sessions/{}", session_id), Body::empty()))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(registry.session_count().await, 0);

    let response = app
        .oneshot(authed("DELETE", &format!("/api/v1/sessions/{}", session_id), Body::empty()))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    hub.shutdown(Duration::from_secs(5)).await;
}

#[tokio::test]
async fn test_metrics_export() {
    let app = create_router(create_hub());

    let response = app
        .oneshot(authed("GET", "/api/v1/metrics", Body::empty()))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let text = String::from_utf8(bytes.to_vec()).unwrap();
    assert!(text.contains("sessiond_sessions_online"));
    assert!(text.contains("sessiond_listeners_active"));
}
