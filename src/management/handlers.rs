//! Management API Handlers

use super::types::*;
use crate::hub::ListenerHub;
use crate::registry::{RegistryInfo, SessionRegistry};
use axum::{
    extract::{Path, State},
    http::{StatusCode, header},
    response::IntoResponse,
    Json,
};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::SystemTime;
use tracing::{info, warn};

/// Shared application state for handlers
#[derive(Clone)]
pub struct AppState {
    pub hub: Arc<ListenerHub>,
    pub start_time: SystemTime,
}

impl AppState {
    pub fn new(hub: Arc<ListenerHub>) -> Self {
        Self {
            hub,
            start_time: SystemTime::now(),
        }
    }

    fn uptime_seconds(&self) -> u64 {
        SystemTime::now()
            .duration_since(self.start_time)
            .unwrap_or_default()
            .as_secs()
    }
}

/// Health check handler
pub async fn health_check(State(state): State<AppState>) -> Json<ApiResponse<HealthStatus>> {
    let mut checks = HashMap::new();

    checks.insert(
        "server".to_string(),
        CheckResult {
            status: "healthy".to_string(),
            message: Some(format!("Up for {}s", state.uptime_seconds())),
        },
    );

    let listeners = state.hub.listeners().await.len();
    checks.insert(
        "listeners".to_string(),
        CheckResult {
            status: if listeners > 0 { "healthy" } else { "warning" }.to_string(),
            message: Some(format!("{} listeners accepting connections", listeners)),
        },
    );

    let overall_status = if checks.values().all(|c| c.status == "healthy") {
        "healthy"
    } else {
        "degraded"
    };

    Json(ApiResponse::success(HealthStatus {
        status: overall_status.to_string(),
        checks,
        timestamp: SystemTime::now(),
    }))
}

/// Get server status
pub async fn get_server_status(State(state): State<AppState>) -> Json<ApiResponse<ServerStatus>> {
    let status = ServerStatus {
        uptime_seconds: state.uptime_seconds(),
        listeners: state.hub.listeners().await.len(),
        online_sessions: state.hub.online_sessions().await,
        metrics: state.hub.metrics().snapshot(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    };

    Json(ApiResponse::success(status))
}

/// List every listener
pub async fn list_listeners(State(state): State<AppState>) -> Json<ApiResponse<Vec<RegistryInfo>>> {
    let mut infos = Vec::new();
    for registry in state.hub.listeners().await {
        infos.push(registry.info().await);
    }

    Json(ApiResponse::success(infos))
}

/// Start a new listener
pub async fn start_listener(
    State(state): State<AppState>,
    Json(request): Json<StartListenerRequest>,
) -> Json<ApiResponse<RegistryInfo>> {
    if request.host.trim().is_empty() {
        return Json(ApiResponse::error("Host cannot be empty".to_string()));
    }

    match state.hub.start_listener(&request.host, request.port).await {
        Ok(registry) => {
            info!("Listener {}:{} started via management API", request.host, request.port);
            Json(ApiResponse::success(registry.info().await))
        }
        Err(e) => {
            warn!("Failed to start listener via management API: {:#}", e);
            Json(ApiResponse::error(format!("{:#}", e)))
        }
    }
}

/// Describe one listener and its sessions
pub async fn get_listener(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<ApiResponse<ListenerDetail>>, StatusCode> {
    let registry = state.hub.find_listener(&id).await.ok_or(StatusCode::NOT_FOUND)?;
    Ok(Json(ApiResponse::success(listener_detail(&registry).await)))
}

async fn listener_detail(registry: &SessionRegistry) -> ListenerDetail {
    let sessions = registry
        .list_sessions()
        .await
        .into_values()
        .map(|session| SessionInfo {
            id: session.id().to_string(),
            listener_id: registry.id().to_string(),
            description: session.describe(),
        })
        .collect();

    ListenerDetail {
        info: registry.info().await,
        description: registry.full_desc().await,
        sessions,
    }
}

/// Stop a listener and close its sessions
pub async fn stop_listener(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<ApiResponse<RemovalResult>>, StatusCode> {
    let sessions_closed = state.hub.stop_listener(&id).await.map_err(|_| StatusCode::NOT_FOUND)?;

    info!("Listener {} stopped via management API", id);
    Ok(Json(ApiResponse::success(RemovalResult { id, sessions_closed })))
}

/// List sessions across all listeners
pub async fn list_sessions(State(state): State<AppState>) -> Json<ApiResponse<Vec<SessionInfo>>> {
    let sessions = state
        .hub
        .all_sessions()
        .await
        .into_iter()
        .map(|(registry, session)| SessionInfo {
            id: session.id().to_string(),
            listener_id: registry.id().to_string(),
            description: session.describe(),
        })
        .collect();

    Json(ApiResponse::success(sessions))
}

/// Get one session
pub async fn get_session(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<ApiResponse<SessionInfo>>, StatusCode> {
    let (registry, session) = state.hub.find_session(&id).await.ok_or(StatusCode::NOT_FOUND)?;

    Ok(Json(ApiResponse::success(SessionInfo {
        id: session.id().to_string(),
        listener_id: registry.id().to_string(),
        description: session.describe(),
    })))
}

/// Close one session
pub async fn delete_session(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<ApiResponse<RemovalResult>>, StatusCode> {
    if !state.hub.remove_session(&id).await {
        return Err(StatusCode::NOT_FOUND);
    }

    info!("Session {} closed via management API", id);
    Ok(Json(ApiResponse::success(RemovalResult { id, sessions_closed: 1 })))
}

/// Prometheus text export
pub async fn export_metrics(State(state): State<AppState>) -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        state.hub.metrics().export_prometheus(),
    )
}
