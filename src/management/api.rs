//! Management API Routes

use super::{
    auth::{auth_middleware, ApiAuth},
    handlers::*,
    types::ApiAuthConfig,
};
use axum::{
    middleware,
    routing::get,
    Router,
};
use std::sync::Arc;
use tower_http::cors::CorsLayer;

/// Management API router
pub struct ManagementApi;

impl ManagementApi {
    /// Create the management API router
    pub fn create_router(state: AppState, auth_config: ApiAuthConfig) -> Router {
        let auth = Arc::new(ApiAuth::new(auth_config));

        let public_routes = Router::new()
            .route("/health", get(health_check))
            .with_state(state.clone());

        let protected_routes = Router::new()
            .route("/status", get(get_server_status))
            .route("/metrics", get(export_metrics))

            // Listener management
            .route("/listeners", get(list_listeners).post(start_listener))
            .route("/listeners/:id", get(get_listener).delete(stop_listener))

            // Session management
            .route("/sessions", get(list_sessions))
            .route("/sessions/:id", get(get_session).delete(delete_session))

            .layer(middleware::from_fn_with_state(auth, auth_middleware))
            .with_state(state);

        Router::new()
            .nest("/api/v1", public_routes.merge(protected_routes))
            .layer(CorsLayer::permissive())
    }
}
