//! Management API Server

use super::{
    api::ManagementApi,
    handlers::AppState,
    types::ApiAuthConfig,
};
use crate::{hub::ListenerHub, Result};
use anyhow::Context;
use axum::Router;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::{net::TcpListener, sync::broadcast};
use tracing::info;

/// Management API server
pub struct ManagementServer {
    bind_addr: SocketAddr,
    app_state: AppState,
    auth_config: ApiAuthConfig,
}

impl ManagementServer {
    pub fn new(bind_addr: SocketAddr, hub: Arc<ListenerHub>, auth_config: ApiAuthConfig) -> Self {
        Self {
            bind_addr,
            app_state: AppState::new(hub),
            auth_config,
        }
    }

    /// Serve until a shutdown signal arrives
    pub async fn start(self, mut shutdown_rx: broadcast::Receiver<()>) -> Result<()> {
        let app = self.router();

        let listener = TcpListener::bind(self.bind_addr)
            .await
            .with_context(|| format!("Failed to bind management API server to {}", self.bind_addr))?;

        info!("Management API server listening on {}", self.bind_addr);

        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = shutdown_rx.recv().await;
                info!("Management API server shutting down");
            })
            .await
            .context("Management API server error")?;

        Ok(())
    }

    pub fn router(&self) -> Router {
        ManagementApi::create_router(self.app_state.clone(), self.auth_config.clone())
    }
}
