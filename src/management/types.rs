//! Management API Types

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::SystemTime;
use crate::metrics::MetricsSnapshot;
use crate::registry::RegistryInfo;

/// API response wrapper
#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    pub error: Option<String>,
    pub timestamp: SystemTime,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
            timestamp: SystemTime::now(),
        }
    }

    pub fn error(message: String) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message),
            timestamp: SystemTime::now(),
        }
    }
}

/// Process status
#[derive(Debug, Serialize)]
pub struct ServerStatus {
    pub uptime_seconds: u64,
    pub listeners: usize,
    pub online_sessions: usize,
    pub metrics: MetricsSnapshot,
    pub version: String,
}

/// One listener with its sessions
#[derive(Debug, Serialize)]
pub struct ListenerDetail {
    #[serde(flatten)]
    pub info: RegistryInfo,
    pub description: String,
    pub sessions: Vec<SessionInfo>,
}

/// One tracked session
#[derive(Debug, Serialize)]
pub struct SessionInfo {
    pub id: String,
    pub listener_id: String,
    pub description: String,
}

/// Request body for starting a listener
#[derive(Debug, Deserialize)]
pub struct StartListenerRequest {
    pub host: String,
    pub port: u16,
}

/// Result of a teardown call
#[derive(Debug, Serialize)]
pub struct RemovalResult {
    pub id: String,
    pub sessions_closed: usize,
}

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthStatus {
    pub status: String,
    pub checks: HashMap<String, CheckResult>,
    pub timestamp: SystemTime,
}

/// Individual health check result
#[derive(Debug, Serialize)]
pub struct CheckResult {
    pub status: String,
    pub message: Option<String>,
}

/// Shipped API key; refused whenever the management API is enabled
pub const PLACEHOLDER_API_KEY: &str = "default-api-key-change-me";

/// API authentication configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ApiAuthConfig {
    pub enabled: bool,
    pub api_key: Option<String>,
    pub basic_auth: Option<BasicAuthConfig>,
}

/// Basic authentication configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BasicAuthConfig {
    pub username: String,
    pub password: String,
}

impl Default for ApiAuthConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            api_key: Some(PLACEHOLDER_API_KEY.to_string()),
            basic_auth: None,
        }
    }
}

