//! Management API Authentication

use super::types::ApiAuthConfig;
use axum::{
    extract::{Request, State},
    http::{HeaderMap, StatusCode, header},
    middleware::Next,
    response::Response,
};
use base64::{engine::general_purpose, Engine as _};
use std::sync::Arc;
use tracing::{debug, warn};

const API_KEY_HEADER: &str = "x-api-key";

/// Checks management requests against the configured credentials
pub struct ApiAuth {
    config: ApiAuthConfig,
}

impl ApiAuth {
    pub fn new(config: ApiAuthConfig) -> Self {
        Self { config }
    }

    fn validate_api_key(&self, headers: &HeaderMap) -> bool {
        let Some(expected) = &self.config.api_key else {
            return false;
        };

        headers
            .get(API_KEY_HEADER)
            .and_then(|value| value.to_str().ok())
            .is_some_and(|provided| provided == expected)
    }

    fn validate_basic_auth(&self, headers: &HeaderMap) -> bool {
        let Some(basic) = &self.config.basic_auth else {
            return false;
        };

        match decode_basic_credentials(headers) {
            Some((username, password)) => username == basic.username && password == basic.password,
            None => false,
        }
    }

    /// Authenticate request
    pub fn authenticate(&self, headers: &HeaderMap) -> bool {
        if !self.config.enabled {
            debug!("API authentication disabled, allowing request");
            return true;
        }

        if self.validate_api_key(headers) {
            debug!("API key authentication successful");
            return true;
        }

        if self.validate_basic_auth(headers) {
            debug!("Basic authentication successful");
            return true;
        }

        warn!("API authentication failed");
        false
    }
}

/// Extract `user:password` from an `Authorization: Basic ...` header
fn decode_basic_credentials(headers: &HeaderMap) -> Option<(String, String)> {
    let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let encoded = value.strip_prefix("Basic ")?;
    let decoded = general_purpose::STANDARD.decode(encoded).ok()?;
    let credentials = String::from_utf8(decoded).ok()?;
    let (username, password) = credentials.split_once(':')?;
    Some((username.to_string(), password.to_string()))
}

/// Authentication middleware function
pub async fn auth_middleware(
    State(auth): State<Arc<ApiAuth>>,
    request: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    if auth.authenticate(request.headers()) {
        Ok(next.run(request).await)
    } else {
        Err(StatusCode::UNAUTHORIZED)
    }
}
