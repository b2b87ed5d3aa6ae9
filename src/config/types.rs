//! Configuration Types

use anyhow::{bail, Context};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;
use crate::management::types::ApiAuthConfig;

/// Main configuration structure
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub listeners: Vec<ListenerConfig>,
    pub session: SessionConfig,
    pub monitoring: MonitoringConfig,
}

/// Process-level settings
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ServerConfig {
    #[serde(with = "humantime_serde")]
    pub shutdown_timeout: Duration,
}

/// One listening endpoint
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct ListenerConfig {
    pub host: String,
    pub port: u16,
}

/// Session construction and teardown settings
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Upper bound on a single session close
    #[serde(with = "humantime_serde")]
    pub close_timeout: Duration,
    /// Upper bound on building a session from an accepted socket
    #[serde(with = "humantime_serde")]
    pub factory_timeout: Duration,
    pub nodelay: bool,
}

/// Monitoring configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct MonitoringConfig {
    pub log_level: String,
    pub management_api: ManagementApiConfig,
}

/// Management API configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ManagementApiConfig {
    pub enabled: bool,
    pub bind_addr: SocketAddr,
    pub auth: ApiAuthConfig,
}

impl ListenerConfig {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }
}

impl fmt::Display for ListenerConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

impl FromStr for ListenerConfig {
    type Err = anyhow::Error;

    /// Parse `host:port`
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (host, port) = s.trim().rsplit_once(':')
            .with_context(|| format!("Listener address '{}' must be host:port", s))?;

        if host.is_empty() {
            bail!("Listener address '{}' has an empty host", s);
        }

        let port = port.parse::<u16>()
            .with_context(|| format!("Listener address '{}' has an invalid port", s))?;

        Ok(Self::new(host, port))
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            listeners: vec![ListenerConfig::new("0.0.0.0", 13337)],
            session: SessionConfig::default(),
            monitoring: MonitoringConfig::default(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            shutdown_timeout: Duration::from_secs(10),
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            close_timeout: Duration::from_secs(5),
            factory_timeout: Duration::from_secs(10),
            nodelay: true,
        }
    }
}

impl Default for MonitoringConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            management_api: ManagementApiConfig::default(),
        }
    }
}

impl Default for ManagementApiConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 7331)),
            auth: ApiAuthConfig::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_listener_from_str() {
        let listener: ListenerConfig = "127.0.0.1:9001".parse().unwrap();
        assert_eq!(listener, ListenerConfig::new("127.0.0.1", 9001));
        assert_eq!(listener.to_string(), "127.0.0.1:9001");

        let named: ListenerConfig = "localhost:0".parse().unwrap();
        assert_eq!(named.host, "localhost");
        assert_eq!(named.port, 0);
    }

    #[test]
    fn test_listener_from_str_rejects_garbage() {
        assert!("127.0.0.1".parse::<ListenerConfig>().is_err());
        assert!(":9001".parse::<ListenerConfig>().is_err());
        assert!("127.0.0.1:70000".parse::<ListenerConfig>().is_err());
        assert!("127.0.0.1:http".parse::<ListenerConfig>().is_err());
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config: Config = toml::from_str(r#"
            [[listeners]]
            host = "127.0.0.1"
            port = 4444

            [session]
            close_timeout = "2s"
        "#).unwrap();

        assert_eq!(config.listeners, vec![ListenerConfig::new("127.0.0.1", 4444)]);
        assert_eq!(config.session.close_timeout, Duration::from_secs(2));
        assert_eq!(config.session.factory_timeout, Duration::from_secs(10));
        assert_eq!(config.monitoring.log_level, "info");
        assert!(!config.monitoring.management_api.enabled);
    }
}
