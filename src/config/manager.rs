//! Configuration Manager

use super::{Config, ListenerConfig};
use crate::management::types::PLACEHOLDER_API_KEY;
use crate::Result;
use anyhow::{Context, bail};
use std::collections::HashSet;
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

/// Longest accepted value for any configured timeout
const MAX_TIMEOUT: Duration = Duration::from_secs(300);

/// Manages configuration loading and validation
pub struct ConfigManager;

impl ConfigManager {
    /// Load configuration from file
    pub fn load_from_file(path: &Path) -> Result<Config> {
        if path.exists() {
            tracing::info!("Loading configuration from: {}", path.display());
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file: {}", path.display()))?;

            let config: Config = toml::from_str(&content)
                .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

            config.validate()
                .with_context(|| "Configuration validation failed")?;

            tracing::info!("Configuration loaded and validated successfully");
            Ok(config)
        } else {
            tracing::warn!("Configuration file not found at {}, using defaults", path.display());
            let config = Config::default();
            config.validate()?;
            Ok(config)
        }
    }

    /// Load configuration from environment variables
    pub fn load_from_env() -> Result<Config> {
        let mut config = Config::default();

        if let Ok(listen) = std::env::var("SESSIOND_LISTEN") {
            config.listeners = parse_listener_list(&listen)
                .with_context(|| format!("Invalid SESSIOND_LISTEN: {}", listen))?;
        }

        if let Ok(timeout) = std::env::var("SESSIOND_CLOSE_TIMEOUT") {
            config.session.close_timeout = humantime::parse_duration(&timeout)
                .with_context(|| format!("Invalid SESSIOND_CLOSE_TIMEOUT: {}", timeout))?;
        }

        if let Ok(timeout) = std::env::var("SESSIOND_FACTORY_TIMEOUT") {
            config.session.factory_timeout = humantime::parse_duration(&timeout)
                .with_context(|| format!("Invalid SESSIOND_FACTORY_TIMEOUT: {}", timeout))?;
        }

        if let Ok(log_level) = std::env::var("SESSIOND_LOG_LEVEL") {
            config.monitoring.log_level = log_level;
        }

        if let Ok(addr) = std::env::var("SESSIOND_MANAGEMENT_ADDR") {
            config.monitoring.management_api.bind_addr = addr.parse::<SocketAddr>()
                .with_context(|| format!("Invalid SESSIOND_MANAGEMENT_ADDR: {}", addr))?;
            config.monitoring.management_api.enabled = true;
        }

        if let Ok(api_key) = std::env::var("SESSIOND_API_KEY") {
            config.monitoring.management_api.auth.enabled = true;
            config.monitoring.management_api.auth.api_key = Some(api_key);
        }

        config.validate()?;
        Ok(config)
    }
}

/// Parse a comma separated list of `host:port` pairs
pub fn parse_listener_list(value: &str) -> Result<Vec<ListenerConfig>> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::parse::<ListenerConfig>)
        .collect()
}

impl Config {
    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        self.validate_listeners()
            .with_context(|| "Listener configuration validation failed")?;

        self.validate_timeouts()
            .with_context(|| "Timeout configuration validation failed")?;

        self.validate_monitoring_config()
            .with_context(|| "Monitoring configuration validation failed")?;

        Ok(())
    }

    fn validate_listeners(&self) -> Result<()> {
        if self.listeners.is_empty() && !self.monitoring.management_api.enabled {
            bail!("at least one listener is required when the management API is disabled");
        }

        let mut seen = HashSet::new();
        for (i, listener) in self.listeners.iter().enumerate() {
            if listener.host.trim().is_empty() {
                bail!("Listener {} has empty host", i);
            }

            // Port 0 asks the OS for a fresh port, so repeats are fine
            if listener.port != 0 && !seen.insert((listener.host.as_str(), listener.port)) {
                bail!("Listener {} duplicates {}", i, listener);
            }
        }

        Ok(())
    }

    fn validate_timeouts(&self) -> Result<()> {
        let timeouts = [
            ("server.shutdown_timeout", self.server.shutdown_timeout),
            ("session.close_timeout", self.session.close_timeout),
            ("session.factory_timeout", self.session.factory_timeout),
        ];

        for (name, value) in timeouts {
            if value.is_zero() {
                bail!("{} must be greater than 0", name);
            }

            if value > MAX_TIMEOUT {
                bail!("{} cannot exceed {}", name, humantime::format_duration(MAX_TIMEOUT));
            }
        }

        Ok(())
    }

    fn validate_monitoring_config(&self) -> Result<()> {
        let valid_log_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_log_levels.contains(&self.monitoring.log_level.as_str()) {
            bail!("monitoring.log_level must be one of: {}", valid_log_levels.join(", "));
        }

        let api = &self.monitoring.management_api;
        if api.enabled && api.auth.enabled && api.auth.api_key.is_none() && api.auth.basic_auth.is_none() {
            bail!("management API authentication is enabled but neither api_key nor basic_auth is set");
        }

        if let Some(key) = &api.auth.api_key {
            if key.is_empty() {
                bail!("management API key cannot be empty");
            }

            if api.enabled && api.auth.enabled && key == PLACEHOLDER_API_KEY {
                bail!("management API key is still the built-in placeholder, set monitoring.management_api.auth.api_key or SESSIOND_API_KEY");
            }
        }

        Ok(())
    }

    /// Tracing filter for the configured log level, `debug` when verbose
    pub fn log_filter(&self, verbose: bool) -> Result<EnvFilter> {
        let level = if verbose { "debug" } else { self.monitoring.log_level.as_str() };
        EnvFilter::try_new(level).with_context(|| format!("Invalid log level: {}", level))
    }

    /// Merge with CLI arguments
    pub fn merge_with_cli_args(
        &mut self,
        listen: &[ListenerConfig],
        log_level: Option<&str>,
        management_addr: Option<SocketAddr>,
        no_management: bool,
    ) {
        if !listen.is_empty() {
            self.listeners = listen.to_vec();
            tracing::info!("CLI override: listeners set to {}", format_listeners(&self.listeners));
        }

        if let Some(level) = log_level {
            self.monitoring.log_level = level.to_string();
            tracing::info!("CLI override: log level set to {}", level);
        }

        if let Some(addr) = management_addr {
            self.monitoring.management_api.bind_addr = addr;
            self.monitoring.management_api.enabled = true;
            tracing::info!("CLI override: management API bound to {}", addr);
        }

        if no_management {
            self.monitoring.management_api.enabled = false;
            tracing::info!("CLI override: management API disabled");
        }
    }
}

pub fn format_listeners(listeners: &[ListenerConfig]) -> String {
    listeners
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn test_parse_listener_list() {
        let listeners = parse_listener_list("127.0.0.1:4444, 0.0.0.0:5555,").unwrap();
        assert_eq!(listeners, vec![
            ListenerConfig::new("127.0.0.1", 4444),
            ListenerConfig::new("0.0.0.0", 5555),
        ]);

        assert!(parse_listener_list("127.0.0.1:4444,nope").is_err());
    }

    #[test]
    fn test_duplicate_listeners_rejected() {
        let mut config = Config::default();
        config.listeners = vec![
            ListenerConfig::new("127.0.0.1", 4444),
            ListenerConfig::new("127.0.0.1", 4444),
        ];
        assert!(config.validate().is_err());

        config.listeners = vec![
            ListenerConfig::new("127.0.0.1", 0),
            ListenerConfig::new("127.0.0.1", 0),
        ];
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_empty_listeners_need_management_api() {
        let mut config = Config::default();
        config.listeners.clear();
        assert!(config.validate().is_err());

        config.monitoring.management_api.enabled = true;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_timeout_bounds() {
        let mut config = Config::default();
        config.session.close_timeout = Duration::ZERO;
        assert!(config.validate().is_err());

        config.session.close_timeout = Duration::from_secs(3600);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_invalid_log_level() {
        let mut config = Config::default();
        config.monitoring.log_level = "verbose".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_api_auth_needs_credentials() {
        let mut config = Config::default();
        config.monitoring.management_api.enabled = true;
        config.monitoring.management_api.auth.enabled = true;
        config.monitoring.management_api.auth.api_key = None;
        config.monitoring.management_api.auth.basic_auth = None;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_merge_with_cli_args() {
        let mut config = Config::default();
        let listen = vec![ListenerConfig::new("127.0.0.1", 9001)];

        config.merge_with_cli_args(&listen, Some("debug"), Some("127.0.0.1:8000".parse().unwrap()), false);

        assert_eq!(config.listeners, listen);
        assert_eq!(config.monitoring.log_level, "debug");
        assert!(config.monitoring.management_api.enabled);
        assert_eq!(config.monitoring.management_api.bind_addr.port(), 8000);

        config.merge_with_cli_args(&[], None, None, true);
        assert!(!config.monitoring.management_api.enabled);
        assert_eq!(config.listeners, listen);
    }

    #[test]
    fn test_log_filter_follows_configured_level() {
        use tracing_subscriber::filter::LevelFilter;

        let mut config: Config = toml::from_str(r#"
            [monitoring]
            log_level = "debug"
        "#).unwrap();
        assert_eq!(config.log_filter(false).unwrap().max_level_hint(), Some(LevelFilter::DEBUG));

        config.merge_with_cli_args(&[], Some("warn"), None, false);
        assert_eq!(config.log_filter(false).unwrap().max_level_hint(), Some(LevelFilter::WARN));
        assert_eq!(config.log_filter(true).unwrap().max_level_hint(), Some(LevelFilter::DEBUG));
    }

    #[test]
    fn test_placeholder_api_key_rejected_when_api_enabled() {
        let mut config = Config::default();
        assert!(config.validate().is_ok());

        config.merge_with_cli_args(&[], None, Some("127.0.0.1:8000".parse().unwrap()), false);
        assert!(config.validate().is_err());

        config.monitoring.management_api.auth.api_key = Some("operator-key".to_string());
        assert!(config.validate().is_ok());
    }
}
