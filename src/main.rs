//! sessiond - TCP session registry daemon
//!
//! Listens on one or more endpoints, tracks every accepted connection as a
//! session and tears them all down on SIGTERM/SIGINT.

use anyhow::{Context, Result};
use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use tracing::{error, info, warn};
use tracing_subscriber::{
    layer::SubscriberExt, reload, util::SubscriberInitExt, EnvFilter, Registry,
};

use sessiond::{
    config::{format_listeners, ConfigManager, ListenerConfig},
    management::ManagementServer,
    ListenerHub, Metrics, ShutdownCoordinator, TcpSessionFactory,
};

/// CLI arguments for sessiond
#[derive(Parser, Debug)]
#[command(name = "sessiond")]
#[command(about = "sessiond - TCP session registry daemon")]
#[command(version)]
#[command(long_about = "
sessiond - TCP session registry daemon

Accepts TCP connections on the configured endpoints and keeps a live registry
of them that can be listed, inspected and closed through the management API.

Configuration priority (highest to lowest):
1. Command-line arguments
2. Configuration file
3. Environment variables
4. Built-in defaults

Environment variables:
  SESSIOND_LISTEN           - Comma separated host:port list
  SESSIOND_CLOSE_TIMEOUT    - Per-session close timeout (e.g., 5s)
  SESSIOND_FACTORY_TIMEOUT  - Session construction timeout (e.g., 10s)
  SESSIOND_LOG_LEVEL        - Log level (trace, debug, info, warn, error)
  SESSIOND_MANAGEMENT_ADDR  - Management API bind address
  SESSIOND_API_KEY          - Management API key
")]
pub struct CliArgs {
    /// Configuration file path
    #[arg(
        short,
        long,
        default_value = "sessiond.toml",
        help = "Path to configuration file"
    )]
    pub config: PathBuf,

    /// Listening endpoints (overrides config file)
    #[arg(short, long, help = "Endpoint to listen on as host:port, may be repeated")]
    pub listen: Vec<ListenerConfig>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, help = "Log level")]
    pub log_level: Option<String>,

    /// Enable verbose logging (sets log level to debug)
    #[arg(short, long, help = "Enable verbose logging")]
    pub verbose: bool,

    /// Management API bind address (enables the API)
    #[arg(long, help = "Management API bind address (e.g., 127.0.0.1:7331)")]
    pub management_addr: Option<SocketAddr>,

    /// Disable the management API (overrides config file)
    #[arg(long, help = "Disable the management API")]
    pub no_management: bool,

    /// Validate configuration and exit
    #[arg(long, help = "Validate configuration and exit")]
    pub validate_config: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = CliArgs::parse();

    let log_filter = init_tracing(&args)?;

    info!("Starting sessiond v{}", env!("CARGO_PKG_VERSION"));

    // CLI args > config file > environment > defaults
    let mut config = if args.config.exists() {
        ConfigManager::load_from_file(&args.config)?
    } else {
        info!("Config file not found, checking environment variables");
        ConfigManager::load_from_env()?
    };

    config.merge_with_cli_args(
        &args.listen,
        args.log_level.as_deref(),
        args.management_addr,
        args.no_management,
    );

    config
        .validate()
        .context("Final configuration validation failed")?;

    if let Some(handle) = &log_filter {
        handle
            .reload(config.log_filter(args.verbose)?)
            .context("Failed to apply configured log level")?;
    }

    if args.validate_config {
        info!("Configuration is valid");
        info!("Configuration summary:");
        info!("  Listeners: {}", format_listeners(&config.listeners));
        info!("  Close timeout: {:?}", config.session.close_timeout);
        info!("  Factory timeout: {:?}", config.session.factory_timeout);
        info!("  Shutdown timeout: {:?}", config.server.shutdown_timeout);
        info!(
            "  Management API: {}",
            if config.monitoring.management_api.enabled {
                config.monitoring.management_api.bind_addr.to_string()
            } else {
                "disabled".to_string()
            }
        );
        return Ok(());
    }

    let shutdown_coordinator = ShutdownCoordinator::new(config.server.shutdown_timeout);

    let metrics = Arc::new(Metrics::new()?);
    let factory = Arc::new(TcpSessionFactory::new(&config.session));
    let hub = Arc::new(ListenerHub::new(factory, metrics, &config.session));

    for listener in &config.listeners {
        if let Err(e) = hub.start_listener(&listener.host, listener.port).await {
            error!("{:#}", e);
        }
    }

    if hub.listeners().await.is_empty() {
        warn!("No listener could be started");
    }

    let management_handle = if config.monitoring.management_api.enabled {
        info!(
            "Starting management API server on {}",
            config.monitoring.management_api.bind_addr
        );

        let management_server = ManagementServer::new(
            config.monitoring.management_api.bind_addr,
            Arc::clone(&hub),
            config.monitoring.management_api.auth.clone(),
        );
        let shutdown_rx = shutdown_coordinator.subscribe();

        Some(tokio::spawn(async move {
            if let Err(e) = management_server.start(shutdown_rx).await {
                error!("Management API server error: {:#}", e);
            }
        }))
    } else {
        info!("Management API server disabled");
        None
    };

    info!("sessiond started, press Ctrl+C or send SIGTERM/SIGINT to shut down");

    if let Err(e) = shutdown_coordinator.listen_for_signals().await {
        error!("Error setting up signal handlers: {}", e);
        shutdown_coordinator.trigger();
    }

    let closed = shutdown_coordinator.shutdown_hub(&hub).await;
    info!("Closed {} sessions", closed);

    if let Some(handle) = management_handle {
        if let Err(e) = handle.await {
            if !e.is_cancelled() {
                error!("Management API task failed: {}", e);
            }
        }
        info!("Management API server shutdown");
    }

    info!("Server shutdown complete");

    Ok(())
}

/// Initialize tracing/logging.
///
/// Until the configuration is loaded the filter comes from the CLI or
/// `SESSIOND_LOG_LEVEL`. The returned handle swaps in the configured level;
/// it is `None` when `RUST_LOG` takes precedence.
fn init_tracing(args: &CliArgs) -> Result<Option<reload::Handle<EnvFilter, Registry>>> {
    let (env_filter, from_env) = match EnvFilter::try_from_default_env() {
        Ok(filter) => (filter, true),
        Err(_) => {
            let log_level = if args.verbose {
                "debug".to_string()
            } else {
                args.log_level
                    .clone()
                    .or_else(|| std::env::var("SESSIOND_LOG_LEVEL").ok())
                    .unwrap_or_else(|| "info".to_string())
            };
            (EnvFilter::new(log_level), false)
        }
    };

    let (filter_layer, handle) = reload::Layer::new(env_filter);

    tracing_subscriber::registry()
        .with(filter_layer)
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_thread_ids(true)
                .with_level(true)
                .with_ansi(true),
        )
        .init();

    Ok(if from_env { None } else { Some(handle) })
}
