//! Graceful Shutdown Handling
//!
//! Waits for SIGTERM/SIGINT, broadcasts the shutdown to interested tasks and
//! tears down every listener within the configured timeout.

use std::time::{Duration, Instant};
use tokio::sync::broadcast;
use tokio::signal;
use tracing::{info, warn};
use crate::hub::ListenerHub;
use crate::Result;

/// Shutdown coordinator that manages graceful shutdown process
pub struct ShutdownCoordinator {
    shutdown_tx: broadcast::Sender<()>,
    timeout: Duration,
}

impl ShutdownCoordinator {
    pub fn new(timeout: Duration) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);

        Self {
            shutdown_tx,
            timeout,
        }
    }

    /// Get a shutdown receiver for components to listen for shutdown signals
    pub fn subscribe(&self) -> broadcast::Receiver<()> {
        self.shutdown_tx.subscribe()
    }

    /// Broadcast shutdown to every subscriber
    pub fn trigger(&self) {
        if self.shutdown_tx.send(()).is_err() {
            warn!("No components subscribed to the shutdown signal");
        }
    }

    /// Block until SIGTERM, SIGINT or Ctrl+C, then broadcast shutdown
    pub async fn listen_for_signals(&self) -> Result<()> {
        info!("Starting shutdown signal listener");

        #[cfg(unix)]
        {
            let mut sigterm = signal::unix::signal(signal::unix::SignalKind::terminate())?;
            let mut sigint = signal::unix::signal(signal::unix::SignalKind::interrupt())?;

            tokio::select! {
                _ = sigterm.recv() => {
                    info!("Received SIGTERM, initiating graceful shutdown");
                }
                _ = sigint.recv() => {
                    info!("Received SIGINT, initiating graceful shutdown");
                }
            }
        }

        #[cfg(windows)]
        {
            signal::ctrl_c().await?;
            info!("Received Ctrl+C, initiating graceful shutdown");
        }

        self.trigger();
        Ok(())
    }

    /// Stop every listener and close their sessions
    pub async fn shutdown_hub(&self, hub: &ListenerHub) -> usize {
        info!("Initiating graceful shutdown of {} listeners (timeout: {:?})",
              hub.listeners().await.len(), self.timeout);
        let start_time = Instant::now();

        let closed = hub.shutdown(self.timeout).await;
        if start_time.elapsed() > self.timeout {
            warn!("Shutdown took {:?}, longer than the {:?} timeout", start_time.elapsed(), self.timeout);
        }

        info!("Shutdown finished in {:?}, {} sessions closed", start_time.elapsed(), closed);
        closed
    }
}
