//! Listener Hub
//!
//! Owns every listening endpoint in the process together with the task
//! running its accept loop. Callers reach registries through an explicitly
//! passed hub rather than through global state.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tokio::sync::RwLock;
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::{timeout_at, Instant};
use tracing::{info, warn, error};

use crate::config::SessionConfig;
use crate::metrics::Metrics;
use crate::registry::SessionRegistry;
use crate::session::{SessionFactory, SessionHandle};
use crate::Result;

/// Grace period for an accept task after its listener was stopped
const ACCEPT_TASK_GRACE: Duration = Duration::from_secs(5);

struct ListenerEntry {
    registry: Arc<SessionRegistry>,
    task: JoinHandle<()>,
}

/// Registry of registries
pub struct ListenerHub {
    factory: Arc<dyn SessionFactory>,
    metrics: Arc<Metrics>,
    factory_timeout: Duration,
    listeners: RwLock<BTreeMap<String, ListenerEntry>>,
}

impl ListenerHub {
    pub fn new(factory: Arc<dyn SessionFactory>, metrics: Arc<Metrics>, session_config: &SessionConfig) -> Self {
        Self {
            factory,
            metrics,
            factory_timeout: session_config.factory_timeout,
            listeners: RwLock::new(BTreeMap::new()),
        }
    }

    pub fn metrics(&self) -> &Arc<Metrics> {
        &self.metrics
    }

    /// Bind `host:port` and start accepting on a background task.
    ///
    /// Resolution and bind errors are returned to the caller; nothing is
    /// registered in that case.
    pub async fn start_listener(&self, host: &str, port: u16) -> Result<Arc<SessionRegistry>> {
        let registry = Arc::new(
            SessionRegistry::new(host, port)
                .with_factory_timeout(self.factory_timeout)
                .with_metrics(Arc::clone(&self.metrics)),
        );

        let listener = registry.bind()
            .await
            .with_context(|| format!("Failed to start listener on {}:{}", host, port))?;

        let task = {
            let registry = Arc::clone(&registry);
            let factory = Arc::clone(&self.factory);
            tokio::spawn(async move {
                registry.serve(listener, factory).await;
            })
        };

        self.listeners.write().await.insert(
            registry.id().to_string(),
            ListenerEntry {
                registry: Arc::clone(&registry),
                task,
            },
        );

        info!(listener = %registry.id(), "Listener {}:{} registered", host, port);
        Ok(registry)
    }

    /// Stop one listener, close its sessions and forget it.
    ///
    /// Returns the number of sessions closed.
    pub async fn stop_listener(&self, id: &str) -> Result<usize> {
        let entry = self.listeners.write().await.remove(id)
            .with_context(|| format!("No listener with id {}", id))?;

        Ok(Self::stop_entry(entry, Instant::now() + ACCEPT_TASK_GRACE).await)
    }

    /// Stop the registry, then give its accept task until `deadline` to exit
    async fn stop_entry(entry: ListenerEntry, deadline: Instant) -> usize {
        let closed = entry.registry.stop().await;

        let mut task = entry.task;
        match timeout_at(deadline, &mut task).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) if e.is_cancelled() => {}
            Ok(Err(e)) => {
                error!(listener = %entry.registry.id(), "Accept task failed: {}", e);
            }
            Err(_) => {
                warn!(listener = %entry.registry.id(), "Accept task did not exit before the deadline, aborting");
                task.abort();
            }
        }

        closed
    }

    /// All registries, ordered by identifier
    pub async fn listeners(&self) -> Vec<Arc<SessionRegistry>> {
        self.listeners
            .read()
            .await
            .values()
            .map(|entry| Arc::clone(&entry.registry))
            .collect()
    }

    pub async fn find_listener(&self, id: &str) -> Option<Arc<SessionRegistry>> {
        self.listeners
            .read()
            .await
            .get(id)
            .map(|entry| Arc::clone(&entry.registry))
    }

    /// Locate a session in any listener
    pub async fn find_session(&self, id: &str) -> Option<(Arc<SessionRegistry>, SessionHandle)> {
        for registry in self.listeners().await {
            if let Some(session) = registry.get_session(id).await {
                return Some((registry, session));
            }
        }
        None
    }

    /// Every session in every listener, paired with its owner
    pub async fn all_sessions(&self) -> Vec<(Arc<SessionRegistry>, SessionHandle)> {
        let mut sessions = Vec::new();
        for registry in self.listeners().await {
            for session in registry.list_sessions().await.into_values() {
                sessions.push((Arc::clone(&registry), session));
            }
        }
        sessions
    }

    /// Close a session wherever it lives. Unknown ids are ignored.
    pub async fn remove_session(&self, id: &str) -> bool {
        for registry in self.listeners().await {
            if registry.remove_session_by_id(id).await {
                return true;
            }
        }
        false
    }

    pub async fn online_sessions(&self) -> usize {
        let mut total = 0;
        for registry in self.listeners().await {
            total += registry.session_count().await;
        }
        total
    }

    /// Full description of every listener
    pub async fn describe(&self) -> String {
        let mut descs = Vec::new();
        for registry in self.listeners().await {
            descs.push(registry.full_desc().await);
        }
        descs.join("\n")
    }

    /// Stop every listener concurrently. Accept tasks still running once
    /// `grace` has elapsed are aborted.
    ///
    /// Returns the total number of sessions closed.
    pub async fn shutdown(&self, grace: Duration) -> usize {
        let entries: Vec<ListenerEntry> = {
            let mut listeners = self.listeners.write().await;
            std::mem::take(&mut *listeners).into_values().collect()
        };

        info!("Stopping {} listeners", entries.len());

        let deadline = Instant::now() + grace;
        let mut stopping = JoinSet::new();
        for entry in entries {
            stopping.spawn(Self::stop_entry(entry, deadline));
        }

        let mut closed = 0;
        while let Some(result) = stopping.join_next().await {
            match result {
                Ok(count) => closed += count,
                Err(e) => error!("Listener stop task failed: {}", e),
            }
        }

        info!("All listeners stopped, {} sessions closed", closed);
        closed
    }
}
