//! Session Registry Implementation

use std::collections::BTreeMap;
use std::fmt;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, SystemTime};

use anyhow::{Context, bail};
use async_trait::async_trait;
use serde::Serialize;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{RwLock, broadcast};
use tokio::task::JoinSet;
use tokio::time::timeout;
use tracing::{info, warn, error, debug};

use super::fingerprint::{registry_fingerprint, time_ago};
use crate::metrics::Metrics;
use crate::session::{SessionFactory, SessionHandle};
use crate::Result;

const DEFAULT_FACTORY_TIMEOUT: Duration = Duration::from_secs(10);

/// Source of inbound connections for the accept loop
#[async_trait]
pub trait Acceptor: Send + Sync {
    async fn accept(&self) -> io::Result<(TcpStream, SocketAddr)>;
}

#[async_trait]
impl Acceptor for TcpListener {
    async fn accept(&self) -> io::Result<(TcpStream, SocketAddr)> {
        TcpListener::accept(self).await
    }
}

/// Lifecycle of a registry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RegistryState {
    Uninitialized,
    Listening,
    Stopped,
}

impl fmt::Display for RegistryState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RegistryState::Uninitialized => "uninitialized",
            RegistryState::Listening => "listening",
            RegistryState::Stopped => "stopped",
        };
        f.write_str(name)
    }
}

/// Serializable summary of a registry
#[derive(Debug, Clone, Serialize)]
pub struct RegistryInfo {
    pub id: String,
    pub host: String,
    pub port: u16,
    pub local_addr: Option<SocketAddr>,
    pub state: RegistryState,
    pub online_sessions: usize,
    pub created_at: SystemTime,
    pub summary: String,
}

/// State guarded by the registry lock
struct Inner {
    sessions: BTreeMap<String, SessionHandle>,
    state: RegistryState,
    local_addr: Option<SocketAddr>,
}

/// Accepts connections on one endpoint and tracks the resulting sessions
///
/// Every operation on the session map takes the same lock, so the accept
/// loop and external callers never observe a half-applied update. Session
/// handles are always closed after the lock is released.
pub struct SessionRegistry {
    host: String,
    port: u16,
    created_at: SystemTime,
    id: String,
    inner: RwLock<Inner>,
    factory_timeout: Duration,
    metrics: Option<Arc<Metrics>>,
    shutdown_flag: AtomicBool,
    shutdown_tx: broadcast::Sender<()>,
}

impl SessionRegistry {
    /// Create a registry for `host:port`. Performs no I/O.
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        let host = host.into();
        let created_at = SystemTime::now();
        let id = registry_fingerprint(&host, port, created_at);
        let (shutdown_tx, _) = broadcast::channel(1);

        Self {
            host,
            port,
            created_at,
            id,
            inner: RwLock::new(Inner {
                sessions: BTreeMap::new(),
                state: RegistryState::Uninitialized,
                local_addr: None,
            }),
            factory_timeout: DEFAULT_FACTORY_TIMEOUT,
            metrics: None,
            shutdown_flag: AtomicBool::new(false),
            shutdown_tx,
        }
    }

    /// Bound how long the session factory may take per connection
    pub fn with_factory_timeout(mut self, factory_timeout: Duration) -> Self {
        self.factory_timeout = factory_timeout;
        self
    }

    pub fn with_metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn created_at(&self) -> SystemTime {
        self.created_at
    }

    pub async fn state(&self) -> RegistryState {
        self.inner.read().await.state
    }

    /// Address actually bound, once listening
    pub async fn local_addr(&self) -> Option<SocketAddr> {
        self.inner.read().await.local_addr
    }

    /// Bind and run the accept loop until stopped.
    ///
    /// Returns early with an error if the address cannot be resolved or
    /// bound; the registry then stays uninitialized.
    pub async fn run(&self, factory: Arc<dyn SessionFactory>) -> Result<()> {
        let listener = self.bind().await?;
        self.serve(listener, factory).await;
        Ok(())
    }

    /// Resolve and bind the listening socket, entering `Listening`
    pub async fn bind(&self) -> Result<TcpListener> {
        match self.state().await {
            RegistryState::Uninitialized => {}
            RegistryState::Listening => bail!("Listener {} is already running", self.id),
            RegistryState::Stopped => bail!("Listener {} has been stopped", self.id),
        }

        let addr = match self.resolve().await {
            Ok(addr) => addr,
            Err(e) => {
                error!(listener = %self.id, "Resolve TCP address failed: {:#}", e);
                return Err(e);
            }
        };

        info!("Binding TCP listener to {}", addr);
        let listener = match TcpListener::bind(addr).await {
            Ok(listener) => listener,
            Err(e) => {
                error!(listener = %self.id, "Listen on {} failed: {}", addr, e);
                return Err(anyhow::Error::new(e).context(format!("Failed to bind {}", addr)));
            }
        };

        {
            let mut inner = self.inner.write().await;
            if inner.state != RegistryState::Uninitialized {
                bail!("Listener {} changed state while binding ({})", self.id, inner.state);
            }
            inner.state = RegistryState::Listening;
            inner.local_addr = listener.local_addr().ok();
        }

        if let Some(metrics) = &self.metrics {
            metrics.listener_started();
        }

        info!("Listener running at: {}", self.full_desc().await);
        Ok(listener)
    }

    async fn resolve(&self) -> Result<SocketAddr> {
        let mut addrs = tokio::net::lookup_host((self.host.as_str(), self.port))
            .await
            .with_context(|| format!("Failed to resolve {}:{}", self.host, self.port))?;

        addrs
            .find(SocketAddr::is_ipv4)
            .with_context(|| format!("No IPv4 address found for {}:{}", self.host, self.port))
    }

    /// Main connection acceptance loop
    pub async fn serve<A: Acceptor>(&self, listener: A, factory: Arc<dyn SessionFactory>) {
        info!(listener = %self.id, "Starting connection acceptance loop");
        let mut shutdown_rx = self.shutdown_tx.subscribe();

        loop {
            if self.shutdown_flag.load(Ordering::SeqCst) {
                info!(listener = %self.id, "Shutdown flag set, stopping connection acceptance");
                break;
            }

            tokio::select! {
                accept_result = listener.accept() => {
                    match accept_result {
                        Ok((stream, peer)) => {
                            debug!("Accepted connection from {}", peer);
                            self.admit(stream, peer, factory.as_ref()).await;
                        }
                        Err(e) if is_fatal_accept_error(&e) => {
                            error!(listener = %self.id, "Listener can no longer accept connections: {}", e);
                            break;
                        }
                        Err(e) => {
                            warn!(listener = %self.id, "Error accepting connection: {}", e);
                            if let Some(metrics) = &self.metrics {
                                metrics.accept_error();
                            }
                        }
                    }
                }
                _ = shutdown_rx.recv() => {
                    info!(listener = %self.id, "Received shutdown signal, stopping connection acceptance");
                    break;
                }
            }
        }

        drop(listener);

        if let Some(metrics) = &self.metrics {
            metrics.listener_stopped();
        }

        info!(listener = %self.id, "Connection acceptance loop stopped");
    }

    /// Turn an accepted connection into a tracked session
    async fn admit(&self, stream: TcpStream, peer: SocketAddr, factory: &dyn SessionFactory) {
        match timeout(self.factory_timeout, factory.create(stream, peer)).await {
            Ok(Ok(session)) => {
                info!(listener = %self.id, "New session {} connected", session.describe());
                self.add_session(session).await;
            }
            Ok(Err(e)) => {
                warn!(listener = %self.id, "Failed to create session for {}: {:#}", peer, e);
                if let Some(metrics) = &self.metrics {
                    metrics.factory_failure();
                }
            }
            Err(_) => {
                warn!(listener = %self.id, "Session creation for {} timed out after {:?}", peer, self.factory_timeout);
                if let Some(metrics) = &self.metrics {
                    metrics.factory_failure();
                }
            }
        }
    }

    /// Track a session under its own identifier.
    ///
    /// A different handle already stored under the same identifier is closed.
    /// Returns `false` (and closes the handle) if the registry was stopped.
    pub async fn add_session(&self, session: SessionHandle) -> bool {
        let mut inner = self.inner.write().await;
        if inner.state == RegistryState::Stopped {
            drop(inner);
            warn!(listener = %self.id, "Registry stopped, refusing session {}", session.id());
            session.close().await;
            return false;
        }

        let displaced = inner.sessions.insert(session.id().to_string(), Arc::clone(&session));
        drop(inner);

        match displaced {
            Some(previous) if Arc::ptr_eq(&previous, &session) => {}
            Some(previous) => {
                warn!(listener = %self.id, "Session {} replaced an existing entry, closing the previous handle", previous.id());
                if let Some(metrics) = &self.metrics {
                    metrics.session_added();
                }
                self.close_session(previous).await;
            }
            None => {
                if let Some(metrics) = &self.metrics {
                    metrics.session_added();
                }
            }
        }

        true
    }

    /// Close and forget `session`. Unknown sessions are ignored.
    pub async fn remove_session(&self, session: &SessionHandle) -> bool {
        self.remove_session_by_id(session.id()).await
    }

    /// Close and forget the session stored under `id`.
    pub async fn remove_session_by_id(&self, id: &str) -> bool {
        let removed = self.inner.write().await.sessions.remove(id);

        match removed {
            Some(session) => {
                self.close_session(session).await;
                true
            }
            None => {
                debug!(listener = %self.id, "Session {} not tracked, nothing to remove", id);
                false
            }
        }
    }

    async fn close_session(&self, session: SessionHandle) {
        session.close().await;
        if let Some(metrics) = &self.metrics {
            metrics.session_closed();
        }
        debug!(listener = %self.id, "Removed session {}", session.id());
    }

    /// Snapshot of every tracked session, keyed by identifier
    pub async fn list_sessions(&self) -> BTreeMap<String, SessionHandle> {
        self.inner.read().await.sessions.clone()
    }

    pub async fn get_session(&self, id: &str) -> Option<SessionHandle> {
        self.inner.read().await.sessions.get(id).cloned()
    }

    pub async fn session_count(&self) -> usize {
        self.inner.read().await.sessions.len()
    }

    /// `<host>:<port> (<N> online sessions)`
    pub async fn oneline_desc(&self) -> String {
        let count = self.inner.read().await.sessions.len();
        self.summary(count)
    }

    /// Header line with identifier and age, then one tab-indented line per session
    pub async fn full_desc(&self) -> String {
        let inner = self.inner.read().await;

        let mut desc = format!(
            "[{}] {} (started {})",
            self.id,
            self.summary(inner.sessions.len()),
            time_ago(self.created_at)
        );

        for session in inner.sessions.values() {
            desc.push_str("\n\t");
            desc.push_str(&session.describe());
        }

        desc
    }

    fn summary(&self, count: usize) -> String {
        format!("{}:{} ({} online sessions)", self.host, self.port, count)
    }

    pub async fn info(&self) -> RegistryInfo {
        let inner = self.inner.read().await;

        RegistryInfo {
            id: self.id.clone(),
            host: self.host.clone(),
            port: self.port,
            local_addr: inner.local_addr,
            state: inner.state,
            online_sessions: inner.sessions.len(),
            created_at: self.created_at,
            summary: self.summary(inner.sessions.len()),
        }
    }

    /// Stop accepting, close every session and empty the map.
    ///
    /// Returns the number of sessions closed. Calling it again is harmless.
    pub async fn stop(&self) -> usize {
        info!(listener = %self.id, "Stopping listener: {}", self.oneline_desc().await);

        self.shutdown_flag.store(true, Ordering::SeqCst);
        if self.shutdown_tx.send(()).is_err() {
            debug!(listener = %self.id, "Accept loop not running, no shutdown signal delivered");
        }

        let drained = {
            let mut inner = self.inner.write().await;
            inner.state = RegistryState::Stopped;
            std::mem::take(&mut inner.sessions)
        };

        let count = drained.len();
        let mut closing = JoinSet::new();
        for session in drained.into_values() {
            closing.spawn(async move {
                session.close().await;
            });
        }

        while let Some(result) = closing.join_next().await {
            if let Err(e) = result {
                error!(listener = %self.id, "Session close task failed: {}", e);
            }
            if let Some(metrics) = &self.metrics {
                metrics.session_closed();
            }
        }

        info!(listener = %self.id, "Listener stopped, closed {} sessions", count);
        count
    }
}

impl fmt::Debug for SessionRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionRegistry")
            .field("id", &self.id)
            .field("host", &self.host)
            .field("port", &self.port)
            .finish_non_exhaustive()
    }
}

/// Errors meaning the listening socket itself is unusable
fn is_fatal_accept_error(e: &io::Error) -> bool {
    matches!(e.kind(), io::ErrorKind::InvalidInput | io::ErrorKind::NotConnected)
        || is_bad_descriptor(e)
}

#[cfg(unix)]
fn is_bad_descriptor(e: &io::Error) -> bool {
    const EBADF: i32 = 9;
    e.raw_os_error() == Some(EBADF)
}

#[cfg(windows)]
fn is_bad_descriptor(e: &io::Error) -> bool {
    const WSAEBADF: i32 = 10009;
    const WSAENOTSOCK: i32 = 10038;
    matches!(e.raw_os_error(), Some(WSAEBADF | WSAENOTSOCK))
}

#[cfg(not(any(unix, windows)))]
fn is_bad_descriptor(_e: &io::Error) -> bool {
    false
}
