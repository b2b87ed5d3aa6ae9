//! TCP Session

use anyhow::Context;
use async_trait::async_trait;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use super::{Session, SessionFactory, SessionHandle};
use crate::config::SessionConfig;
use crate::registry::fingerprint::{session_fingerprint, time_ago};
use crate::Result;

/// An accepted TCP connection wrapped with identity and lifecycle
#[derive(Debug)]
pub struct TcpSession {
    id: String,
    peer_addr: SocketAddr,
    local_addr: SocketAddr,
    connected_at: SystemTime,
    stream: Mutex<Option<TcpStream>>,
    closed: AtomicBool,
    close_timeout: Duration,
}

impl TcpSession {
    /// Wrap an accepted stream
    pub fn new(stream: TcpStream, peer_addr: SocketAddr, close_timeout: Duration) -> Result<Self> {
        let local_addr = stream.local_addr()
            .with_context(|| format!("Failed to read local address for connection from {}", peer_addr))?;
        let connected_at = SystemTime::now();
        let id = session_fingerprint(peer_addr, local_addr, connected_at);

        debug!("Creating new session: {} ({} -> {})", id, peer_addr, local_addr);

        Ok(Self {
            id,
            peer_addr,
            local_addr,
            connected_at,
            stream: Mutex::new(Some(stream)),
            closed: AtomicBool::new(false),
            close_timeout,
        })
    }

    pub fn peer_addr(&self) -> SocketAddr {
        self.peer_addr
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn connected_at(&self) -> SystemTime {
        self.connected_at
    }

    fn short_id(&self) -> &str {
        self.id.get(..8).unwrap_or(&self.id)
    }
}

#[async_trait]
impl Session for TcpSession {
    fn id(&self) -> &str {
        &self.id
    }

    fn describe(&self) -> String {
        format!(
            "[{}] {} -> {} (connected {})",
            self.short_id(),
            self.peer_addr,
            self.local_addr,
            time_ago(self.connected_at)
        )
    }

    async fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }

        let stream = self.stream.lock().await.take();
        if let Some(mut stream) = stream {
            match timeout(self.close_timeout, stream.shutdown()).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    // Peer already gone; dropping the socket is enough
                    debug!(session = %self.id, "Shutdown of {} failed: {}", self.peer_addr, e);
                }
                Err(_) => {
                    warn!(session = %self.id, "Shutdown of {} timed out after {:?}", self.peer_addr, self.close_timeout);
                }
            }
        }

        info!(session = %self.id, peer = %self.peer_addr, "Session closed");
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

/// Default factory turning accepted sockets into [`TcpSession`]s
#[derive(Debug, Clone)]
pub struct TcpSessionFactory {
    close_timeout: Duration,
    nodelay: bool,
}

impl TcpSessionFactory {
    pub fn new(config: &SessionConfig) -> Self {
        Self {
            close_timeout: config.close_timeout,
            nodelay: config.nodelay,
        }
    }
}

#[async_trait]
impl SessionFactory for TcpSessionFactory {
    async fn create(&self, stream: TcpStream, peer: SocketAddr) -> Result<SessionHandle> {
        if self.nodelay {
            stream.set_nodelay(true)
                .with_context(|| format!("Failed to set TCP_NODELAY for {}", peer))?;
        }

        let session = TcpSession::new(stream, peer, self.close_timeout)?;
        Ok(Arc::new(session))
    }
}
