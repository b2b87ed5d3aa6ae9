//! Session Handle Traits

use async_trait::async_trait;
use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpStream;
use crate::Result;

/// A live remote connection tracked by a registry.
///
/// Implementations own the underlying connection. The registry only needs
/// identity, a description and a way to tear the connection down.
#[async_trait]
pub trait Session: Send + Sync + fmt::Debug {
    /// Stable identifier, unique per session
    fn id(&self) -> &str;

    /// Single-line human-readable description (no embedded newlines)
    fn describe(&self) -> String;

    /// Terminate the connection. Must be idempotent and must not block
    /// indefinitely.
    async fn close(&self);

    /// Whether `close` has already run
    fn is_closed(&self) -> bool;
}

/// Shared handle stored in a registry slot
pub type SessionHandle = Arc<dyn Session>;

/// Builds sessions from freshly accepted connections.
///
/// On error the factory drops the stream, which closes the connection.
#[async_trait]
pub trait SessionFactory: Send + Sync {
    async fn create(&self, stream: TcpStream, peer: SocketAddr) -> Result<SessionHandle>;
}
