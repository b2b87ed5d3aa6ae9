//! sessiond Library
//!
//! Keeps a live registry of TCP sessions per listening endpoint, with
//! enumeration, lookup, removal and orderly teardown.

pub mod config;
pub mod hub;
pub mod management;
pub mod metrics;
pub mod registry;
pub mod session;
pub mod shutdown;

pub use config::Config;
pub use hub::ListenerHub;
pub use metrics::Metrics;
pub use registry::SessionRegistry;
pub use session::{Session, SessionFactory, SessionHandle, TcpSessionFactory};
pub use shutdown::ShutdownCoordinator;

/// Common error type for the session daemon
pub type Result<T> = anyhow::Result<T>;
