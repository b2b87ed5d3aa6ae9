//! Session Module
//!
//! Capability set the registry requires from a session, plus the default
//! TCP-backed implementation used by the binary.

pub mod handle;
pub mod tcp;

pub use handle::{Session, SessionFactory, SessionHandle};
pub use tcp::{TcpSession, TcpSessionFactory};
