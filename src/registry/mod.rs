//! Session Registry Module
//!
//! Listening endpoints and the live set of sessions they have accepted.

pub mod fingerprint;
pub mod server;

pub use fingerprint::{fingerprint, registry_fingerprint, session_fingerprint, time_ago};
pub use server::{Acceptor, RegistryInfo, RegistryState, SessionRegistry};
