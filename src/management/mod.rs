//! Management API Module
//!
//! REST API for inspecting listeners and closing sessions remotely.

pub mod api;
pub mod auth;
pub mod handlers;
pub mod server;
pub mod types;

pub use api::ManagementApi;
pub use auth::ApiAuth;
pub use server::ManagementServer;
pub use types::*;
