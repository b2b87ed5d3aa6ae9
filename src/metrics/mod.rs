//! Metrics Module
//!
//! Prometheus counters and gauges describing listener and session activity.

pub mod collector;

pub use collector::{Metrics, MetricsSnapshot};
