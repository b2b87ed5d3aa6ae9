//! Metrics Collector

use prometheus::{IntCounter, IntGauge, Registry, TextEncoder};
use serde::Serialize;
use tracing::{debug, error};
use crate::Result;

/// Point-in-time copy of the counters, for JSON status output
#[derive(Debug, Clone, Serialize)]
pub struct MetricsSnapshot {
    pub sessions_accepted: u64,
    pub sessions_closed: u64,
    pub sessions_online: i64,
    pub accept_errors: u64,
    pub factory_failures: u64,
    pub listeners_active: i64,
}

/// Collects and exports listener/session metrics
pub struct Metrics {
    prometheus_registry: Registry,

    sessions_accepted_total: IntCounter,
    sessions_closed_total: IntCounter,
    sessions_online: IntGauge,
    accept_errors_total: IntCounter,
    factory_failures_total: IntCounter,
    listeners_active: IntGauge,
}

impl Metrics {
    /// Create a new metrics collector with its own Prometheus registry
    pub fn new() -> Result<Self> {
        let prometheus_registry = Registry::new();

        let sessions_accepted_total = IntCounter::new(
            "sessiond_sessions_accepted_total",
            "Total number of sessions added to a registry"
        )?;

        let sessions_closed_total = IntCounter::new(
            "sessiond_sessions_closed_total",
            "Total number of sessions closed by a registry"
        )?;

        let sessions_online = IntGauge::new(
            "sessiond_sessions_online",
            "Number of sessions currently tracked across all listeners"
        )?;

        let accept_errors_total = IntCounter::new(
            "sessiond_accept_errors_total",
            "Total number of failed accept calls"
        )?;

        let factory_failures_total = IntCounter::new(
            "sessiond_factory_failures_total",
            "Total number of connections dropped because a session could not be built"
        )?;

        let listeners_active = IntGauge::new(
            "sessiond_listeners_active",
            "Number of listeners currently accepting connections"
        )?;

        prometheus_registry.register(Box::new(sessions_accepted_total.clone()))?;
        prometheus_registry.register(Box::new(sessions_closed_total.clone()))?;
        prometheus_registry.register(Box::new(sessions_online.clone()))?;
        prometheus_registry.register(Box::new(accept_errors_total.clone()))?;
        prometheus_registry.register(Box::new(factory_failures_total.clone()))?;
        prometheus_registry.register(Box::new(listeners_active.clone()))?;

        Ok(Self {
            prometheus_registry,
            sessions_accepted_total,
            sessions_closed_total,
            sessions_online,
            accept_errors_total,
            factory_failures_total,
            listeners_active,
        })
    }

    pub fn session_added(&self) {
        self.sessions_accepted_total.inc();
        self.sessions_online.inc();
    }

    pub fn session_closed(&self) {
        self.sessions_closed_total.inc();
        self.sessions_online.dec();
    }

    pub fn accept_error(&self) {
        self.accept_errors_total.inc();
    }

    pub fn factory_failure(&self) {
        self.factory_failures_total.inc();
    }

    pub fn listener_started(&self) {
        self.listeners_active.inc();
        debug!(active = self.listeners_active.get(), "Listener started");
    }

    pub fn listener_stopped(&self) {
        self.listeners_active.dec();
        debug!(active = self.listeners_active.get(), "Listener stopped");
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            sessions_accepted: self.sessions_accepted_total.get(),
            sessions_closed: self.sessions_closed_total.get(),
            sessions_online: self.sessions_online.get(),
            accept_errors: self.accept_errors_total.get(),
            factory_failures: self.factory_failures_total.get(),
            listeners_active: self.listeners_active.get(),
        }
    }

    /// Export all metrics in Prometheus text format
    pub fn export_prometheus(&self) -> String {
        let encoder = TextEncoder::new();
        let metric_families = self.prometheus_registry.gather();

        match encoder.encode_to_string(&metric_families) {
            Ok(output) => output,
            Err(e) => {
                error!(error = %e, "Failed to encode Prometheus metrics");
                String::new()
            }
        }
    }
}
