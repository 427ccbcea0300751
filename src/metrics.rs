//! Prometheus metrics collection for relayd.
//!
//! Metrics are registered once in a process-wide registry and exposed by
//! [`crate::http`] when a metrics port is configured. Recording before
//! [`init`] is a no-op.
//!
//! - `relay_broadcasts_total` - broadcasts handled
//! - `relay_deliveries_total{result}` - per-recipient send outcomes
//! - `relay_ingress_connections_total{result}` - ingress connection outcomes
//! - `relay_command_total{command}` / `relay_command_duration_seconds{command}`
//! - `relay_command_errors_total{command,error}`
//! - `relay_subscribers` - live subscriber count
//! - `relay_broadcast_fanout` - recipients per broadcast

use prometheus::{
    Encoder, Histogram, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, IntGauge, Opts,
    Registry, TextEncoder,
};
use std::sync::OnceLock;

/// Global Prometheus registry for all metrics.
pub static REGISTRY: OnceLock<Registry> = OnceLock::new();

pub fn registry() -> &'static Registry {
    REGISTRY.get_or_init(Registry::new)
}

// ========================================================================
// Counters
// ========================================================================

/// Broadcast calls handled, including rejected empty ones.
pub static BROADCASTS: OnceLock<IntCounter> = OnceLock::new();

/// Per-recipient delivery outcomes.
pub static DELIVERIES: OnceLock<IntCounterVec> = OnceLock::new();

/// Ingress connections by outcome.
pub static INGRESS_CONNECTIONS: OnceLock<IntCounterVec> = OnceLock::new();

/// Chat commands processed by type.
pub static COMMAND_COUNTER: OnceLock<IntCounterVec> = OnceLock::new();

/// Command errors by type and error kind.
pub static COMMAND_ERRORS: OnceLock<IntCounterVec> = OnceLock::new();

// ========================================================================
// Gauges and histograms
// ========================================================================

pub static SUBSCRIBERS: OnceLock<IntGauge> = OnceLock::new();

/// Command processing latency by command type.
pub static COMMAND_LATENCY: OnceLock<HistogramVec> = OnceLock::new();

/// Recipients per broadcast.
pub static BROADCAST_FANOUT: OnceLock<Histogram> = OnceLock::new();

/// Initialize the Prometheus metrics registry.
///
/// Call once at startup. Later calls leave the first registration in place.
pub fn init() {
    let r = registry();

    macro_rules! register {
        ($metric:ident, $init:expr) => {
            match $init {
                Ok(m) => {
                    if let Err(e) = r.register(Box::new(m.clone())) {
                        tracing::warn!(error = %e, concat!("Failed to register metric ", stringify!($metric)));
                    }
                    let _ = $metric.set(m);
                }
                Err(e) => {
                    tracing::warn!(error = %e, concat!("Failed to create metric ", stringify!($metric)));
                }
            }
        };
    }

    register!(BROADCASTS, IntCounter::new("relay_broadcasts_total", "Broadcasts handled"));
    register!(DELIVERIES, IntCounterVec::new(Opts::new("relay_deliveries_total", "Per-recipient delivery outcomes"), &["result"]));
    register!(INGRESS_CONNECTIONS, IntCounterVec::new(Opts::new("relay_ingress_connections_total", "Ingress connections by outcome"), &["result"]));
    register!(COMMAND_COUNTER, IntCounterVec::new(Opts::new("relay_command_total", "Chat commands processed by type"), &["command"]));
    register!(COMMAND_ERRORS, IntCounterVec::new(Opts::new("relay_command_errors_total", "Chat command errors by type"), &["command", "error"]));
    register!(SUBSCRIBERS, IntGauge::new("relay_subscribers", "Registered subscribers"));
    register!(COMMAND_LATENCY, HistogramVec::new(
        HistogramOpts::new("relay_command_duration_seconds", "Chat command latency by type")
            .buckets(vec![0.0005, 0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0]),
        &["command"]));
    register!(BROADCAST_FANOUT, Histogram::with_opts(
        HistogramOpts::new("relay_broadcast_fanout", "Recipients per broadcast")
            .buckets(vec![0.0, 1.0, 5.0, 10.0, 25.0, 50.0, 100.0, 250.0, 1000.0])));
}

/// Gather all metrics and encode them in Prometheus text format.
pub fn gather_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = registry().gather();
    let mut buffer = vec![];
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        tracing::error!(error = %e, "Failed to encode Prometheus metrics");
        return String::new();
    }
    match String::from_utf8(buffer) {
        Ok(s) => s,
        Err(e) => {
            tracing::error!(error = %e, "Prometheus metrics were not valid UTF-8");
            String::new()
        }
    }
}

// ============================================================================
// Helper functions for metric updates
// ============================================================================

/// Record a command execution with latency.
#[inline]
pub fn record_command(command: &str, duration_secs: f64) {
    if let Some(c) = COMMAND_COUNTER.get() {
        c.with_label_values(&[command]).inc();
    }
    if let Some(h) = COMMAND_LATENCY.get() {
        h.with_label_values(&[command]).observe(duration_secs);
    }
}

/// Record a command error.
#[inline]
pub fn record_command_error(command: &str, error: &str) {
    if let Some(c) = COMMAND_ERRORS.get() {
        c.with_label_values(&[command, error]).inc();
    }
}

/// Record one broadcast and how many recipients it targeted.
#[inline]
pub fn record_broadcast(recipients: usize) {
    if let Some(c) = BROADCASTS.get() {
        c.inc();
    }
    if let Some(h) = BROADCAST_FANOUT.get() {
        h.observe(recipients as f64);
    }
}

/// Record one delivery outcome (`ok` or an error label).
#[inline]
pub fn record_delivery(result: &str) {
    if let Some(c) = DELIVERIES.get() {
        c.with_label_values(&[result]).inc();
    }
}

/// Record one ingress connection outcome (`ok` or an error label).
#[inline]
pub fn record_ingress(result: &str) {
    if let Some(c) = INGRESS_CONNECTIONS.get() {
        c.with_label_values(&[result]).inc();
    }
}

#[inline]
pub fn set_subscribers(count: usize) {
    if let Some(g) = SUBSCRIBERS.get() {
        g.set(i64::try_from(count).unwrap_or(i64::MAX));
    }
}
