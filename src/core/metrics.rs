// src/core/metrics.rs

//! Defines and registers Prometheus metrics for server monitoring.
//!
//! This module uses `lazy_static` to ensure that metrics are registered only once
//! globally for the entire application lifecycle.

use lazy_static::lazy_static;
use prometheus::{
    Counter, CounterVec, Histogram, IntGauge, IntGaugeVec, TextEncoder, register_counter,
    register_counter_vec, register_histogram, register_int_gauge, register_int_gauge_vec,
};

lazy_static! {
    // --- Connection metrics, labeled by listener ("client" or "admin") ---
    /// The total number of connections accepted since startup.
    pub static ref CONNECTIONS_ACCEPTED_TOTAL: CounterVec =
        register_counter_vec!("doorwarden_connections_accepted_total", "Total number of connections accepted, labeled by listener.", &["listener"]).unwrap();
    /// The number of connections currently open.
    pub static ref CONNECTIONS_LIVE: IntGaugeVec =
        register_int_gauge_vec!("doorwarden_connections_live", "Number of currently open connections, labeled by listener.", &["listener"]).unwrap();

    // --- Access decisions and admin activity ---
    /// Authorization decisions, labeled by outcome.
    pub static ref AUTHORIZATIONS_TOTAL: CounterVec =
        register_counter_vec!("doorwarden_authorizations_total", "Total number of authorization decisions, labeled by outcome.", &["outcome"]).unwrap();
    /// Admin commands accepted by the parser, labeled by verb.
    pub static ref ADMIN_COMMANDS_TOTAL: CounterVec =
        register_counter_vec!("doorwarden_admin_commands_total", "Total number of admin commands, labeled by verb.", &["verb"]).unwrap();

    // --- Registry and persistence ---
    pub static ref DOORS_GAUGE: IntGauge =
        register_int_gauge!("doorwarden_doors", "Number of registered doors.").unwrap();
    pub static ref USERS_GAUGE: IntGauge =
        register_int_gauge!("doorwarden_users", "Number of registered users.").unwrap();
    /// Successful rewrites of the access configuration file.
    pub static ref CONFIG_WRITES_TOTAL: Counter =
        register_counter!("doorwarden_config_writes_total", "Total number of successful configuration rewrites.").unwrap();
    /// Rewrites that failed and were rolled back.
    pub static ref CONFIG_WRITE_FAILURES_TOTAL: Counter =
        register_counter!("doorwarden_config_write_failures_total", "Total number of failed configuration rewrites.").unwrap();

    /// Time spent answering a reader request.
    pub static ref AUTHORIZATION_LATENCY_SECONDS: Histogram =
        register_histogram!("doorwarden_authorization_latency_seconds", "Latency of reader authorization in seconds.").unwrap();
}

/// Gathers all registered metrics and encodes them in the Prometheus text format.
pub fn gather_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    encoder
        .encode_to_string(&metric_families)
        .unwrap_or_else(|e| format!("# failed to encode metrics: {e}\n"))
}
