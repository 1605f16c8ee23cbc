// src/core/state/stats.rs

//! Contains state definitions and logic for server statistics.

use std::sync::atomic::{AtomicU64, Ordering};

/// Process-wide counters, logged at shutdown.
#[derive(Debug, Default)]
pub struct StatsState {
    /// Connections accepted on either listener since startup.
    total_connections: AtomicU64,
    /// Inbound frames handled by either dispatcher since startup.
    total_frames: AtomicU64,
}

impl StatsState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn increment_total_connections(&self) {
        self.total_connections.fetch_add(1, Ordering::Relaxed);
    }

    pub fn get_total_connections(&self) -> u64 {
        self.total_connections.load(Ordering::Relaxed)
    }

    pub fn increment_total_frames(&self) {
        self.total_frames.fetch_add(1, Ordering::Relaxed);
    }

    pub fn get_total_frames(&self) -> u64 {
        self.total_frames.load(Ordering::Relaxed)
    }
}
