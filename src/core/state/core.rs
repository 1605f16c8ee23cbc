// src/core/state/core.rs

//! Defines the central `ServerState` struct, holding all shared server-wide state.

use super::stats::StatsState;
use crate::config::Config;
use crate::connection::AdminBinding;
use crate::core::access::{AccessControl, ConfigStore};
use crate::core::audit::{AuditSink, CsvAuditLog, NullAuditSink};
use anyhow::{Context, Result};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::info;

/// The state shared by both listeners and every dispatcher.
///
/// Wrapped in an `Arc`; the access tables carry their own reader/writer lock and
/// the admin binding its own mutex, so nothing here needs an outer lock.
#[derive(Debug)]
pub struct ServerState {
    pub config: Config,
    pub access: Arc<AccessControl>,
    pub audit: Arc<dyn AuditSink>,
    pub admin: AdminBinding,
    pub stats: StatsState,
    /// Fired once when a `shutdown` command or a signal asks the process to stop.
    pub shutdown_tx: broadcast::Sender<()>,
}

impl ServerState {
    /// Opens the access store and the audit sink described by `config`.
    pub async fn initialize(config: Config) -> Result<Arc<Self>> {
        let access = AccessControl::open(ConfigStore::new(&config.store_path))
            .await
            .with_context(|| {
                format!(
                    "Failed to open access configuration at {}",
                    config.store_path
                )
            })?;

        let audit: Arc<dyn AuditSink> = if config.audit.enabled {
            info!("Audit logs are written under {}", config.audit.log_dir);
            Arc::new(CsvAuditLog::new(&config.audit.log_dir))
        } else {
            info!("Audit logging is disabled.");
            Arc::new(NullAuditSink)
        };

        let (shutdown_tx, _) = broadcast::channel(1);
        Ok(Arc::new(Self {
            admin: AdminBinding::new(config.admin_name.clone()),
            config,
            access: Arc::new(access),
            audit,
            stats: StatsState::new(),
            shutdown_tx,
        }))
    }

    /// Asks the process to shut down. Safe to call more than once.
    pub fn request_shutdown(&self) {
        // No receivers simply means shutdown is already underway.
        let _ = self.shutdown_tx.send(());
    }
}
