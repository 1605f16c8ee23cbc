// src/server/initialization.rs

//! Brings the server up: shared state, both listeners with their dispatchers,
//! and the optional metrics endpoint.

use super::listener::Listener;
use super::metrics_server;
use crate::config::Config;
use crate::core::handler::{admin, client};
use crate::core::state::ServerState;
use anyhow::{Context, Result, anyhow};
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use tokio::runtime::Handle;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

/// A running pair of listeners sharing one `ServerState`.
pub struct Server {
    state: Arc<ServerState>,
    client: Listener,
    admin: Listener,
    metrics_stop: CancellationToken,
    metrics_task: Option<JoinHandle<()>>,
    shutdown_rx: broadcast::Receiver<()>,
}

impl Server {
    /// Initializes state, binds both ports and starts accepting on `runtime`.
    pub async fn start(config: Config, runtime: Handle) -> Result<Self> {
        log_startup_info(&config);
        prepare_store_dir(&config.store_path).await?;

        let state = ServerState::initialize(config).await?;
        let shutdown_rx = state.shutdown_tx.subscribe();
        let config = &state.config;

        let mut client_listener = Listener::bind(
            "client",
            (config.host.as_str(), config.client_port),
            config.max_frame_length,
        )
        .await
        .with_context(|| format!("Failed to bind client port {}", config.client_port))?;
        let client_state = state.clone();
        client_listener.on_client_connect(move |conn| client::serve(conn, client_state.clone()));

        let mut admin_listener = Listener::bind(
            "admin",
            (config.host.as_str(), config.admin_port),
            config.max_frame_length,
        )
        .await
        .with_context(|| format!("Failed to bind admin port {}", config.admin_port))?;
        let admin_state = state.clone();
        admin_listener.on_client_connect(move |conn| admin::serve(conn, admin_state.clone()));
        let binding_state = state.clone();
        admin_listener.on_client_disconnect(move |id| {
            binding_state.admin.release(id);
        });

        let metrics_stop = CancellationToken::new();
        let metrics_task = if config.metrics.enabled {
            let listener = tokio::net::TcpListener::bind((config.host.as_str(), config.metrics.port))
                .await
                .with_context(|| format!("Failed to bind metrics port {}", config.metrics.port))?;
            Some(runtime.spawn(metrics_server::run_metrics_server(
                listener,
                metrics_stop.clone(),
            )))
        } else {
            info!("Prometheus metrics server is disabled in the configuration.");
            None
        };

        client_listener.start(&runtime);
        admin_listener.start(&runtime);
        info!(
            "doorwarden ready: readers on {}, admin console on {}",
            client_listener.local_addr(),
            admin_listener.local_addr()
        );

        Ok(Self {
            state,
            client: client_listener,
            admin: admin_listener,
            metrics_stop,
            metrics_task,
            shutdown_rx,
        })
    }

    pub fn state(&self) -> &Arc<ServerState> {
        &self.state
    }

    pub fn client_addr(&self) -> SocketAddr {
        self.client.local_addr()
    }

    pub fn admin_addr(&self) -> SocketAddr {
        self.admin.local_addr()
    }

    pub fn client_listener(&self) -> &Listener {
        &self.client
    }

    /// Resolves when a `shutdown` command has been issued.
    pub async fn shutdown_requested(&mut self) {
        // A lagged receiver still means shutdown was requested.
        let _ = self.shutdown_rx.recv().await;
    }

    /// Stops both listeners, closing every connection, then the metrics endpoint.
    pub async fn stop(mut self) {
        self.client.stop().await;
        self.admin.stop().await;

        self.metrics_stop.cancel();
        if let Some(task) = self.metrics_task.take() {
            if let Err(e) = task.await {
                error!("Metrics server task failed: {:?}", e);
            }
        }

        info!(
            "Server stopped. {} connections accepted, {} frames handled.",
            self.state.stats.get_total_connections(),
            self.state.stats.get_total_frames()
        );
    }
}

async fn prepare_store_dir(store_path: &str) -> Result<()> {
    if let Some(parent) = Path::new(store_path).parent()
        && !parent.as_os_str().is_empty()
        && !parent.exists()
    {
        tokio::fs::create_dir_all(parent).await.map_err(|e| {
            anyhow!(
                "Failed to create store directory '{}': {}",
                parent.display(),
                e
            )
        })?;
        info!("Created store directory: {}", parent.display());
    }
    Ok(())
}

/// Logs key configuration parameters at startup.
fn log_startup_info(config: &Config) {
    info!(
        "Client port {}, admin port {}, admin name '{}'.",
        config.client_port, config.admin_port, config.admin_name
    );
    info!("Access configuration stored at {}.", config.store_path);
}
