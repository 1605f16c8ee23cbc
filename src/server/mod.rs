// src/server/mod.rs

use crate::config::Config;
use anyhow::Result;
use tokio::runtime::Handle;

mod initialization;
mod lifecycle;
mod listener;
mod metrics_server;
pub mod runtime;

pub use initialization::Server;
pub use listener::Listener;
pub use runtime::{MAX_WORKER_THREADS, ServerRuntime, clamp_worker_threads};

/// Starts both servers on `runtime` and runs until shutdown is requested.
pub async fn run(config: Config, runtime: Handle) -> Result<()> {
    // 1. Initialize state and bind both listeners.
    let server = Server::start(config, runtime).await?;

    // 2. Serve until a signal or an admin `shutdown`, then stop in order.
    lifecycle::run_until_shutdown(server).await
}
