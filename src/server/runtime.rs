// src/server/runtime.rs

//! The explicit thread pool shared by both listeners.

use std::future::Future;
use std::time::Duration;
use tokio::runtime::{Builder, Handle, Runtime};
use tracing::{info, warn};

/// Hard ceiling on the number of worker threads driving the I/O event loop.
pub const MAX_WORKER_THREADS: usize = 4;

/// Clamps a configured worker count into `1..=MAX_WORKER_THREADS`.
pub fn clamp_worker_threads(requested: usize) -> usize {
    if requested > MAX_WORKER_THREADS {
        warn!(
            "worker_threads = {} exceeds the maximum of {}, using {}",
            requested, MAX_WORKER_THREADS, MAX_WORKER_THREADS
        );
        MAX_WORKER_THREADS
    } else {
        requested.max(1)
    }
}

/// Owns the multi-threaded tokio runtime. Listeners only ever see its `Handle`.
#[derive(Debug)]
pub struct ServerRuntime {
    runtime: Runtime,
}

impl ServerRuntime {
    pub fn new(worker_threads: usize) -> std::io::Result<Self> {
        let worker_threads = clamp_worker_threads(worker_threads);
        let runtime = Builder::new_multi_thread()
            .worker_threads(worker_threads)
            .thread_name("doorwarden-worker")
            .enable_all()
            .build()?;
        info!("Runtime started with {} worker threads", worker_threads);
        Ok(Self { runtime })
    }

    pub fn handle(&self) -> Handle {
        self.runtime.handle().clone()
    }

    pub fn block_on<F: Future>(&self, future: F) -> F::Output {
        self.runtime.block_on(future)
    }

    /// Stops the runtime and joins its worker threads, waiting at most `timeout`
    /// for tasks that are still running.
    pub fn shutdown(self, timeout: Duration) {
        self.runtime.shutdown_timeout(timeout);
        info!("Runtime worker threads joined.");
    }
}
