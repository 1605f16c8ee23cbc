// src/connection/guard.rs

//! Defines `ConnectionGuard`, an RAII guard for connection teardown.

use super::framed::ConnectionHandle;
use tracing::debug;

/// Closes its connection when dropped, so a dispatcher that returns early or
/// panics never leaves a socket open.
pub struct ConnectionGuard {
    handle: ConnectionHandle,
}

impl ConnectionGuard {
    pub fn new(handle: ConnectionHandle) -> Self {
        Self { handle }
    }
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        if self.handle.is_alive() {
            debug!(
                "ConnectionGuard dropping, closing connection {} ({})",
                self.handle.id(),
                self.handle.peer()
            );
        }
        self.handle.close();
    }
}
