// src/core/handler/mod.rs

//! Per-connection protocol dispatchers for the reader and admin ports.

pub mod admin;
pub mod client;

/// What a dispatcher does after handling a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    /// Re-arm the read loop on the same connection.
    Continue,
    /// Flush queued replies and close the connection.
    Close,
}
