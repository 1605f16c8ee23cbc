// src/core/mod.rs

//! The central module containing the core logic and data structures of the
//! access-control server.

pub mod access;
pub mod audit;
pub mod errors;
pub mod handler;
pub mod metrics;
pub mod protocol;
pub mod state;

pub use errors::AccessError;
