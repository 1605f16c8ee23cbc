// src/connection/mod.rs

//! Connection plumbing shared by both listeners: the framed socket with its
//! write sequencer, the teardown guard, and the admin binding.

mod framed;
mod guard;
mod session;

pub use framed::{
    Connection, ConnectionEvent, ConnectionHandle, ConnectionId, ConnectionWriter, FILE_CHUNK_SIZE,
};
pub use guard::ConnectionGuard;
pub use session::AdminBinding;
