// src/core/protocol/mod.rs

pub mod codec;
pub mod command;
pub use codec::{Reply, WireCodec, WireFrame};
pub use command::{AdminCommand, ClientRequest, HELP_LINES, LogKind};
