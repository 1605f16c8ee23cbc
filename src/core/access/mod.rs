// src/core/access/mod.rs

//! Door and user registry, authorization, and its durable JSON mirror.

pub mod engine;
pub mod names;
pub mod store;
pub mod tables;

pub use engine::{AccessControl, Authorization, Record};
pub use names::to_snake_case;
pub use store::{ConfigDocument, ConfigStore, DocumentState, DoorEntry, UserEntry};
pub use tables::{AccessTables, Decision, Door, User, UserTable};

/// Selects the table an admin command operates on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordKind {
    Door,
    User,
}
