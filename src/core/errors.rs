// src/core/errors.rs

//! Defines the primary error type for the access-control server.

use std::sync::Arc;
use thiserror::Error;

/// The main error enum, representing every failure the core can report.
///
/// The `Display` text of each domain and protocol variant is exactly the line
/// sent back to the peer, so dispatchers can answer with `err.to_string()`.
#[derive(Error, Debug)]
pub enum AccessError {
    #[error("IO Error: {0}")]
    Io(Arc<std::io::Error>),

    #[error("Connection is closed")]
    ConnectionClosed,

    #[error("Frame exceeds the maximum length of {0} bytes")]
    FrameTooLong(usize),

    #[error("Invalid Client Package Syntax - Connection Closed")]
    MalformedRequest,

    #[error("Operation failed - Incorrect CLI syntax")]
    Syntax,

    #[error("Unknown Command")]
    UnknownCommand(String),

    #[error("Door already exists")]
    DoorExists,

    #[error("Door could not be found")]
    DoorNotFound,

    #[error("User already exists")]
    UserExists,

    #[error("User could not be found")]
    UserNotFound,

    #[error("Credential already assigned")]
    CredentialInUse,

    #[error("Log could not be found")]
    LogNotFound,

    #[error("Another Admin is connected")]
    AdminAlreadyBound,

    #[error("Operation failed - Could not persist configuration")]
    Persistence(String),

    #[error("Internal Server Error: {0}")]
    Internal(String),
}

// `std::io::Error` is not cloneable, so it lives behind an `Arc`.
impl Clone for AccessError {
    fn clone(&self) -> Self {
        match self {
            AccessError::Io(e) => AccessError::Io(Arc::clone(e)),
            AccessError::ConnectionClosed => AccessError::ConnectionClosed,
            AccessError::FrameTooLong(n) => AccessError::FrameTooLong(*n),
            AccessError::MalformedRequest => AccessError::MalformedRequest,
            AccessError::Syntax => AccessError::Syntax,
            AccessError::UnknownCommand(s) => AccessError::UnknownCommand(s.clone()),
            AccessError::DoorExists => AccessError::DoorExists,
            AccessError::DoorNotFound => AccessError::DoorNotFound,
            AccessError::UserExists => AccessError::UserExists,
            AccessError::UserNotFound => AccessError::UserNotFound,
            AccessError::CredentialInUse => AccessError::CredentialInUse,
            AccessError::LogNotFound => AccessError::LogNotFound,
            AccessError::AdminAlreadyBound => AccessError::AdminAlreadyBound,
            AccessError::Persistence(s) => AccessError::Persistence(s.clone()),
            AccessError::Internal(s) => AccessError::Internal(s.clone()),
        }
    }
}

impl PartialEq for AccessError {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (AccessError::Io(e1), AccessError::Io(e2)) => e1.kind() == e2.kind(),
            (AccessError::FrameTooLong(a), AccessError::FrameTooLong(b)) => a == b,
            (AccessError::UnknownCommand(a), AccessError::UnknownCommand(b)) => a == b,
            (AccessError::Persistence(a), AccessError::Persistence(b)) => a == b,
            (AccessError::Internal(a), AccessError::Internal(b)) => a == b,
            _ => core::mem::discriminant(self) == core::mem::discriminant(other),
        }
    }
}

impl AccessError {
    /// True for EOF/reset style failures that end a connection without being noteworthy.
    pub fn is_normal_disconnect(&self) -> bool {
        match self {
            AccessError::ConnectionClosed => true,
            AccessError::Io(e) => matches!(
                e.kind(),
                std::io::ErrorKind::ConnectionReset
                    | std::io::ErrorKind::BrokenPipe
                    | std::io::ErrorKind::UnexpectedEof
                    | std::io::ErrorKind::ConnectionAborted
            ),
            _ => false,
        }
    }
}

// --- From trait implementations for easy error conversion ---

impl From<std::io::Error> for AccessError {
    fn from(e: std::io::Error) -> Self {
        AccessError::Io(Arc::new(e))
    }
}

impl From<serde_json::Error> for AccessError {
    fn from(e: serde_json::Error) -> Self {
        AccessError::Internal(format!("JSON serialization/deserialization error: {e}"))
    }
}

impl From<std::num::ParseIntError> for AccessError {
    fn from(_: std::num::ParseIntError) -> Self {
        AccessError::Syntax
    }
}
