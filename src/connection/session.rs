// src/connection/session.rs

//! The admin binding: the single connection allowed to act as the admin console.

use super::framed::ConnectionId;
use crate::core::AccessError;
use parking_lot::Mutex;
use tracing::info;

#[derive(Debug)]
pub struct AdminBinding {
    expected_name: String,
    bound: Mutex<Option<ConnectionId>>,
}

impl AdminBinding {
    pub fn new(expected_name: impl Into<String>) -> Self {
        Self {
            expected_name: expected_name.into(),
            bound: Mutex::new(None),
        }
    }

    /// True if `frame` is the configured admin identifier.
    pub fn matches(&self, frame: &str) -> bool {
        frame.trim() == self.expected_name
    }

    pub fn bound_to(&self) -> Option<ConnectionId> {
        *self.bound.lock()
    }

    /// True if a connection other than `id` holds the binding.
    pub fn is_held_by_other(&self, id: ConnectionId) -> bool {
        matches!(self.bound_to(), Some(other) if other != id)
    }

    /// Binds `id` unless another connection already holds the binding.
    /// Rebinding the current holder is a no-op.
    pub fn try_bind(&self, id: ConnectionId) -> Result<(), AccessError> {
        let mut slot = self.bound.lock();
        match *slot {
            Some(other) if other != id => Err(AccessError::AdminAlreadyBound),
            Some(_) => Ok(()),
            None => {
                *slot = Some(id);
                info!("Admin session bound to connection {}", id);
                Ok(())
            }
        }
    }

    /// Releases the binding if `id` holds it. Returns whether it did.
    pub fn release(&self, id: ConnectionId) -> bool {
        let mut slot = self.bound.lock();
        if *slot == Some(id) {
            *slot = None;
            info!("Admin session released by connection {}", id);
            true
        } else {
            false
        }
    }
}
