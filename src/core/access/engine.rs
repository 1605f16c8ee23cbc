// src/core/access/engine.rs

//! The access-control engine: shared door/user tables behind one
//! process-wide reader/writer lock, mirrored to the JSON store.
//!
//! Lookups take the lock in shared mode. Every mutation takes it exclusively,
//! applies the change to a staged copy, rewrites the store from that copy and
//! only then swaps it in. A failed rewrite leaves memory and disk untouched.

use super::RecordKind;
use super::store::{ConfigStore, DocumentState};
use super::tables::{AccessTables, Decision, Door, User};
use crate::core::AccessError;
use crate::core::metrics::{CONFIG_WRITE_FAILURES_TOTAL, CONFIG_WRITES_TOTAL, DOORS_GAUGE, USERS_GAUGE};
use tokio::sync::RwLock;
use tracing::{info, warn};

/// The result of an authorization check, with the records it touched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Authorization {
    pub decision: Decision,
    pub door: String,
    pub user: Option<User>,
}

/// A record produced by a rename/edit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Record {
    Door(Door),
    User(User),
}

#[derive(Debug)]
pub struct AccessControl {
    tables: RwLock<AccessTables>,
    store: ConfigStore,
}

impl AccessControl {
    /// Loads the store and builds the tables. A missing or empty file is
    /// created as an empty document; a malformed one is reset to it.
    pub async fn open(store: ConfigStore) -> Result<Self, AccessError> {
        let (doc, state) = store.load().await;
        let (tables, skipped) = AccessTables::from_document(&doc);

        match &state {
            DocumentState::Loaded => {
                info!(
                    "Loaded {} doors and {} users from {}",
                    tables.door_count(),
                    tables.users().len(),
                    store.path().display()
                );
            }
            DocumentState::Missing | DocumentState::Empty => {
                info!(
                    "No access configuration at {}, creating an empty one.",
                    store.path().display()
                );
            }
            DocumentState::Corrupt(reason) => {
                warn!(
                    "Access configuration at {} is invalid ({}), resetting it.",
                    store.path().display(),
                    reason
                );
            }
        }

        // Rewrite whenever the file does not already mirror the tables.
        if state != DocumentState::Loaded || skipped > 0 || tables.to_document() != doc {
            store.write_atomic(&tables.to_document()).await?;
        }

        update_gauges(&tables);
        Ok(Self {
            tables: RwLock::new(tables),
            store,
        })
    }

    pub fn store(&self) -> &ConfigStore {
        &self.store
    }

    /// Decides whether `credential_id` may open `door_name`.
    pub async fn authorize(&self, door_name: &str, credential_id: &str) -> Authorization {
        let tables = self.tables.read().await;
        let (decision, user) = tables.authorize(door_name, credential_id);
        Authorization {
            decision,
            door: tables
                .door(door_name)
                .map(|d| d.name.clone())
                .unwrap_or_else(|| door_name.to_string()),
            user: user.cloned(),
        }
    }

    pub async fn door(&self, name: &str) -> Option<Door> {
        self.tables.read().await.door(name).cloned()
    }

    pub async fn user(&self, name: &str) -> Option<User> {
        self.tables.read().await.user(name).cloned()
    }

    pub async fn user_by_credential(&self, credential_id: &str) -> Option<User> {
        self.tables
            .read()
            .await
            .user_by_credential(credential_id)
            .cloned()
    }

    /// A consistent copy of the current tables.
    pub async fn snapshot(&self) -> AccessTables {
        self.tables.read().await.clone()
    }

    pub async fn add_door(&self, name: &str, level: u8) -> Result<Door, AccessError> {
        self.commit(|t| t.insert_door(name, level)).await
    }

    pub async fn add_user(
        &self,
        name: &str,
        level: u8,
        credential_id: &str,
    ) -> Result<User, AccessError> {
        self.commit(|t| t.insert_user(name, level, credential_id))
            .await
    }

    pub async fn remove_door(&self, name: &str) -> Result<Door, AccessError> {
        self.commit(|t| t.remove_door(name)).await
    }

    pub async fn remove_user(&self, name: &str) -> Result<User, AccessError> {
        self.commit(|t| t.remove_user(name)).await
    }

    /// Renames a door or user and optionally changes its level. The old level
    /// is kept when `level` is `None`; a user keeps its credential id.
    pub async fn rename_or_edit(
        &self,
        kind: RecordKind,
        old_name: &str,
        new_name: &str,
        level: Option<u8>,
    ) -> Result<Record, AccessError> {
        self.commit(|t| match kind {
            RecordKind::Door => t.edit_door(old_name, new_name, level).map(Record::Door),
            RecordKind::User => t.edit_user(old_name, new_name, level).map(Record::User),
        })
        .await
    }

    /// Runs `apply` against a staged copy of the tables under the write lock,
    /// persists the staged state and swaps it in. Domain errors from `apply`
    /// return before anything is written.
    async fn commit<T>(
        &self,
        apply: impl FnOnce(&mut AccessTables) -> Result<T, AccessError>,
    ) -> Result<T, AccessError> {
        let mut tables = self.tables.write().await;

        let mut staged = tables.clone();
        let outcome = apply(&mut staged)?;

        let (on_disk, state) = self.store.load().await;
        let current = tables.to_document();
        if state != DocumentState::Loaded || on_disk != current {
            warn!(
                "Access configuration at {} drifted from memory ({:?}); it will be rewritten.",
                self.store.path().display(),
                state
            );
        }

        if let Err(e) = self.store.write_atomic(&staged.to_document()).await {
            CONFIG_WRITE_FAILURES_TOTAL.inc();
            return Err(e);
        }
        CONFIG_WRITES_TOTAL.inc();

        *tables = staged;
        update_gauges(&tables);
        Ok(outcome)
    }
}

fn update_gauges(tables: &AccessTables) {
    DOORS_GAUGE.set(tables.door_count() as i64);
    USERS_GAUGE.set(tables.users().len() as i64);
}
