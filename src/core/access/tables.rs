// src/core/access/tables.rs

//! The in-memory door and user tables.
//!
//! Users are stored once, keyed by a generated record id, and indexed by name
//! and by credential id. Every mutation goes through `UserTable`, which keeps the
//! record store and both indices in step.

use super::names::to_snake_case;
use super::store::{ConfigDocument, DoorEntry, UserEntry};
use crate::core::AccessError;
use std::collections::HashMap;
use tracing::warn;

/// Identifier of a user record inside `UserTable`.
pub type RecordId = u64;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Door {
    pub name: String,
    pub level: u8,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct User {
    pub name: String,
    pub credential_id: String,
    pub level: u8,
}

/// Outcome of an authorization check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Approved,
    Denied,
    UnknownDoor,
}

impl Decision {
    /// The reply line sent to the reader.
    pub fn reply(&self) -> &'static str {
        match self {
            Decision::Approved => "approved",
            Decision::Denied => "denied",
            Decision::UnknownDoor => "Unknown Door",
        }
    }

    /// Short label used for metrics and audit records.
    pub fn label(&self) -> &'static str {
        match self {
            Decision::Approved => "approved",
            Decision::Denied => "denied",
            Decision::UnknownDoor => "unknown_door",
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct UserTable {
    records: HashMap<RecordId, User>,
    by_name: HashMap<String, RecordId>,
    by_credential: HashMap<String, RecordId>,
    next_id: RecordId,
}

impl UserTable {
    pub fn by_name(&self, name: &str) -> Option<&User> {
        self.by_name.get(name).and_then(|id| self.records.get(id))
    }

    pub fn by_credential(&self, credential_id: &str) -> Option<&User> {
        self.by_credential
            .get(credential_id)
            .and_then(|id| self.records.get(id))
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &User> {
        self.records.values()
    }

    /// Inserts a user, rejecting a duplicate name or credential id.
    pub fn insert(&mut self, user: User) -> Result<(), AccessError> {
        if self.by_name.contains_key(&user.name) {
            return Err(AccessError::UserExists);
        }
        if self.by_credential.contains_key(&user.credential_id) {
            return Err(AccessError::CredentialInUse);
        }
        let id = self.next_id;
        self.next_id += 1;
        self.by_name.insert(user.name.clone(), id);
        self.by_credential.insert(user.credential_id.clone(), id);
        self.records.insert(id, user);
        Ok(())
    }

    /// Removes a user from the store and both indices.
    pub fn remove_by_name(&mut self, name: &str) -> Option<User> {
        let id = self.by_name.remove(name)?;
        let user = self.records.remove(&id)?;
        self.by_credential.remove(&user.credential_id);
        Some(user)
    }

    /// True when both indices point at records that agree on name and credential.
    pub fn is_consistent(&self) -> bool {
        self.by_name.len() == self.records.len()
            && self.by_credential.len() == self.records.len()
            && self.records.iter().all(|(id, user)| {
                self.by_name.get(&user.name) == Some(id)
                    && self.by_credential.get(&user.credential_id) == Some(id)
            })
    }
}

/// Doors and users, keyed by normalized name.
#[derive(Debug, Clone, Default)]
pub struct AccessTables {
    doors: HashMap<String, Door>,
    users: UserTable,
}

impl AccessTables {
    /// Builds tables from a persisted document, skipping entries that would
    /// break uniqueness. Returns the tables and the number of skipped entries.
    pub fn from_document(doc: &ConfigDocument) -> (Self, usize) {
        let mut tables = Self::default();
        let mut skipped = 0;
        for entry in &doc.doors {
            if let Err(e) = tables.insert_door(&entry.name, entry.lvl) {
                warn!("Skipping door entry '{}' in config: {}", entry.name, e);
                skipped += 1;
            }
        }
        for entry in &doc.users {
            if let Err(e) = tables.insert_user(&entry.name, entry.lvl, &entry.uid) {
                warn!("Skipping user entry '{}' in config: {}", entry.name, e);
                skipped += 1;
            }
        }
        (tables, skipped)
    }

    /// Serializable snapshot, doors and users sorted by name.
    pub fn to_document(&self) -> ConfigDocument {
        let mut doors: Vec<DoorEntry> = self
            .doors
            .values()
            .map(|d| DoorEntry {
                name: d.name.clone(),
                lvl: d.level,
            })
            .collect();
        doors.sort_by(|a, b| a.name.cmp(&b.name));

        let mut users: Vec<UserEntry> = self
            .users
            .iter()
            .map(|u| UserEntry {
                name: u.name.clone(),
                uid: u.credential_id.clone(),
                lvl: u.level,
            })
            .collect();
        users.sort_by(|a, b| a.name.cmp(&b.name));

        ConfigDocument { doors, users }
    }

    pub fn door(&self, name: &str) -> Option<&Door> {
        self.doors.get(&to_snake_case(name))
    }

    pub fn user(&self, name: &str) -> Option<&User> {
        self.users.by_name(&to_snake_case(name))
    }

    pub fn user_by_credential(&self, credential_id: &str) -> Option<&User> {
        self.users.by_credential(credential_id)
    }

    pub fn door_count(&self) -> usize {
        self.doors.len()
    }

    pub fn users(&self) -> &UserTable {
        &self.users
    }

    /// Approved iff the door exists, the credential belongs to a user, and the
    /// user's level is at least the door's level. Unknown doors short-circuit.
    pub fn authorize(&self, door_name: &str, credential_id: &str) -> (Decision, Option<&User>) {
        let Some(door) = self.door(door_name) else {
            return (Decision::UnknownDoor, None);
        };
        match self.users.by_credential(credential_id) {
            Some(user) if user.level >= door.level => (Decision::Approved, Some(user)),
            Some(user) => (Decision::Denied, Some(user)),
            None => (Decision::Denied, None),
        }
    }

    pub fn insert_door(&mut self, name: &str, level: u8) -> Result<Door, AccessError> {
        let name = canonical_name(name)?;
        if self.doors.contains_key(&name) {
            return Err(AccessError::DoorExists);
        }
        let door = Door { name, level };
        self.doors.insert(door.name.clone(), door.clone());
        Ok(door)
    }

    pub fn insert_user(
        &mut self,
        name: &str,
        level: u8,
        credential_id: &str,
    ) -> Result<User, AccessError> {
        let name = canonical_name(name)?;
        if credential_id.is_empty() {
            return Err(AccessError::Syntax);
        }
        let user = User {
            name,
            credential_id: credential_id.to_string(),
            level,
        };
        self.users.insert(user.clone())?;
        Ok(user)
    }

    pub fn remove_door(&mut self, name: &str) -> Result<Door, AccessError> {
        self.doors
            .remove(&to_snake_case(name))
            .ok_or(AccessError::DoorNotFound)
    }

    pub fn remove_user(&mut self, name: &str) -> Result<User, AccessError> {
        self.users
            .remove_by_name(&to_snake_case(name))
            .ok_or(AccessError::UserNotFound)
    }

    /// Remove-then-add. The caller works on a staged copy, so a failed add
    /// discards the whole edit.
    pub fn edit_door(
        &mut self,
        old_name: &str,
        new_name: &str,
        level: Option<u8>,
    ) -> Result<Door, AccessError> {
        let old = self.remove_door(old_name)?;
        self.insert_door(new_name, level.unwrap_or(old.level))
    }

    /// Remove-then-add, keeping the credential id.
    pub fn edit_user(
        &mut self,
        old_name: &str,
        new_name: &str,
        level: Option<u8>,
    ) -> Result<User, AccessError> {
        let old = self.remove_user(old_name)?;
        self.insert_user(new_name, level.unwrap_or(old.level), &old.credential_id)
    }
}

fn canonical_name(name: &str) -> Result<String, AccessError> {
    let name = to_snake_case(name.trim());
    if name.is_empty() {
        return Err(AccessError::Syntax);
    }
    Ok(name)
}
