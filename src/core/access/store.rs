// src/core/access/store.rs

//! The durable JSON mirror of the door and user tables.
//!
//! The file is only ever replaced whole: the snapshot is written to a temporary
//! file next to the target, synced, and renamed over it.

use crate::core::AccessError;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::{Path, PathBuf};
use tokio::fs::File as TokioFile;
use tokio::io::AsyncWriteExt;
use tracing::{debug, error, warn};

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct DoorEntry {
    pub name: String,
    #[serde(alias = "accessLevel")]
    pub lvl: u8,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct UserEntry {
    pub name: String,
    pub uid: String,
    #[serde(alias = "accessLevel")]
    pub lvl: u8,
}

/// `{"doors":[...], "users":[...]}`
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfigDocument {
    #[serde(default)]
    pub doors: Vec<DoorEntry>,
    #[serde(default)]
    pub users: Vec<UserEntry>,
}

impl ConfigDocument {
    /// Parses a document entry by entry, so one bad record does not discard
    /// the rest. Returns the document and the number of skipped entries.
    pub fn from_json_lenient(contents: &str) -> Result<(Self, usize), AccessError> {
        let value: Value = serde_json::from_str(contents)?;
        let Value::Object(mut root) = value else {
            return Err(AccessError::Internal(
                "config document is not a JSON object".into(),
            ));
        };
        let mut skipped = 0;
        let doors = take_entries::<DoorEntry>(&mut root, "doors", &mut skipped);
        let users = take_entries::<UserEntry>(&mut root, "users", &mut skipped);
        Ok((Self { doors, users }, skipped))
    }
}

fn take_entries<T: serde::de::DeserializeOwned>(
    root: &mut serde_json::Map<String, Value>,
    key: &str,
    skipped: &mut usize,
) -> Vec<T> {
    match root.remove(key) {
        Some(Value::Array(items)) => items
            .into_iter()
            .filter_map(|item| match serde_json::from_value::<T>(item) {
                Ok(entry) => Some(entry),
                Err(e) => {
                    warn!("Invalid {} entry in config document, skipping it: {}", key, e);
                    *skipped += 1;
                    None
                }
            })
            .collect(),
        Some(_) => {
            warn!("'{}' in config document is not an array, ignoring it", key);
            Vec::new()
        }
        None => Vec::new(),
    }
}

/// What was found on disk when the document was read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DocumentState {
    Loaded,
    Missing,
    Empty,
    Corrupt(String),
}

/// Reads and atomically rewrites the JSON document at a fixed path.
#[derive(Debug, Clone)]
pub struct ConfigStore {
    path: PathBuf,
}

impl ConfigStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reads the document. A missing, empty or malformed file yields an
    /// empty document together with the state that was found.
    pub async fn load(&self) -> (ConfigDocument, DocumentState) {
        let contents = match tokio::fs::read_to_string(&self.path).await {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return (ConfigDocument::default(), DocumentState::Missing);
            }
            Err(e) => {
                return (
                    ConfigDocument::default(),
                    DocumentState::Corrupt(e.to_string()),
                );
            }
        };
        if contents.trim().is_empty() {
            return (ConfigDocument::default(), DocumentState::Empty);
        }
        match ConfigDocument::from_json_lenient(&contents) {
            Ok((doc, _skipped)) => (doc, DocumentState::Loaded),
            Err(e) => (ConfigDocument::default(), DocumentState::Corrupt(e.to_string())),
        }
    }

    /// Writes `doc` to a temporary sibling file and renames it over the target.
    pub async fn write_atomic(&self, doc: &ConfigDocument) -> Result<(), AccessError> {
        let body = serde_json::to_vec_pretty(doc)?;
        let temp_path = self.temp_path();

        if let Err(e) = write_and_sync(&temp_path, &body).await {
            error!(
                "Failed to write temporary config file '{}': {}",
                temp_path.display(),
                e
            );
            if let Err(remove_err) = tokio::fs::remove_file(&temp_path).await {
                debug!(
                    "Could not remove temporary config file '{}': {}",
                    temp_path.display(),
                    remove_err
                );
            }
            return Err(AccessError::Persistence(e.to_string()));
        }

        if let Err(e) = tokio::fs::rename(&temp_path, &self.path).await {
            error!(
                "CRITICAL: Failed to rename '{}' over '{}': {}",
                temp_path.display(),
                self.path.display(),
                e
            );
            if let Err(remove_err) = tokio::fs::remove_file(&temp_path).await {
                error!(
                    "Additionally failed to remove temporary config file '{}': {}",
                    temp_path.display(),
                    remove_err
                );
            }
            return Err(AccessError::Persistence(e.to_string()));
        }

        debug!("Config document written to {}", self.path.display());
        Ok(())
    }

    fn temp_path(&self) -> PathBuf {
        let file_name = self
            .path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "config.json".to_string());
        self.path
            .with_file_name(format!("{}.tmp.{}", file_name, rand::random::<u32>()))
    }
}

async fn write_and_sync(path: &Path, body: &[u8]) -> std::io::Result<()> {
    let mut file = TokioFile::create(path).await?;
    file.write_all(body).await?;
    file.write_all(b"\n").await?;
    file.sync_all().await?;
    Ok(())
}
