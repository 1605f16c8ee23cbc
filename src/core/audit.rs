// src/core/audit.rs

//! The audit trail: every authorization decision and every admin mutation is
//! appended to semicolon-delimited CSV files, one per day, per user and per door.

use crate::core::AccessError;
use crate::core::access::{Authorization, Decision, to_snake_case};
use crate::core::protocol::LogKind;
use async_trait::async_trait;
use chrono::{DateTime, Local};
use std::path::{Path, PathBuf};
use tokio::fs::OpenOptions;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{debug, warn};

pub const CSV_HEADER: &str = "Date;Time;Door;Name;UserID;Access";

const SYSTEM_DIR: &str = "systemLogs";
const USER_DIR: &str = "userLogs";
const DOOR_DIR: &str = "doorLogs";

/// Placeholder written for a column that has no value.
const EMPTY_FIELD: &str = "-";

/// One line of the audit trail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuditEvent {
    pub door: Option<String>,
    /// Whether `door` names a registered door. Only registered doors get a
    /// per-door log file; the name still fills the CSV column.
    pub door_registered: bool,
    pub user: Option<String>,
    pub credential_id: String,
    pub access: String,
}

impl AuditEvent {
    /// A reader decision. Unknown credentials are recorded without a user.
    pub fn decision(auth: &Authorization, credential_id: &str) -> Self {
        Self {
            door: Some(auth.door.clone()),
            door_registered: auth.decision != Decision::UnknownDoor,
            user: auth.user.as_ref().map(|u| u.name.clone()),
            credential_id: credential_id.to_string(),
            access: auth.decision.label().to_string(),
        }
    }

    /// A committed admin mutation, recorded against the record it touched.
    pub fn admin(
        verb: &str,
        door: Option<&str>,
        user: Option<&str>,
        credential_id: Option<&str>,
    ) -> Self {
        Self {
            door: door.map(str::to_string),
            door_registered: door.is_some(),
            user: user.map(str::to_string),
            credential_id: credential_id.unwrap_or(EMPTY_FIELD).to_string(),
            access: verb.to_string(),
        }
    }

    fn to_csv_line(&self, now: &DateTime<Local>) -> String {
        format!(
            "{};{};{};{};{};{}\n",
            now.format("%d/%m/%Y"),
            now.format("%H:%M"),
            sanitize(self.door.as_deref().unwrap_or(EMPTY_FIELD)),
            sanitize(self.user.as_deref().unwrap_or(EMPTY_FIELD)),
            sanitize(&self.credential_id),
            sanitize(&self.access),
        )
    }
}

/// Reduces a name to characters that are safe inside a file name.
fn file_key(name: &str) -> String {
    name.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '_' || c == '-' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

fn sanitize(field: &str) -> String {
    field
        .chars()
        .map(|c| match c {
            ';' | '\n' | '\r' => '_',
            c => c,
        })
        .collect()
}

/// Destination of audit events, and the resolver for downloadable logs.
#[async_trait]
pub trait AuditSink: Send + Sync + std::fmt::Debug {
    /// Appends one event. Failures are logged, never returned.
    async fn record(&self, event: AuditEvent);

    /// Resolves the file backing a log request, or `LogNotFound`.
    async fn log_path(&self, kind: LogKind, key: &str) -> Result<PathBuf, AccessError>;
}

/// Writes `systemLogs/Log_<YYYY_MM_DD>.csv`, `userLogs/Log_<name>.csv` and
/// `doorLogs/Log_<door>.csv` under a root directory.
#[derive(Debug)]
pub struct CsvAuditLog {
    root: PathBuf,
    // Serializes appends so lines from concurrent decisions never interleave.
    write_lock: Mutex<()>,
}

impl CsvAuditLog {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            write_lock: Mutex::new(()),
        }
    }

    fn file_for(&self, kind: LogKind, key: &str) -> PathBuf {
        let dir = match kind {
            LogKind::System => SYSTEM_DIR,
            LogKind::User => USER_DIR,
            LogKind::Door => DOOR_DIR,
        };
        self.root.join(dir).join(format!("Log_{key}.csv"))
    }

    async fn append(&self, path: &Path, line: &str) -> std::io::Result<()> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .await?;
        if file.metadata().await?.len() == 0 {
            file.write_all(CSV_HEADER.as_bytes()).await?;
            file.write_all(b"\n").await?;
        }
        file.write_all(line.as_bytes()).await?;
        file.flush().await
    }
}

#[async_trait]
impl AuditSink for CsvAuditLog {
    async fn record(&self, event: AuditEvent) {
        let now = Local::now();
        let line = event.to_csv_line(&now);

        let mut targets = vec![self.file_for(LogKind::System, &now.format("%Y_%m_%d").to_string())];
        if let Some(user) = &event.user {
            targets.push(self.file_for(LogKind::User, &file_key(user)));
        }
        if let Some(door) = &event.door
            && event.door_registered
        {
            targets.push(self.file_for(LogKind::Door, &file_key(door)));
        }

        let _guard = self.write_lock.lock().await;
        for path in targets {
            if let Err(e) = self.append(&path, &line).await {
                warn!("Failed to append audit record to {}: {}", path.display(), e);
            }
        }
    }

    async fn log_path(&self, kind: LogKind, key: &str) -> Result<PathBuf, AccessError> {
        let key = match kind {
            LogKind::System => file_key(&key.replace('-', "_")),
            LogKind::User | LogKind::Door => file_key(&to_snake_case(key)),
        };
        let path = self.file_for(kind, &key);
        match tokio::fs::metadata(&path).await {
            Ok(meta) if meta.is_file() => Ok(path),
            _ => {
                debug!("Requested log {} does not exist", path.display());
                Err(AccessError::LogNotFound)
            }
        }
    }
}

/// Discards every event. Used when auditing is disabled.
#[derive(Debug, Default)]
pub struct NullAuditSink;

#[async_trait]
impl AuditSink for NullAuditSink {
    async fn record(&self, _event: AuditEvent) {}

    async fn log_path(&self, _kind: LogKind, _key: &str) -> Result<PathBuf, AccessError> {
        Err(AccessError::LogNotFound)
    }
}
