//! Per-user audit trail of security-relevant actions
//!
//! Entries are kept newest-first and capped at [`MAX_ENTRIES`]. Appending is
//! best-effort: failures are logged and never reach the caller, so a broken
//! log cannot block a login, unlock or restore.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::error::Result;
use crate::store::write_atomic;

/// Maximum number of entries kept per user
pub const MAX_ENTRIES: usize = 100;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionLogEntry {
    pub action: String,
    pub timestamp: DateTime<Utc>,
}

/// Action log stored as one JSON file per user
pub struct ActionLog {
    log_dir: PathBuf,
    /// Serializes read-modify-write cycles
    write_lock: Mutex<()>,
}

impl ActionLog {
    /// Log rooted at `log_dir`; the directory is created on first append
    pub fn new(log_dir: impl Into<PathBuf>) -> Self {
        Self {
            log_dir: log_dir.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn log_dir(&self) -> &Path {
        &self.log_dir
    }

    /// Hex-encoded username keeps arbitrary names inside `log_dir`
    fn log_path(&self, user: &str) -> PathBuf {
        self.log_dir
            .join(format!("{}.json", hex::encode(user.as_bytes())))
    }

    /// Record `action` for `user`. Never fails.
    pub async fn append(&self, user: &str, action: &str) {
        if let Err(e) = self.try_append(user, action).await {
            warn!("Failed to record action '{}': {}", action, e);
        }
    }

    async fn try_append(&self, user: &str, action: &str) -> Result<()> {
        let _guard = self.write_lock.lock().await;

        let mut entries = match self.read_entries(user).await {
            Ok(entries) => entries,
            Err(e) => {
                warn!("Action log unreadable, starting a new one: {}", e);
                Vec::new()
            }
        };

        entries.insert(
            0,
            ActionLogEntry {
                action: action.to_string(),
                timestamp: Utc::now(),
            },
        );
        entries.truncate(MAX_ENTRIES);

        tokio::fs::create_dir_all(&self.log_dir).await?;
        let contents = serde_json::to_vec_pretty(&entries)?;
        write_atomic(&self.log_path(user), &contents).await?;

        debug!("Recorded action '{}'", action);
        Ok(())
    }

    async fn read_entries(&self, user: &str) -> Result<Vec<ActionLogEntry>> {
        let path = self.log_path(user);
        if !path.exists() {
            return Ok(Vec::new());
        }
        let contents = tokio::fs::read(&path).await?;
        Ok(serde_json::from_slice(&contents)?)
    }

    /// Entries for `user`, newest first
    pub async fn list(&self, user: &str) -> Result<Vec<ActionLogEntry>> {
        self.read_entries(user).await
    }

    /// Remove the whole log for `user`
    pub async fn clear(&self, user: &str) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let path = self.log_path(user);
        if path.exists() {
            tokio::fs::remove_file(&path).await?;
            debug!("Cleared action log");
        }
        Ok(())
    }
}
