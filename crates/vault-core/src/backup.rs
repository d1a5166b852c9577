//! Backup snapshots of the encrypted vault
//!
//! Backups are named `backup_YYYYMMDD_HHMMSS.enc` (UTC), so creation order can
//! be recovered from the name alone. Restoring is destructive and therefore
//! gated by an explicit confirmation value, see [`RestoreRequest`].

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::Serialize;
use std::cmp::Ordering;
use std::fmt;
use std::sync::Arc;
use tracing::{info, warn};

use crate::error::{Result, VaultError};
use crate::store::VaultStore;

const PREFIX: &str = "backup_";
const SUFFIX: &str = ".enc";
const STAMP_FORMAT: &str = "%Y%m%d_%H%M%S";

/// Name of a backup as known to the store
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct BackupId(String);

impl BackupId {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// Name for a backup taken at `at`
    pub fn for_time(at: DateTime<Utc>) -> Self {
        Self(format!("{}{}{}", PREFIX, at.format(STAMP_FORMAT), SUFFIX))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Timestamp embedded in the name, `None` for non-conforming names
    pub fn timestamp(&self) -> Option<DateTime<Utc>> {
        let stamp = self.0.strip_prefix(PREFIX)?.strip_suffix(SUFFIX)?;
        if stamp.len() != 15 {
            return None;
        }
        NaiveDateTime::parse_from_str(stamp, STAMP_FORMAT)
            .ok()
            .map(|naive| naive.and_utc())
    }
}

impl fmt::Display for BackupId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A listed backup
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BackupRecord {
    pub id: BackupId,
    pub created_at: Option<DateTime<Utc>>,
}

impl BackupRecord {
    fn from_name(name: String) -> Self {
        let id = BackupId::new(name);
        let created_at = id.timestamp();
        Self { id, created_at }
    }
}

/// Newest first; undated records after all dated ones, by name
fn listing_order(a: &BackupRecord, b: &BackupRecord) -> Ordering {
    match (a.created_at, b.created_at) {
        (Some(x), Some(y)) => y.cmp(&x).then_with(|| a.id.0.cmp(&b.id.0)),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => a.id.0.cmp(&b.id.0),
    }
}

/// A restore that has not been confirmed yet
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RestoreRequest {
    backup: BackupId,
}

impl RestoreRequest {
    pub fn new(backup: BackupId) -> Self {
        Self { backup }
    }

    pub fn backup(&self) -> &BackupId {
        &self.backup
    }

    /// Record the user's affirmative answer
    pub fn confirm(self) -> ConfirmedRestore {
        ConfirmedRestore {
            backup: self.backup,
        }
    }
}

/// Proof that the user confirmed replacing the live vault
///
/// Only obtainable through [`RestoreRequest::confirm`].
#[derive(Debug)]
pub struct ConfirmedRestore {
    backup: BackupId,
}

impl ConfirmedRestore {
    pub fn backup(&self) -> &BackupId {
        &self.backup
    }
}

/// Creates, lists and restores backups through the store
#[derive(Clone)]
pub struct BackupManager {
    store: Arc<dyn VaultStore>,
}

impl BackupManager {
    pub fn new(store: Arc<dyn VaultStore>) -> Self {
        Self { store }
    }

    /// Snapshot the live blob. The live blob is not modified.
    pub async fn create(&self, token: &str) -> Result<BackupId> {
        let name = self.store.create_backup(token).await?;
        info!("Created backup {}", name);
        Ok(BackupId::new(name))
    }

    /// All backups, newest first
    pub async fn list(&self, token: &str) -> Result<Vec<BackupRecord>> {
        let mut records: Vec<BackupRecord> = self
            .store
            .get_backups(token)
            .await?
            .into_iter()
            .map(BackupRecord::from_name)
            .collect();
        records.sort_by(listing_order);
        Ok(records)
    }

    /// Start a restore; the caller must obtain confirmation before using it
    pub fn request_restore(&self, backup: BackupId) -> RestoreRequest {
        RestoreRequest::new(backup)
    }

    /// Replace the live blob with the confirmed backup
    ///
    /// Any failure is reported as [`VaultError::Restore`] and leaves the live
    /// blob as it was. Decrypting the restored blob is up to the caller; a
    /// backup taken under another password decrypts with that password only.
    pub async fn restore(&self, token: &str, confirmed: ConfirmedRestore) -> Result<()> {
        let name = confirmed.backup.as_str();

        let known = self
            .store
            .get_backups(token)
            .await
            .map_err(restore_error)?;
        if !known.iter().any(|n| n == name) {
            return Err(VaultError::Restore(format!("backup {} not found", name)));
        }

        if let Err(e) = self.store.restore_backup(token, name).await {
            warn!("Restore of {} failed: {}", name, e);
            return Err(restore_error(e));
        }

        info!("Restored backup {}", name);
        Ok(())
    }
}

fn restore_error(e: VaultError) -> VaultError {
    match e {
        VaultError::InvalidSession | VaultError::Restore(_) => e,
        other => VaultError::Restore(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::key_derivation::test_params;
    use crate::store::MemoryVaultStore;
    use crate::vault::{EncryptedBlob, Vault, VaultCodec};
    use chrono::TimeZone;

    fn blob(secret: &str) -> EncryptedBlob {
        let mut vault = Vault::new();
        vault.upsert("Site", secret, Utc::now());
        VaultCodec::new(test_params())
            .encrypt(&vault, "master-pass", None)
            .unwrap()
    }

    async fn store_with_user() -> (Arc<MemoryVaultStore>, String) {
        let store = Arc::new(MemoryVaultStore::new());
        store.register("alice", "salt", "cred").await.unwrap();
        let token = store.login("alice", "cred").await.unwrap().unwrap();
        (store, token)
    }

    #[test]
    fn test_name_format() {
        let at = Utc.with_ymd_and_hms(2024, 3, 9, 7, 5, 1).unwrap();
        let id = BackupId::for_time(at);

        assert_eq!(id.as_str(), "backup_20240309_070501.enc");
        assert_eq!(id.timestamp(), Some(at));
    }

    #[test]
    fn test_non_conforming_names_have_no_timestamp() {
        for name in [
            "backup_2024_070501.enc",
            "backup_20240309_070501.bak",
            "snapshot_20240309_070501.enc",
            "backup_20241309_070501.enc",
            "backup_20240309_0705011.enc",
        ] {
            assert!(BackupId::new(name).timestamp().is_none(), "{}", name);
        }
    }

    #[tokio::test]
    async fn test_list_orders_newest_first_then_undated() {
        let (store, token) = store_with_user().await;
        for name in [
            "backup_20240101_120000.enc",
            "manual-copy.enc",
            "backup_20240301_080000.enc",
            "backup_20231231_235959.enc",
            "another.enc",
        ] {
            store.insert_backup("alice", name, blob("x")).await.unwrap();
        }

        let manager = BackupManager::new(store);
        let names: Vec<String> = manager
            .list(&token)
            .await
            .unwrap()
            .into_iter()
            .map(|r| r.id.to_string())
            .collect();

        assert_eq!(
            names,
            vec![
                "backup_20240301_080000.enc",
                "backup_20240101_120000.enc",
                "backup_20231231_235959.enc",
                "another.enc",
                "manual-copy.enc",
            ]
        );
    }

    #[tokio::test]
    async fn test_create_does_not_touch_live_blob() {
        let (store, token) = store_with_user().await;
        let live = blob("pw1");
        store.update_vault(&token, &live).await.unwrap();

        let manager = BackupManager::new(store.clone());
        let id = manager.create(&token).await.unwrap();

        assert!(id.timestamp().is_some());
        assert_eq!(store.get_vault(&token).await.unwrap(), Some(live));
    }

    #[tokio::test]
    async fn test_restore_replaces_live_blob() {
        let (store, token) = store_with_user().await;
        let old = blob("old");
        store.insert_backup("alice", "backup_20240101_000000.enc", old.clone()).await.unwrap();
        store.update_vault(&token, &blob("new")).await.unwrap();

        let manager = BackupManager::new(store.clone());
        let confirmed = manager
            .request_restore(BackupId::new("backup_20240101_000000.enc"))
            .confirm();
        manager.restore(&token, confirmed).await.unwrap();

        assert_eq!(store.get_vault(&token).await.unwrap(), Some(old));
    }

    #[tokio::test]
    async fn test_failed_restore_keeps_live_blob() {
        let (store, token) = store_with_user().await;
        let live = blob("live");
        store.insert_backup("alice", "backup_20240101_000000.enc", blob("old")).await.unwrap();
        store.update_vault(&token, &live).await.unwrap();
        store.set_fail_writes(true);

        let manager = BackupManager::new(store.clone());
        let confirmed = manager
            .request_restore(BackupId::new("backup_20240101_000000.enc"))
            .confirm();
        let result = manager.restore(&token, confirmed).await;

        assert!(matches!(result, Err(VaultError::Restore(_))));
        assert_eq!(store.get_vault(&token).await.unwrap(), Some(live));
    }

    #[tokio::test]
    async fn test_restore_unknown_backup() {
        let (store, token) = store_with_user().await;
        let manager = BackupManager::new(store);

        let confirmed = manager
            .request_restore(BackupId::new("backup_20990101_000000.enc"))
            .confirm();
        let result = manager.restore(&token, confirmed).await;

        assert!(matches!(result, Err(VaultError::Restore(_))));
    }
}
