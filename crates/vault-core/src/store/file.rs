//! File-backed store
//!
//! Layout under the storage directory:
//! - `users.json`: username -> auth salt and Argon2 hash of the login credential
//! - `<hex username>/vault.enc`: live blob
//! - `<hex username>/backups/backup_YYYYMMDD_HHMMSS.enc`: backup blobs
//!
//! Every write goes to a temp file, is synced, then renamed over the target,
//! so readers observe either the old or the new content.

use argon2::{
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use async_trait::async_trait;
use chrono::Utc;
use directories::ProjectDirs;
use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use tokio::sync::{Mutex, RwLock};
use tracing::debug;

use super::{new_token, write_atomic, VaultStore};
use crate::backup::BackupId;
use crate::error::{Result, VaultError};
use crate::vault::EncryptedBlob;

const USERS_FILE: &str = "users.json";
const VAULT_FILE: &str = "vault.enc";
const BACKUP_DIR: &str = "backups";

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UserRecord {
    auth_salt: String,
    credential_hash: String,
}

/// File format for the account registry
#[derive(Debug, Default, Serialize, Deserialize)]
struct UsersFile {
    version: u32,
    users: HashMap<String, UserRecord>,
}

/// Directory-backed store
pub struct FileVaultStore {
    /// Directory for storage files
    storage_dir: PathBuf,
    /// token -> username, valid for this process only
    sessions: RwLock<HashMap<String, String>>,
    /// Serializes read-modify-write of `users.json`
    users_lock: Mutex<()>,
}

impl FileVaultStore {
    /// Create a store in the default data directory
    pub fn new() -> Result<Self> {
        Self::with_dir(Self::default_dir()?)
    }

    /// Create with a custom storage directory
    pub fn with_dir(storage_dir: PathBuf) -> Result<Self> {
        std::fs::create_dir_all(&storage_dir)?;

        debug!("File vault store initialized at: {:?}", storage_dir);

        Ok(Self {
            storage_dir,
            sessions: RwLock::new(HashMap::new()),
            users_lock: Mutex::new(()),
        })
    }

    /// Get the default storage directory
    pub fn default_dir() -> Result<PathBuf> {
        ProjectDirs::from("org", "keyward", "keyward")
            .map(|dirs| dirs.data_dir().to_path_buf())
            .ok_or_else(|| VaultError::Storage("Could not determine data directory".to_string()))
    }

    /// Get the storage directory path
    pub fn storage_dir(&self) -> &PathBuf {
        &self.storage_dir
    }

    fn users_path(&self) -> PathBuf {
        self.storage_dir.join(USERS_FILE)
    }

    fn user_dir(&self, username: &str) -> PathBuf {
        self.storage_dir.join(hex::encode(username.as_bytes()))
    }

    async fn load_users(&self) -> Result<UsersFile> {
        let path = self.users_path();
        if !path.exists() {
            return Ok(UsersFile {
                version: 1,
                users: HashMap::new(),
            });
        }
        let contents = tokio::fs::read(&path).await?;
        Ok(serde_json::from_slice(&contents)?)
    }

    async fn user_for_token(&self, token: &str) -> Result<String> {
        self.sessions
            .read()
            .await
            .get(token)
            .cloned()
            .ok_or(VaultError::InvalidSession)
    }

    async fn vault_path(&self, token: &str) -> Result<PathBuf> {
        let username = self.user_for_token(token).await?;
        Ok(self.user_dir(&username).join(VAULT_FILE))
    }

    async fn backup_dir(&self, token: &str) -> Result<PathBuf> {
        let username = self.user_for_token(token).await?;
        Ok(self.user_dir(&username).join(BACKUP_DIR))
    }
}

fn hash_credential(credential: &str) -> Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(credential.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| VaultError::KeyDerivation(e.to_string()))
}

fn verify_credential(credential: &str, stored_hash: &str) -> Result<bool> {
    let parsed = PasswordHash::new(stored_hash)
        .map_err(|e| VaultError::Storage(format!("Invalid stored hash: {}", e)))?;
    Ok(Argon2::default()
        .verify_password(credential.as_bytes(), &parsed)
        .is_ok())
}

#[async_trait]
impl VaultStore for FileVaultStore {
    async fn get_auth_salt(&self, username: &str) -> Result<Option<String>> {
        let users = self.load_users().await?;
        Ok(users.users.get(username).map(|u| u.auth_salt.clone()))
    }

    async fn login(&self, username: &str, credential: &str) -> Result<Option<String>> {
        let users = self.load_users().await?;

        let record = match users.users.get(username) {
            Some(record) => record,
            None => return Ok(None),
        };

        if !verify_credential(credential, &record.credential_hash)? {
            debug!("Credential mismatch for {}", username);
            return Ok(None);
        }

        let token = new_token();
        self.sessions
            .write()
            .await
            .insert(token.clone(), username.to_string());
        Ok(Some(token))
    }

    async fn logout(&self, token: &str) -> Result<()> {
        if self.sessions.write().await.remove(token).is_some() {
            debug!("Revoked session token");
        }
        Ok(())
    }

    async fn register(&self, username: &str, auth_salt: &str, credential: &str) -> Result<()> {
        let _guard = self.users_lock.lock().await;
        let mut users = self.load_users().await?;

        if users.users.contains_key(username) {
            return Err(VaultError::Conflict(format!("username '{}' is taken", username)));
        }

        users.users.insert(
            username.to_string(),
            UserRecord {
                auth_salt: auth_salt.to_string(),
                credential_hash: hash_credential(credential)?,
            },
        );

        tokio::fs::create_dir_all(self.user_dir(username).join(BACKUP_DIR)).await?;
        let contents = serde_json::to_vec_pretty(&users)?;
        write_atomic(&self.users_path(), &contents).await?;

        debug!("Registered account {}", username);
        Ok(())
    }

    async fn get_vault(&self, token: &str) -> Result<Option<EncryptedBlob>> {
        let path = self.vault_path(token).await?;

        if !path.exists() {
            debug!("No vault file yet");
            return Ok(None);
        }

        let contents = tokio::fs::read(&path).await?;
        Ok(Some(EncryptedBlob::from_bytes(&contents)?))
    }

    async fn update_vault(&self, token: &str, blob: &EncryptedBlob) -> Result<()> {
        let path = self.vault_path(token).await?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        write_atomic(&path, &blob.to_bytes()?).await?;
        debug!("Saved vault to {:?}", path);
        Ok(())
    }

    async fn get_backups(&self, token: &str) -> Result<Vec<String>> {
        let dir = self.backup_dir(token).await?;
        if !dir.exists() {
            return Ok(Vec::new());
        }

        let mut names = Vec::new();
        let mut entries = tokio::fs::read_dir(&dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            if !entry.file_type().await?.is_file() {
                continue;
            }
            let name = entry.file_name().to_string_lossy().into_owned();
            if name.ends_with(".tmp") {
                continue;
            }
            names.push(name);
        }
        Ok(names)
    }

    async fn create_backup(&self, token: &str) -> Result<String> {
        let vault_path = self.vault_path(token).await?;
        let dir = self.backup_dir(token).await?;

        if !vault_path.exists() {
            return Err(VaultError::Storage("no vault to back up".to_string()));
        }

        let name = BackupId::for_time(Utc::now()).to_string();
        let target = dir.join(&name);
        if target.exists() {
            return Err(VaultError::Conflict(format!("backup {} already exists", name)));
        }

        tokio::fs::create_dir_all(&dir).await?;
        let contents = tokio::fs::read(&vault_path).await?;
        write_atomic(&target, &contents).await?;

        debug!("Created backup {}", name);
        Ok(name)
    }

    async fn restore_backup(&self, token: &str, name: &str) -> Result<()> {
        if name.contains('/') || name.contains('\\') || name.starts_with('.') {
            return Err(VaultError::Validation(format!("invalid backup name: {}", name)));
        }

        let vault_path = self.vault_path(token).await?;
        let source = self.backup_dir(token).await?.join(name);

        let contents = tokio::fs::read(&source).await?;
        // Refuse to install anything that is not a well-formed blob
        EncryptedBlob::from_bytes(&contents)?;

        write_atomic(&vault_path, &contents).await?;
        debug!("Restored backup {}", name);
        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        "File Storage"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::key_derivation::test_params;
    use crate::vault::{Vault, VaultCodec};
    use tempfile::TempDir;

    fn blob(secret: &str) -> EncryptedBlob {
        let mut vault = Vault::new();
        vault.upsert("Site", secret, Utc::now());
        VaultCodec::new(test_params())
            .encrypt(&vault, "master-pass", None)
            .unwrap()
    }

    async fn logged_in(store: &FileVaultStore) -> String {
        store.register("alice", "c2FsdHNhbHQ", "credential").await.unwrap();
        store.login("alice", "credential").await.unwrap().unwrap()
    }

    #[tokio::test]
    async fn test_register_and_login() {
        let temp_dir = TempDir::new().unwrap();
        let store = FileVaultStore::with_dir(temp_dir.path().to_path_buf()).unwrap();

        store.register("alice", "c2FsdHNhbHQ", "credential").await.unwrap();

        assert_eq!(
            store.get_auth_salt("alice").await.unwrap(),
            Some("c2FsdHNhbHQ".to_string())
        );
        assert!(store.get_auth_salt("bob").await.unwrap().is_none());
        assert!(store.login("alice", "wrong").await.unwrap().is_none());
        assert!(store.login("alice", "credential").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_register_conflict() {
        let temp_dir = TempDir::new().unwrap();
        let store = FileVaultStore::with_dir(temp_dir.path().to_path_buf()).unwrap();

        store.register("alice", "c2FsdHNhbHQ", "credential").await.unwrap();
        let result = store.register("alice", "c2FsdHNhbHQ", "other").await;

        assert!(matches!(result, Err(VaultError::Conflict(_))));
    }

    #[tokio::test]
    async fn test_users_file_holds_no_credential() {
        let temp_dir = TempDir::new().unwrap();
        let store = FileVaultStore::with_dir(temp_dir.path().to_path_buf()).unwrap();

        store.register("alice", "c2FsdHNhbHQ", "credential-value").await.unwrap();

        let users = std::fs::read_to_string(temp_dir.path().join(USERS_FILE)).unwrap();
        assert!(!users.contains("credential-value"));
        assert!(users.contains("$argon2"));
    }

    #[tokio::test]
    async fn test_logout_revokes_token() {
        let temp_dir = TempDir::new().unwrap();
        let store = FileVaultStore::with_dir(temp_dir.path().to_path_buf()).unwrap();
        let token = logged_in(&store).await;

        store.logout(&token).await.unwrap();

        assert!(matches!(
            store.get_vault(&token).await,
            Err(VaultError::InvalidSession)
        ));
        store.logout(&token).await.unwrap();
    }

    #[tokio::test]
    async fn test_unknown_token_rejected() {
        let temp_dir = TempDir::new().unwrap();
        let store = FileVaultStore::with_dir(temp_dir.path().to_path_buf()).unwrap();

        assert!(matches!(
            store.get_vault("nope").await,
            Err(VaultError::InvalidSession)
        ));
    }

    #[tokio::test]
    async fn test_vault_persists_across_instances() {
        let temp_dir = TempDir::new().unwrap();
        let saved = blob("pw1");

        {
            let store = FileVaultStore::with_dir(temp_dir.path().to_path_buf()).unwrap();
            let token = logged_in(&store).await;
            assert!(store.get_vault(&token).await.unwrap().is_none());
            store.update_vault(&token, &saved).await.unwrap();
        }

        {
            let store = FileVaultStore::with_dir(temp_dir.path().to_path_buf()).unwrap();
            let token = store.login("alice", "credential").await.unwrap().unwrap();
            assert_eq!(store.get_vault(&token).await.unwrap(), Some(saved));
        }
    }

    #[tokio::test]
    async fn test_backup_and_restore() {
        let temp_dir = TempDir::new().unwrap();
        let store = FileVaultStore::with_dir(temp_dir.path().to_path_buf()).unwrap();
        let token = logged_in(&store).await;

        let original = blob("pw1");
        store.update_vault(&token, &original).await.unwrap();
        let name = store.create_backup(&token).await.unwrap();
        assert!(BackupId::new(name.clone()).timestamp().is_some());

        store.update_vault(&token, &blob("pw2")).await.unwrap();
        store.restore_backup(&token, &name).await.unwrap();

        assert_eq!(store.get_vault(&token).await.unwrap(), Some(original));
        assert_eq!(store.get_backups(&token).await.unwrap(), vec![name]);
    }

    #[tokio::test]
    async fn test_malformed_backup_leaves_live_vault() {
        let temp_dir = TempDir::new().unwrap();
        let store = FileVaultStore::with_dir(temp_dir.path().to_path_buf()).unwrap();
        let token = logged_in(&store).await;

        let live = blob("pw1");
        store.update_vault(&token, &live).await.unwrap();

        let backups = store.backup_dir(&token).await.unwrap();
        std::fs::write(backups.join("backup_20240101_000000.enc"), b"garbage").unwrap();

        let result = store
            .restore_backup(&token, "backup_20240101_000000.enc")
            .await;
        assert!(result.is_err());
        assert_eq!(store.get_vault(&token).await.unwrap(), Some(live));
    }

    #[tokio::test]
    async fn test_restore_rejects_path_traversal() {
        let temp_dir = TempDir::new().unwrap();
        let store = FileVaultStore::with_dir(temp_dir.path().to_path_buf()).unwrap();
        let token = logged_in(&store).await;

        let result = store.restore_backup(&token, "../vault.enc").await;
        assert!(matches!(result, Err(VaultError::Validation(_))));
    }
}
