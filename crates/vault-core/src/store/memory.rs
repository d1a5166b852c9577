//! In-memory store
//!
//! Holds everything in process memory. Supports failure injection so callers
//! can exercise the error paths of saves and restores.

use async_trait::async_trait;
use chrono::Utc;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::RwLock;
use tracing::debug;

use super::{new_token, VaultStore};
use crate::backup::BackupId;
use crate::error::{Result, VaultError};
use crate::vault::EncryptedBlob;

struct Account {
    auth_salt: String,
    credential: String,
    vault: Option<EncryptedBlob>,
    backups: BTreeMap<String, EncryptedBlob>,
}

#[derive(Default)]
struct State {
    accounts: HashMap<String, Account>,
    /// token -> username
    sessions: HashMap<String, String>,
}

impl State {
    fn account_mut(&mut self, token: &str) -> Result<&mut Account> {
        let username = self
            .sessions
            .get(token)
            .ok_or(VaultError::InvalidSession)?;
        self.accounts
            .get_mut(username)
            .ok_or(VaultError::InvalidSession)
    }
}

/// Store backed by process memory
#[derive(Default)]
pub struct MemoryVaultStore {
    state: RwLock<State>,
    fail_writes: AtomicBool,
}

impl MemoryVaultStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every following vault write and restore fail until reset
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Seed a backup under an explicit name for `username`
    pub async fn insert_backup(
        &self,
        username: &str,
        name: &str,
        blob: EncryptedBlob,
    ) -> Result<()> {
        let mut state = self.state.write().await;
        let account = state
            .accounts
            .get_mut(username)
            .ok_or_else(|| VaultError::NotFound(username.to_string()))?;
        account.backups.insert(name.to_string(), blob);
        Ok(())
    }

    fn check_writable(&self) -> Result<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(VaultError::Storage("simulated write failure".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl VaultStore for MemoryVaultStore {
    async fn get_auth_salt(&self, username: &str) -> Result<Option<String>> {
        let state = self.state.read().await;
        Ok(state.accounts.get(username).map(|a| a.auth_salt.clone()))
    }

    async fn login(&self, username: &str, credential: &str) -> Result<Option<String>> {
        let mut state = self.state.write().await;

        let matches = state
            .accounts
            .get(username)
            .map(|a| a.credential == credential)
            .unwrap_or(false);
        if !matches {
            return Ok(None);
        }

        let token = new_token();
        state.sessions.insert(token.clone(), username.to_string());
        debug!("Issued session token for {}", username);
        Ok(Some(token))
    }

    async fn logout(&self, token: &str) -> Result<()> {
        if self.state.write().await.sessions.remove(token).is_some() {
            debug!("Revoked session token");
        }
        Ok(())
    }

    async fn register(&self, username: &str, auth_salt: &str, credential: &str) -> Result<()> {
        let mut state = self.state.write().await;

        if state.accounts.contains_key(username) {
            return Err(VaultError::Conflict(format!("username '{}' is taken", username)));
        }

        state.accounts.insert(
            username.to_string(),
            Account {
                auth_salt: auth_salt.to_string(),
                credential: credential.to_string(),
                vault: None,
                backups: BTreeMap::new(),
            },
        );
        Ok(())
    }

    async fn get_vault(&self, token: &str) -> Result<Option<EncryptedBlob>> {
        let mut state = self.state.write().await;
        Ok(state.account_mut(token)?.vault.clone())
    }

    async fn update_vault(&self, token: &str, blob: &EncryptedBlob) -> Result<()> {
        let mut state = self.state.write().await;
        let account = state.account_mut(token)?;
        self.check_writable()?;
        account.vault = Some(blob.clone());
        Ok(())
    }

    async fn get_backups(&self, token: &str) -> Result<Vec<String>> {
        let mut state = self.state.write().await;
        Ok(state.account_mut(token)?.backups.keys().cloned().collect())
    }

    async fn create_backup(&self, token: &str) -> Result<String> {
        let mut state = self.state.write().await;
        let account = state.account_mut(token)?;

        let live = account
            .vault
            .clone()
            .ok_or_else(|| VaultError::Storage("no vault to back up".to_string()))?;

        let name = BackupId::for_time(Utc::now()).to_string();
        if account.backups.contains_key(&name) {
            return Err(VaultError::Conflict(format!("backup {} already exists", name)));
        }

        account.backups.insert(name.clone(), live);
        Ok(name)
    }

    async fn restore_backup(&self, token: &str, name: &str) -> Result<()> {
        let mut state = self.state.write().await;
        let account = state.account_mut(token)?;

        let backup = account
            .backups
            .get(name)
            .cloned()
            .ok_or_else(|| VaultError::Storage(format!("backup {} not found", name)))?;

        self.check_writable()?;
        account.vault = Some(backup);
        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        "In-Memory Storage"
    }
}
