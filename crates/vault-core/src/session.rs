//! Session guard: the lock/unlock state machine around the decrypted vault
//!
//! The decrypted vault and its derived key exist only while the session is
//! `Unlocked`. Inactivity longer than the configured timeout locks the
//! session and drops both; getting them back requires the master password.
//! Every vault mutation re-encrypts and persists the whole vault under one
//! mutex before the next operation is admitted.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::{broadcast, Mutex, MutexGuard};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::action_log::ActionLog;
use crate::backup::{BackupId, BackupManager, BackupRecord, ConfirmedRestore};
use crate::crypto::{KeyDerivationParams, SecretString};
use crate::error::{Result, VaultError};
use crate::settings::{clamp_auto_lock_minutes, Settings, DEFAULT_AUTO_LOCK_MINUTES};
use crate::store::VaultStore;
use crate::vault::{DerivedKey, EncryptedBlob, ItemSummary, Vault, VaultCodec};

/// Session state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SessionState {
    /// Vault decrypted and usable
    Unlocked,
    /// Vault and key discarded; password required
    Locked,
    /// Logged out; the session cannot be used again
    Closed,
}

/// Why a session was locked
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum LockReason {
    Inactivity,
    Manual,
    /// A restored backup did not decrypt with the session password
    RestoreMismatch,
}

/// State changes observable by the UI
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum SessionEvent {
    Locked(LockReason),
    Unlocked,
    VaultChanged,
    LoggedOut,
}

/// Explicit session configuration
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Idle time before auto-lock, within [1, 60] minutes
    pub auto_lock_timeout: Duration,
    /// How often the background monitor checks for inactivity
    pub poll_interval: Duration,
    /// Key derivation params for newly created vaults
    pub kdf: KeyDerivationParams,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            auto_lock_timeout: Duration::from_secs(u64::from(DEFAULT_AUTO_LOCK_MINUTES) * 60),
            poll_interval: Duration::from_secs(5),
            kdf: KeyDerivationParams::default(),
        }
    }
}

impl SessionConfig {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            auto_lock_timeout: settings.auto_lock_timeout(),
            ..Self::default()
        }
    }

    /// Set the timeout in minutes, clamped to [1, 60]
    pub fn with_timeout_minutes(mut self, minutes: u32) -> Self {
        self.auto_lock_timeout = Duration::from_secs(u64::from(clamp_auto_lock_minutes(minutes)) * 60);
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn with_kdf(mut self, kdf: KeyDerivationParams) -> Self {
        self.kdf = kdf;
        self
    }
}

/// Material that only exists while unlocked
struct UnlockedVault {
    key: DerivedKey,
    vault: Vault,
}

struct Inner {
    state: SessionState,
    unlocked: Option<UnlockedVault>,
    failed_unlocks: u32,
}

impl Inner {
    fn unlocked(&mut self) -> Result<&mut UnlockedVault> {
        match self.state {
            SessionState::Closed => Err(VaultError::SessionClosed),
            SessionState::Locked => Err(VaultError::VaultLocked),
            SessionState::Unlocked => self.unlocked.as_mut().ok_or(VaultError::VaultLocked),
        }
    }
}

/// One authenticated session over one user's vault
pub struct SessionGuard {
    session_id: String,
    username: String,
    token: String,
    store: Arc<dyn VaultStore>,
    codec: VaultCodec,
    backups: BackupManager,
    action_log: Arc<ActionLog>,
    timeout: Duration,
    poll_interval: Duration,
    /// Monotonic reference point for `last_activity_ms`
    started: Instant,
    last_activity_ms: AtomicU64,
    inner: Mutex<Inner>,
    events: broadcast::Sender<SessionEvent>,
}

impl SessionGuard {
    /// Open the vault for a freshly logged-in user
    ///
    /// Decrypts the stored blob with `password`. When the account has no
    /// vault yet, an empty one is created and persisted under a new salt so
    /// later unlocks have something to verify against.
    pub async fn open(
        store: Arc<dyn VaultStore>,
        action_log: Arc<ActionLog>,
        config: SessionConfig,
        username: &str,
        token: String,
        password: &str,
    ) -> Result<Arc<Self>> {
        let codec = VaultCodec::new(config.kdf);

        let unlocked = match store.get_vault(&token).await? {
            Some(blob) => {
                let key = codec.derive_for_blob(&blob, password)?;
                let vault = codec.decrypt_with_key(&blob, &key)?;
                UnlockedVault { key, vault }
            }
            None => {
                info!("No vault stored yet, creating an empty one");
                let key = codec.derive(password, None)?;
                let vault = Vault::new();
                let blob = codec.encrypt_with_key(&vault, &key)?;
                store.update_vault(&token, &blob).await?;
                UnlockedVault { key, vault }
            }
        };

        let (events, _) = broadcast::channel(32);
        let guard = Arc::new(Self {
            session_id: uuid::Uuid::new_v4().to_string(),
            username: username.to_string(),
            token,
            backups: BackupManager::new(store.clone()),
            store,
            codec,
            action_log,
            timeout: config.auto_lock_timeout,
            poll_interval: config.poll_interval,
            started: Instant::now(),
            last_activity_ms: AtomicU64::new(0),
            inner: Mutex::new(Inner {
                state: SessionState::Unlocked,
                unlocked: Some(unlocked),
                failed_unlocks: 0,
            }),
            events,
        });

        info!(
            "Session {} opened for {} ({} items)",
            guard.session_id,
            guard.username,
            guard.len().await.unwrap_or(0)
        );
        Ok(guard)
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    pub fn auto_lock_timeout(&self) -> Duration {
        self.timeout
    }

    pub async fn state(&self) -> SessionState {
        self.inner.lock().await.state
    }

    /// Number of wrong passwords entered since the last successful unlock
    pub async fn failed_unlock_attempts(&self) -> u32 {
        self.inner.lock().await.failed_unlocks
    }

    /// Receive state change notifications
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    fn emit(&self, event: SessionEvent) {
        // No subscribers is fine
        let _ = self.events.send(event);
    }

    fn elapsed_ms(&self) -> u64 {
        u64::try_from(self.started.elapsed().as_millis()).unwrap_or(u64::MAX)
    }

    /// Record user activity, restarting the inactivity countdown
    pub fn touch(&self) {
        self.last_activity_ms.store(self.elapsed_ms(), Ordering::Release);
    }

    /// Time since the last recorded activity
    pub fn idle_for(&self) -> Duration {
        let last = self.last_activity_ms.load(Ordering::Acquire);
        Duration::from_millis(self.elapsed_ms().saturating_sub(last))
    }

    /// Lock if the session has been idle for the full timeout
    ///
    /// Returns whether this call locked the session.
    pub async fn check_inactivity(&self) -> bool {
        if self.idle_for() < self.timeout {
            return false;
        }

        let mut inner = self.inner.lock().await;
        if inner.state != SessionState::Unlocked {
            return false;
        }
        // Activity may have landed while waiting for the mutex
        if self.idle_for() < self.timeout {
            return false;
        }

        self.lock_inner(&mut inner, LockReason::Inactivity).await;
        true
    }

    /// Run [`check_inactivity`](Self::check_inactivity) on a background task
    ///
    /// The task holds a weak reference and ends once the session is dropped
    /// or closed. Dropping the handle stops it.
    pub fn spawn_auto_lock(self: &Arc<Self>) -> AutoLockHandle {
        let weak: Weak<Self> = Arc::downgrade(self);
        let poll_interval = self.poll_interval;

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(poll_interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let Some(guard) = weak.upgrade() else {
                    break;
                };
                if guard.state().await == SessionState::Closed {
                    break;
                }
                if guard.check_inactivity().await {
                    debug!("Auto-lock fired for session {}", guard.session_id);
                }
            }
        });

        AutoLockHandle { handle }
    }

    async fn lock_inner(&self, inner: &mut MutexGuard<'_, Inner>, reason: LockReason) {
        // Dropping the unlocked material zeroizes key, titles and secrets
        inner.unlocked = None;
        inner.state = SessionState::Locked;

        info!("Session {} locked ({:?})", self.session_id, reason);
        let action = match reason {
            LockReason::Inactivity => "auto-lock",
            LockReason::Manual => "lock",
            LockReason::RestoreMismatch => "lock after restore",
        };
        self.action_log.append(&self.username, action).await;
        self.emit(SessionEvent::Locked(reason));
    }

    /// Lock now
    pub async fn lock(&self) -> Result<()> {
        let mut inner = self.inner.lock().await;
        match inner.state {
            SessionState::Closed => Err(VaultError::SessionClosed),
            SessionState::Locked => Ok(()),
            SessionState::Unlocked => {
                self.lock_inner(&mut inner, LockReason::Manual).await;
                Ok(())
            }
        }
    }

    /// Unlock with the master password
    ///
    /// The password is verified by decrypting the stored vault. A wrong
    /// password fails with `Authentication` and the session stays locked.
    pub async fn unlock(&self, password: &str) -> Result<()> {
        let mut inner = self.inner.lock().await;
        match inner.state {
            SessionState::Closed => return Err(VaultError::SessionClosed),
            SessionState::Unlocked => {
                debug!("Session already unlocked");
                return Ok(());
            }
            SessionState::Locked => {}
        }

        let blob = self.fetch_blob().await?;
        let key = self.codec.derive_for_blob(&blob, password)?;

        match self.codec.decrypt_with_key(&blob, &key) {
            Ok(vault) => {
                inner.unlocked = Some(UnlockedVault { key, vault });
                inner.state = SessionState::Unlocked;
                inner.failed_unlocks = 0;
                drop(inner);

                self.touch();
                info!("Session {} unlocked", self.session_id);
                self.action_log.append(&self.username, "unlock").await;
                self.emit(SessionEvent::Unlocked);
                Ok(())
            }
            Err(VaultError::Authentication) => {
                inner.failed_unlocks += 1;
                warn!(
                    "Unlock rejected for session {} ({} consecutive failures)",
                    self.session_id, inner.failed_unlocks
                );
                drop(inner);

                self.action_log.append(&self.username, "unlock failed").await;
                Err(VaultError::Authentication)
            }
            Err(e) => Err(e),
        }
    }

    /// End the session from any state and revoke its store token
    pub async fn logout(&self) -> Result<()> {
        let mut inner = self.inner.lock().await;
        if inner.state == SessionState::Closed {
            return Ok(());
        }

        inner.unlocked = None;
        inner.state = SessionState::Closed;
        drop(inner);

        // Local state is already gone; a failed revoke only leaves a dead token
        if let Err(e) = self.store.logout(&self.token).await {
            warn!("Failed to revoke token for session {}: {}", self.session_id, e);
        }

        info!("Session {} closed", self.session_id);
        self.action_log.append(&self.username, "logout").await;
        self.emit(SessionEvent::LoggedOut);
        Ok(())
    }

    async fn fetch_blob(&self) -> Result<EncryptedBlob> {
        self.store
            .get_vault(&self.token)
            .await?
            .ok_or_else(|| VaultError::Storage("no vault stored for this account".to_string()))
    }

    /// Apply `change` to a copy of the vault, persist it, then commit
    ///
    /// Holding the mutex across the store write serializes mutations with
    /// each other and with restores. A failed write leaves memory unchanged.
    async fn mutate<F>(&self, change: F) -> Result<()>
    where
        F: FnOnce(&mut Vault, DateTime<Utc>) -> Result<()>,
    {
        let mut inner = self.inner.lock().await;
        let unlocked = inner.unlocked()?;
        self.touch();

        let mut next = unlocked.vault.clone();
        change(&mut next, Utc::now())?;

        let blob = self.codec.encrypt_with_key(&next, &unlocked.key)?;
        self.store.update_vault(&self.token, &blob).await?;
        unlocked.vault = next;
        drop(inner);

        self.emit(SessionEvent::VaultChanged);
        Ok(())
    }

    /// Add a new item; fails with `Conflict` when the title exists
    pub async fn add(&self, title: &str, secret: &str) -> Result<()> {
        validate_item(title, secret)?;
        self.mutate(|vault, now| {
            if vault.contains(title) {
                return Err(VaultError::Conflict(format!("an item named '{}' exists", title)));
            }
            vault.upsert(title, secret, now);
            Ok(())
        })
        .await?;
        debug!("Added item");
        Ok(())
    }

    /// Replace an existing item's secret
    pub async fn edit(&self, title: &str, secret: &str) -> Result<()> {
        validate_item(title, secret)?;
        self.mutate(|vault, now| {
            if !vault.contains(title) {
                return Err(VaultError::ItemNotFound(title.to_string()));
            }
            vault.upsert(title, secret, now);
            Ok(())
        })
        .await?;
        debug!("Edited item");
        Ok(())
    }

    pub async fn delete(&self, title: &str) -> Result<()> {
        self.mutate(|vault, _| {
            if !vault.remove(title) {
                return Err(VaultError::ItemNotFound(title.to_string()));
            }
            Ok(())
        })
        .await?;
        debug!("Deleted item");
        Ok(())
    }

    /// Copy out one secret
    pub async fn reveal(&self, title: &str) -> Result<SecretString> {
        let mut inner = self.inner.lock().await;
        let unlocked = inner.unlocked()?;
        self.touch();

        unlocked
            .vault
            .get(title)
            .map(|item| item.reveal())
            .ok_or_else(|| VaultError::ItemNotFound(title.to_string()))
    }

    /// Titles and timestamps in display order
    pub async fn titles(&self) -> Result<Vec<ItemSummary>> {
        let mut inner = self.inner.lock().await;
        let unlocked = inner.unlocked()?;
        self.touch();
        Ok(unlocked.vault.summaries())
    }

    pub async fn len(&self) -> Result<usize> {
        let mut inner = self.inner.lock().await;
        Ok(inner.unlocked()?.vault.len())
    }

    /// Snapshot the stored vault
    pub async fn create_backup(&self) -> Result<BackupId> {
        let mut inner = self.inner.lock().await;
        inner.unlocked()?;
        self.touch();

        let id = self.backups.create(&self.token).await?;
        drop(inner);

        self.action_log
            .append(&self.username, &format!("backup created {}", id))
            .await;
        Ok(id)
    }

    /// Backups for this account, newest first
    pub async fn list_backups(&self) -> Result<Vec<BackupRecord>> {
        let mut inner = self.inner.lock().await;
        inner.unlocked()?;
        self.touch();
        self.backups.list(&self.token).await
    }

    /// Replace the stored vault with a confirmed backup and reload it
    ///
    /// Runs under the mutation lock so no save can interleave. If the store
    /// rejects the restore nothing changes. If the restored blob does not
    /// decrypt with `password` the restore stands but the session locks, so
    /// stale items can never be written over it; unlocking with the
    /// backup's password recovers it.
    pub async fn restore_backup(&self, confirmed: ConfirmedRestore, password: &str) -> Result<()> {
        let mut inner = self.inner.lock().await;
        inner.unlocked()?;
        self.touch();

        let name = confirmed.backup().clone();
        self.backups.restore(&self.token, confirmed).await?;
        self.action_log
            .append(&self.username, &format!("restore {}", name))
            .await;

        let reloaded = match self.fetch_blob().await {
            Ok(blob) => self
                .codec
                .derive_for_blob(&blob, password)
                .and_then(|key| {
                    let vault = self.codec.decrypt_with_key(&blob, &key)?;
                    Ok(UnlockedVault { key, vault })
                }),
            Err(e) => Err(e),
        };

        match reloaded {
            Ok(unlocked) => {
                inner.unlocked = Some(unlocked);
                drop(inner);
                info!("Session {} reloaded from backup {}", self.session_id, name);
                self.emit(SessionEvent::VaultChanged);
                Ok(())
            }
            Err(e) => {
                warn!("Restored backup {} could not be opened: {}", name, e);
                self.lock_inner(&mut inner, LockReason::RestoreMismatch).await;
                Err(e)
            }
        }
    }
}

fn validate_item(title: &str, secret: &str) -> Result<()> {
    if title.trim().is_empty() {
        return Err(VaultError::Validation("title must not be empty".to_string()));
    }
    if secret.is_empty() {
        return Err(VaultError::Validation("secret must not be empty".to_string()));
    }
    Ok(())
}

/// Background auto-lock task; aborted on drop
pub struct AutoLockHandle {
    handle: JoinHandle<()>,
}

impl AutoLockHandle {
    /// Stop the monitor now
    pub fn stop(self) {
        self.handle.abort();
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}

impl Drop for AutoLockHandle {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backup::RestoreRequest;
    use crate::crypto::key_derivation::test_params;
    use crate::store::MemoryVaultStore;
    use tempfile::TempDir;

    const PASSWORD: &str = "correct horse";

    struct Fixture {
        store: Arc<MemoryVaultStore>,
        log: Arc<ActionLog>,
        session: Arc<SessionGuard>,
        _temp: TempDir,
    }

    async fn fixture(timeout_minutes: u32) -> Fixture {
        let temp = TempDir::new().unwrap();
        let store = Arc::new(MemoryVaultStore::new());
        let log = Arc::new(ActionLog::new(temp.path()));

        store.register("alice", "salt", "cred").await.unwrap();
        let token = store.login("alice", "cred").await.unwrap().unwrap();

        let config = SessionConfig::default()
            .with_timeout_minutes(timeout_minutes)
            .with_poll_interval(Duration::from_secs(1))
            .with_kdf(test_params());
        let session = SessionGuard::open(store.clone(), log.clone(), config, "alice", token, PASSWORD)
            .await
            .unwrap();

        Fixture {
            store,
            log,
            session,
            _temp: temp,
        }
    }

    async fn actions(log: &ActionLog) -> Vec<String> {
        log.list("alice")
            .await
            .unwrap()
            .into_iter()
            .map(|e| e.action)
            .collect()
    }

    #[tokio::test]
    async fn test_open_creates_empty_vault() {
        let f = fixture(5).await;

        assert_eq!(f.session.state().await, SessionState::Unlocked);
        assert_eq!(f.session.len().await.unwrap(), 0);
        assert!(f.store.get_vault(&f.session.token).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_open_with_wrong_password_fails() {
        let f = fixture(5).await;
        f.session.add("Bank", "pw1").await.unwrap();

        let result = SessionGuard::open(
            f.store.clone(),
            f.log.clone(),
            SessionConfig::default().with_kdf(test_params()),
            "alice",
            f.session.token.clone(),
            "battery staple",
        )
        .await;

        assert!(matches!(result, Err(VaultError::Authentication)));
    }

    #[tokio::test]
    async fn test_add_edit_delete() {
        let f = fixture(5).await;

        f.session.add("Bank", "pw1").await.unwrap();
        assert!(matches!(
            f.session.add("Bank", "again").await,
            Err(VaultError::Conflict(_))
        ));

        f.session.edit("Bank", "pw2").await.unwrap();
        assert_eq!(f.session.reveal("Bank").await.unwrap().expose(), "pw2");

        assert!(matches!(
            f.session.edit("Missing", "x").await,
            Err(VaultError::ItemNotFound(_))
        ));

        f.session.delete("Bank").await.unwrap();
        assert!(matches!(
            f.session.delete("Bank").await,
            Err(VaultError::ItemNotFound(_))
        ));
        assert_eq!(f.session.len().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_edit_refreshes_timestamp_and_persists() {
        let f = fixture(5).await;

        f.session.add("Bank", "pw1").await.unwrap();
        let before = f.session.titles().await.unwrap()[0].updated_at;
        tokio::time::sleep(Duration::from_millis(5)).await;
        f.session.edit("Bank", "pw2").await.unwrap();
        let after = f.session.titles().await.unwrap()[0].updated_at;
        assert!(after > before);

        let blob = f.store.get_vault(&f.session.token).await.unwrap().unwrap();
        let reloaded = VaultCodec::default().decrypt(&blob, PASSWORD).unwrap();
        assert_eq!(reloaded.get("Bank").unwrap().secret(), "pw2");
    }

    #[tokio::test]
    async fn test_failed_write_leaves_memory_unchanged() {
        let f = fixture(5).await;
        f.session.add("Bank", "pw1").await.unwrap();

        f.store.set_fail_writes(true);
        assert!(matches!(
            f.session.edit("Bank", "pw2").await,
            Err(VaultError::Storage(_))
        ));

        assert_eq!(f.session.reveal("Bank").await.unwrap().expose(), "pw1");
    }

    #[tokio::test]
    async fn test_validation() {
        let f = fixture(5).await;

        assert!(matches!(
            f.session.add("  ", "pw").await,
            Err(VaultError::Validation(_))
        ));
        assert!(matches!(
            f.session.add("Bank", "").await,
            Err(VaultError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn test_titles_in_display_order() {
        let f = fixture(5).await;
        for title in ["zeta", "Alpha", "beta"] {
            f.session.add(title, "x").await.unwrap();
        }

        let titles: Vec<String> = f
            .session
            .titles()
            .await
            .unwrap()
            .into_iter()
            .map(|s| s.title)
            .collect();
        assert_eq!(titles, vec!["Alpha", "beta", "zeta"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_inactivity_locks() {
        let f = fixture(1).await;
        f.session.add("Bank", "pw1").await.unwrap();
        let mut events = f.session.subscribe();

        tokio::time::advance(Duration::from_secs(59)).await;
        assert!(!f.session.check_inactivity().await);

        tokio::time::advance(Duration::from_secs(2)).await;
        assert!(f.session.check_inactivity().await);

        assert_eq!(f.session.state().await, SessionState::Locked);
        assert!(matches!(
            f.session.reveal("Bank").await,
            Err(VaultError::VaultLocked)
        ));
        assert_eq!(
            events.recv().await.unwrap(),
            SessionEvent::Locked(LockReason::Inactivity)
        );
        assert_eq!(actions(&f.log).await[0], "auto-lock");
    }

    #[tokio::test(start_paused = true)]
    async fn test_activity_resets_countdown() {
        let f = fixture(1).await;

        tokio::time::advance(Duration::from_secs(50)).await;
        f.session.touch();
        tokio::time::advance(Duration::from_secs(50)).await;

        assert!(!f.session.check_inactivity().await);
        assert_eq!(f.session.state().await, SessionState::Unlocked);
    }

    #[tokio::test(start_paused = true)]
    async fn test_background_monitor_locks() {
        let f = fixture(1).await;
        let _monitor = f.session.spawn_auto_lock();

        tokio::time::sleep(Duration::from_secs(30)).await;
        f.session.titles().await.unwrap();
        tokio::time::sleep(Duration::from_secs(45)).await;
        assert_eq!(f.session.state().await, SessionState::Unlocked);

        tokio::time::sleep(Duration::from_secs(20)).await;
        assert_eq!(f.session.state().await, SessionState::Locked);
    }

    #[tokio::test]
    async fn test_monitor_stops_when_session_dropped() {
        let f = fixture(1).await;
        let monitor = f.session.spawn_auto_lock();
        let Fixture { session, .. } = f;
        drop(session);

        for _ in 0..50 {
            if monitor.is_finished() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
        assert!(monitor.is_finished());
    }

    #[tokio::test(start_paused = true)]
    async fn test_stopped_monitor_never_locks() {
        let f = fixture(1).await;
        let monitor = f.session.spawn_auto_lock();
        monitor.stop();

        tokio::time::sleep(Duration::from_secs(120)).await;
        assert_eq!(f.session.state().await, SessionState::Unlocked);
    }

    #[tokio::test]
    async fn test_unlock_rejects_oversized_kdf_params() {
        let f = fixture(5).await;
        let mut blob = f.store.get_vault(&f.session.token).await.unwrap().unwrap();
        blob.kdf.memory_cost = u32::MAX;
        f.store.update_vault(&f.session.token, &blob).await.unwrap();
        f.session.lock().await.unwrap();

        assert!(matches!(
            f.session.unlock(PASSWORD).await,
            Err(VaultError::Decode(_))
        ));
        assert_eq!(f.session.state().await, SessionState::Locked);
    }

    #[tokio::test]
    async fn test_unlock_restores_exact_items() {
        let f = fixture(5).await;
        f.session.add("Bank", "pw1").await.unwrap();
        f.session.add("mail", "pw2").await.unwrap();
        let before = f.session.titles().await.unwrap();

        f.session.lock().await.unwrap();
        assert!(matches!(f.session.titles().await, Err(VaultError::VaultLocked)));

        f.session.unlock(PASSWORD).await.unwrap();
        assert_eq!(f.session.titles().await.unwrap(), before);
        assert_eq!(f.session.reveal("Bank").await.unwrap().expose(), "pw1");
        assert_eq!(f.session.reveal("mail").await.unwrap().expose(), "pw2");
    }

    #[tokio::test]
    async fn test_wrong_password_stays_locked() {
        let f = fixture(5).await;
        f.session.lock().await.unwrap();

        let result = f.session.unlock("battery staple").await;

        assert!(matches!(result, Err(VaultError::Authentication)));
        assert_eq!(f.session.state().await, SessionState::Locked);
        assert_eq!(f.session.failed_unlock_attempts().await, 1);
        assert_eq!(actions(&f.log).await[0], "unlock failed");

        f.session.unlock(PASSWORD).await.unwrap();
        assert_eq!(f.session.failed_unlock_attempts().await, 0);
    }

    #[tokio::test]
    async fn test_logout_is_terminal() {
        let f = fixture(5).await;
        let mut events = f.session.subscribe();

        f.session.logout().await.unwrap();

        assert_eq!(f.session.state().await, SessionState::Closed);
        assert_eq!(events.recv().await.unwrap(), SessionEvent::LoggedOut);
        assert!(matches!(
            f.session.unlock(PASSWORD).await,
            Err(VaultError::SessionClosed)
        ));
        assert!(matches!(
            f.session.add("Bank", "pw").await,
            Err(VaultError::SessionClosed)
        ));
        assert!(matches!(
            f.store.get_vault(&f.session.token).await,
            Err(VaultError::InvalidSession)
        ));
    }

    #[tokio::test]
    async fn test_restore_reloads_items() {
        let f = fixture(5).await;
        f.session.add("Bank", "pw1").await.unwrap();
        let id = f.session.create_backup().await.unwrap();
        f.session.edit("Bank", "pw2").await.unwrap();

        let confirmed = RestoreRequest::new(id).confirm();
        f.session.restore_backup(confirmed, PASSWORD).await.unwrap();

        assert_eq!(f.session.reveal("Bank").await.unwrap().expose(), "pw1");
        assert_eq!(f.session.state().await, SessionState::Unlocked);
    }

    #[tokio::test]
    async fn test_restore_under_other_password_locks() {
        let f = fixture(5).await;

        let mut other = Vault::new();
        other.upsert("Old", "secret", Utc::now());
        let foreign = VaultCodec::new(test_params())
            .encrypt(&other, "another password", None)
            .unwrap();
        f.store
            .insert_backup("alice", "backup_20240101_000000.enc", foreign)
            .await
            .unwrap();

        let confirmed = RestoreRequest::new(BackupId::new("backup_20240101_000000.enc")).confirm();
        let result = f.session.restore_backup(confirmed, PASSWORD).await;

        assert!(matches!(result, Err(VaultError::Authentication)));
        assert_eq!(f.session.state().await, SessionState::Locked);

        f.session.unlock("another password").await.unwrap();
        assert_eq!(f.session.reveal("Old").await.unwrap().expose(), "secret");
    }

    #[tokio::test]
    async fn test_failed_restore_keeps_session() {
        let f = fixture(5).await;
        f.session.add("Bank", "pw1").await.unwrap();
        let id = f.session.create_backup().await.unwrap();
        f.session.edit("Bank", "pw2").await.unwrap();
        let live = f.store.get_vault(&f.session.token).await.unwrap();

        f.store.set_fail_writes(true);
        let result = f
            .session
            .restore_backup(RestoreRequest::new(id).confirm(), PASSWORD)
            .await;

        assert!(matches!(result, Err(VaultError::Restore(_))));
        assert_eq!(f.store.get_vault(&f.session.token).await.unwrap(), live);
        assert_eq!(f.session.reveal("Bank").await.unwrap().expose(), "pw2");
    }

    #[tokio::test]
    async fn test_concurrent_mutations_are_serialized() {
        let f = fixture(5).await;

        let mut tasks = Vec::new();
        for i in 0..8 {
            let session = f.session.clone();
            tasks.push(tokio::spawn(async move {
                session.add(&format!("item-{}", i), "pw").await
            }));
        }
        for task in tasks {
            task.await.unwrap().unwrap();
        }

        let blob = f.store.get_vault(&f.session.token).await.unwrap().unwrap();
        let stored = VaultCodec::default().decrypt(&blob, PASSWORD).unwrap();
        assert_eq!(stored.len(), 8);
    }
}
