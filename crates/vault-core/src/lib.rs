//! # vault-core
//!
//! Security engine for the Keyward password manager:
//! - Argon2id key derivation and AES-256-GCM vault blobs
//! - Session guard with inactivity auto-lock and zeroize-on-drop secrets
//! - Clipboard exposure window
//! - Backup and confirmed restore against a pluggable vault store
//! - Per-user action log

pub mod action_log;
pub mod auth;
pub mod backup;
pub mod clipboard;
pub mod crypto;
pub mod error;
pub mod session;
pub mod settings;
pub mod store;
pub mod vault;

pub use action_log::{ActionLog, ActionLogEntry};
pub use auth::AuthClient;
pub use backup::{BackupId, BackupManager, BackupRecord, ConfirmedRestore, RestoreRequest};
pub use clipboard::{Clipboard, ClipboardGuard, MemoryClipboard};
pub use crypto::{KeyDerivationParams, MasterKey, SecretString};
pub use error::{Result, VaultError};
pub use session::{AutoLockHandle, LockReason, SessionConfig, SessionEvent, SessionGuard, SessionState};
pub use settings::{Settings, SettingsManager};
pub use store::{FileVaultStore, MemoryVaultStore, VaultStore};
pub use vault::{EncryptedBlob, ItemSummary, Vault, VaultCodec, VaultItem};
