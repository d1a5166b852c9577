//! Error types for vault-core

use thiserror::Error;

/// Result type alias for vault operations
pub type Result<T> = std::result::Result<T, VaultError>;

/// Vault error types
///
/// Every variant renders a message that can be shown to the user as-is.
#[derive(Error, Debug)]
pub enum VaultError {
    #[error("Invalid input: {0}")]
    Validation(String),

    #[error("Unknown user: {0}")]
    NotFound(String),

    /// Shared by login and vault decryption so both paths read the same.
    #[error("Invalid username or password")]
    Authentication,

    #[error("Already exists: {0}")]
    Conflict(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Restore failed, the current vault was kept: {0}")]
    Restore(String),

    #[error("Vault is locked - unlock with password first")]
    VaultLocked,

    #[error("Session has ended - log in again")]
    SessionClosed,

    #[error("Invalid session token")]
    InvalidSession,

    #[error("Item not found: {0}")]
    ItemNotFound(String),

    #[error("Key derivation failed: {0}")]
    KeyDerivation(String),

    #[error("Encryption failed: {0}")]
    Encryption(String),

    #[error("Malformed vault data: {0}")]
    Decode(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
