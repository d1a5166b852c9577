//! Storage trait definitions

use crate::error::Result;
use crate::vault::EncryptedBlob;
use async_trait::async_trait;

/// Auth and blob storage collaborator
///
/// Implementations only ever see encrypted blobs, salts, and login
/// credentials derived on the client. Calls with an unknown token fail with
/// `VaultError::InvalidSession`.
#[async_trait]
pub trait VaultStore: Send + Sync {
    /// Auth salt for a user, `None` when the user is unknown
    async fn get_auth_salt(&self, username: &str) -> Result<Option<String>>;

    /// Exchange a derived credential for a session token, `None` on mismatch
    async fn login(&self, username: &str, credential: &str) -> Result<Option<String>>;

    /// Revoke a session token; unknown tokens are ignored
    async fn logout(&self, token: &str) -> Result<()>;

    /// Create an account; fails with `VaultError::Conflict` when taken
    async fn register(&self, username: &str, auth_salt: &str, credential: &str) -> Result<()>;

    /// Current live blob, `None` before the first save
    async fn get_vault(&self, token: &str) -> Result<Option<EncryptedBlob>>;

    /// Replace the live blob
    async fn update_vault(&self, token: &str, blob: &EncryptedBlob) -> Result<()>;

    /// Names of all backups for the token's user
    async fn get_backups(&self, token: &str) -> Result<Vec<String>>;

    /// Copy the live blob into a new `backup_YYYYMMDD_HHMMSS.enc`
    async fn create_backup(&self, token: &str) -> Result<String>;

    /// Atomically replace the live blob with a backup's content
    ///
    /// On error the previous live blob must be untouched.
    async fn restore_backup(&self, token: &str, name: &str) -> Result<()>;

    /// Get a human-readable name for this storage backend
    fn backend_name(&self) -> &'static str;
}
