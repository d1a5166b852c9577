//! Client side of login and registration
//!
//! The master password never leaves this module: the store receives a
//! credential derived from the password and a per-account auth salt.

use std::sync::Arc;
use tracing::{debug, info};

use crate::action_log::ActionLog;
use crate::crypto::{derive_login_credential, generate_salt, KeyDerivationParams};
use crate::error::{Result, VaultError};
use crate::store::VaultStore;

/// Minimum master password length accepted at registration
pub const MIN_PASSWORD_LEN: usize = 8;

fn validate_username(username: &str) -> Result<&str> {
    let username = username.trim();
    if username.is_empty() {
        return Err(VaultError::Validation("username must not be empty".to_string()));
    }
    Ok(username)
}

fn validate_password(password: &str, min_len: usize) -> Result<()> {
    if password.is_empty() {
        return Err(VaultError::Validation("password must not be empty".to_string()));
    }
    if password.chars().count() < min_len {
        return Err(VaultError::Validation(format!(
            "password must be at least {} characters",
            min_len
        )));
    }
    Ok(())
}

/// Registers accounts and exchanges passwords for session tokens
pub struct AuthClient {
    store: Arc<dyn VaultStore>,
    params: KeyDerivationParams,
    action_log: Option<Arc<ActionLog>>,
}

impl AuthClient {
    pub fn new(store: Arc<dyn VaultStore>, params: KeyDerivationParams) -> Self {
        Self {
            store,
            params,
            action_log: None,
        }
    }

    /// Record logins and registrations in `log`
    pub fn with_action_log(mut self, log: Arc<ActionLog>) -> Self {
        self.action_log = Some(log);
        self
    }

    async fn record(&self, username: &str, action: &str) {
        if let Some(log) = &self.action_log {
            log.append(username, action).await;
        }
    }

    /// Create an account
    ///
    /// Fails with `Validation` before touching the store, and with
    /// `Conflict` when the username is taken.
    pub async fn register(&self, username: &str, password: &str) -> Result<()> {
        let username = validate_username(username)?;
        validate_password(password, MIN_PASSWORD_LEN)?;

        let auth_salt = generate_salt();
        let credential = derive_login_credential(password, &auth_salt, Some(self.params))?;

        self.store.register(username, &auth_salt, &credential).await?;

        info!("Registered account {}", username);
        self.record(username, "register").await;
        Ok(())
    }

    /// Log in and return the session token
    ///
    /// Unknown users fail with `NotFound`, a wrong password with
    /// `Authentication`.
    pub async fn login(&self, username: &str, password: &str) -> Result<String> {
        let username = validate_username(username)?;
        validate_password(password, 1)?;

        let auth_salt = self
            .store
            .get_auth_salt(username)
            .await?
            .ok_or_else(|| VaultError::NotFound(username.to_string()))?;

        let credential = derive_login_credential(password, &auth_salt, Some(self.params))?;

        match self.store.login(username, &credential).await? {
            Some(token) => {
                info!("Logged in as {}", username);
                self.record(username, "login").await;
                Ok(token)
            }
            None => {
                debug!("Login rejected for {}", username);
                self.record(username, "login failed").await;
                Err(VaultError::Authentication)
            }
        }
    }
}
