//! Password-based key derivation using Argon2id

use argon2::{
    password_hash::SaltString,
    Algorithm, Argon2, Params, Version,
};
use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};
use zeroize::Zeroizing;

use super::MasterKey;
use crate::error::{Result, VaultError};

/// Parameters for Argon2id key derivation
///
/// Recorded alongside every encrypted blob so the blob stays decryptable
/// after the configured defaults change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KeyDerivationParams {
    /// Memory cost in KiB (default: 65536 = 64MB)
    pub memory_cost: u32,
    /// Time cost / iterations (default: 3)
    pub time_cost: u32,
    /// Parallelism (default: 4)
    pub parallelism: u32,
}

impl Default for KeyDerivationParams {
    fn default() -> Self {
        Self {
            memory_cost: 65536, // 64 MB
            time_cost: 3,
            parallelism: 4,
        }
    }
}

/// Upper bounds accepted for params read back from a stored blob
pub const MAX_MEMORY_COST_KIB: u32 = 1024 * 1024; // 1 GiB
pub const MAX_TIME_COST: u32 = 10;
pub const MAX_PARALLELISM: u32 = 16;

impl KeyDerivationParams {
    /// Reject params that would make Argon2 allocate or spin without bound
    ///
    /// Blobs come back from an untrusted store, so their recorded params are
    /// checked before any derivation runs.
    pub fn check_bounds(&self) -> Result<()> {
        if self.memory_cost > MAX_MEMORY_COST_KIB {
            return Err(VaultError::KeyDerivation(format!(
                "memory cost {} KiB exceeds {} KiB",
                self.memory_cost, MAX_MEMORY_COST_KIB
            )));
        }
        if self.time_cost == 0 || self.time_cost > MAX_TIME_COST {
            return Err(VaultError::KeyDerivation(format!(
                "time cost {} outside 1..={}",
                self.time_cost, MAX_TIME_COST
            )));
        }
        if self.parallelism == 0 || self.parallelism > MAX_PARALLELISM {
            return Err(VaultError::KeyDerivation(format!(
                "parallelism {} outside 1..={}",
                self.parallelism, MAX_PARALLELISM
            )));
        }
        Ok(())
    }
}

/// Generate a cryptographically secure random salt
pub fn generate_salt() -> String {
    SaltString::generate(&mut OsRng).to_string()
}

/// Derive a 256-bit key from `password` and a b64 `salt` with Argon2id
///
/// `params` defaults to [`KeyDerivationParams::default`] and is bounds
/// checked first.
pub fn derive_key(
    password: &str,
    salt: &str,
    params: Option<KeyDerivationParams>,
) -> Result<MasterKey> {
    let params = params.unwrap_or_default();
    params.check_bounds()?;

    let salt = SaltString::from_b64(salt)
        .map_err(|e| VaultError::KeyDerivation(format!("Invalid salt: {}", e)))?;

    let argon2_params = Params::new(params.memory_cost, params.time_cost, params.parallelism, Some(32))
        .map_err(|e| VaultError::KeyDerivation(e.to_string()))?;
    let argon2 = Argon2::new(Algorithm::Argon2id, Version::V0x13, argon2_params);

    let mut key_bytes = Zeroizing::new([0u8; 32]);
    argon2
        .hash_password_into(password.as_bytes(), salt.as_str().as_bytes(), &mut *key_bytes)
        .map_err(|e| VaultError::KeyDerivation(e.to_string()))?;

    Ok(MasterKey::new(*key_bytes))
}

/// Derive the credential presented to the store at login.
///
/// Uses the account's auth salt, which is generated independently of any
/// vault salt, so the credential never equals a vault key. Hex encoded.
pub fn derive_login_credential(
    password: &str,
    auth_salt: &str,
    params: Option<KeyDerivationParams>,
) -> Result<Zeroizing<String>> {
    let key = derive_key(password, auth_salt, params)?;
    Ok(Zeroizing::new(hex::encode(key.as_bytes())))
}

#[cfg(test)]
pub(crate) fn test_params() -> KeyDerivationParams {
    KeyDerivationParams {
        memory_cost: 8192, // 8 MB (faster for testing)
        time_cost: 1,
        parallelism: 1,
    }
}
