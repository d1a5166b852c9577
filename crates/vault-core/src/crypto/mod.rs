//! Cryptographic primitives for the vault
//!
//! This module provides:
//! - AES-256-GCM authenticated encryption
//! - Argon2id key derivation from passwords
//! - Secure memory handling with zeroize

mod encryption;
pub(crate) mod key_derivation;
mod secure_memory;

pub use encryption::{decrypt, encrypt, EncryptedData};
pub use key_derivation::{derive_key, derive_login_credential, generate_salt, KeyDerivationParams};
pub use secure_memory::{MasterKey, SecretString};
