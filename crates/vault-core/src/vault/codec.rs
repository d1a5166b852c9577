//! Vault codec: item mapping <-> encrypted blob
//!
//! Plaintext layout: a JSON object keyed by title (sorted), each value
//! `{"secret": ..., "updatedAt": ...}`. Older vaults stored the bare secret
//! string as the value; those are normalized on decode and only rewritten by
//! the next mutation.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use tracing::debug;
use zeroize::Zeroizing;

use super::item::{Vault, VaultItem};
use crate::crypto::{
    decrypt, derive_key, encrypt, generate_salt, EncryptedData, KeyDerivationParams, MasterKey,
};
use crate::error::{Result, VaultError};

/// Current blob format version
pub const BLOB_VERSION: u32 = 1;

/// Opaque encrypted vault snapshot, safe to hand to any store
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EncryptedBlob {
    pub version: u32,
    pub kdf: KeyDerivationParams,
    pub salt: String,
    /// Hex encoded 12-byte IV
    pub iv: String,
    /// Hex encoded 16-byte GCM tag
    pub auth_tag: String,
    /// Hex encoded ciphertext
    pub ciphertext: String,
}

impl EncryptedBlob {
    /// Serialize to the JSON wire form
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec_pretty(self)?)
    }

    /// Parse the JSON wire form
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let blob: Self = serde_json::from_slice(bytes)
            .map_err(|e| VaultError::Decode(format!("Invalid blob: {}", e)))?;
        blob.check_header()?;
        Ok(blob)
    }

    /// Version and KDF params must be ones this build can safely open
    fn check_header(&self) -> Result<()> {
        if self.version != BLOB_VERSION {
            return Err(VaultError::Decode(format!(
                "Unsupported blob version: {}",
                self.version
            )));
        }
        self.kdf
            .check_bounds()
            .map_err(|e| VaultError::Decode(format!("Unacceptable KDF params: {}", e)))
    }

    /// Header fields bound into the AEAD tag
    fn associated_data(&self) -> Vec<u8> {
        header_aad(self.version, &self.salt, &self.kdf)
    }

    fn sealed(&self) -> Result<EncryptedData> {
        let iv_bytes = hex::decode(&self.iv)
            .map_err(|e| VaultError::Decode(format!("Invalid IV hex: {}", e)))?;
        let tag_bytes = hex::decode(&self.auth_tag)
            .map_err(|e| VaultError::Decode(format!("Invalid auth tag hex: {}", e)))?;
        let ciphertext = hex::decode(&self.ciphertext)
            .map_err(|e| VaultError::Decode(format!("Invalid ciphertext hex: {}", e)))?;

        let iv: [u8; 12] = iv_bytes.as_slice().try_into().map_err(|_| {
            VaultError::Decode(format!("Invalid IV length: expected 12, got {}", iv_bytes.len()))
        })?;
        let auth_tag: [u8; 16] = tag_bytes.as_slice().try_into().map_err(|_| {
            VaultError::Decode(format!(
                "Invalid auth tag length: expected 16, got {}",
                tag_bytes.len()
            ))
        })?;

        Ok(EncryptedData {
            iv,
            auth_tag,
            ciphertext,
        })
    }
}

fn header_aad(version: u32, salt: &str, kdf: &KeyDerivationParams) -> Vec<u8> {
    format!(
        "vault-blob:v{}:{}:m{}:t{}:p{}",
        version, salt, kdf.memory_cost, kdf.time_cost, kdf.parallelism
    )
    .into_bytes()
}

/// A vault key together with the salt and params that produced it
#[derive(Debug)]
pub struct DerivedKey {
    key: MasterKey,
    salt: String,
    kdf: KeyDerivationParams,
}

impl DerivedKey {
    pub fn salt(&self) -> &str {
        &self.salt
    }
}

/// Decoded value: either the structured item or a legacy bare secret
#[derive(Deserialize)]
#[serde(untagged)]
enum StoredValue {
    Item(VaultItem),
    Legacy(String),
}

/// Encrypts and decrypts whole vaults
#[derive(Debug, Clone, Default)]
pub struct VaultCodec {
    params: KeyDerivationParams,
}

impl VaultCodec {
    /// Codec deriving new keys with `params`
    pub fn new(params: KeyDerivationParams) -> Self {
        Self { params }
    }

    pub fn params(&self) -> KeyDerivationParams {
        self.params
    }

    /// Derive a key for `password`, generating a salt when none is given
    pub fn derive(&self, password: &str, salt: Option<&str>) -> Result<DerivedKey> {
        let salt = match salt {
            Some(salt) => salt.to_string(),
            None => generate_salt(),
        };
        let key = derive_key(password, &salt, Some(self.params))?;
        Ok(DerivedKey {
            key,
            salt,
            kdf: self.params,
        })
    }

    /// Derive the key a blob was sealed under, using the blob's own salt and params
    pub fn derive_for_blob(&self, blob: &EncryptedBlob, password: &str) -> Result<DerivedKey> {
        blob.check_header()?;
        let key = derive_key(password, &blob.salt, Some(blob.kdf))?;
        Ok(DerivedKey {
            key,
            salt: blob.salt.clone(),
            kdf: blob.kdf,
        })
    }

    /// Encrypt `vault` under `password`
    ///
    /// Reuses `existing_salt` when the vault already has a record so the same
    /// password keeps deriving the same key.
    pub fn encrypt(
        &self,
        vault: &Vault,
        password: &str,
        existing_salt: Option<&str>,
    ) -> Result<EncryptedBlob> {
        let key = self.derive(password, existing_salt)?;
        self.encrypt_with_key(vault, &key)
    }

    /// Encrypt `vault` with an already derived key
    pub fn encrypt_with_key(&self, vault: &Vault, key: &DerivedKey) -> Result<EncryptedBlob> {
        let plaintext = encode_items(vault)?;
        let aad = header_aad(BLOB_VERSION, &key.salt, &key.kdf);

        let sealed = encrypt(&plaintext, &aad, &key.key)?;

        debug!("Encrypted vault with {} items", vault.len());
        Ok(EncryptedBlob {
            version: BLOB_VERSION,
            kdf: key.kdf,
            salt: key.salt.clone(),
            iv: hex::encode(sealed.iv),
            auth_tag: hex::encode(sealed.auth_tag),
            ciphertext: hex::encode(&sealed.ciphertext),
        })
    }

    /// Decrypt `blob` with `password`
    ///
    /// A wrong password fails with [`VaultError::Authentication`]; this is
    /// how passwords are verified.
    pub fn decrypt(&self, blob: &EncryptedBlob, password: &str) -> Result<Vault> {
        let key = self.derive_for_blob(blob, password)?;
        self.decrypt_with_key(blob, &key)
    }

    /// Decrypt `blob` with an already derived key
    pub fn decrypt_with_key(&self, blob: &EncryptedBlob, key: &DerivedKey) -> Result<Vault> {
        blob.check_header()?;

        let sealed = blob.sealed()?;
        let plaintext = Zeroizing::new(decrypt(&sealed, &blob.associated_data(), &key.key)?);

        decode_items(&plaintext)
    }
}

/// Canonical plaintext: keys sorted, structured values
fn encode_items(vault: &Vault) -> Result<Zeroizing<Vec<u8>>> {
    let canonical: BTreeMap<&str, &VaultItem> =
        vault.iter().map(|(title, item)| (title.as_str(), item)).collect();
    Ok(Zeroizing::new(serde_json::to_vec(&canonical)?))
}

/// Parse plaintext, normalizing legacy entries to `updatedAt = now`
fn decode_items(plaintext: &[u8]) -> Result<Vault> {
    let decoded: HashMap<String, StoredValue> = serde_json::from_slice(plaintext)
        .map_err(|e| VaultError::Decode(format!("Invalid vault contents: {}", e)))?;

    let now = Utc::now();
    let mut vault = Vault::new();
    let mut legacy = 0usize;

    for (title, value) in decoded {
        let item = match value {
            StoredValue::Item(item) => item,
            StoredValue::Legacy(mut secret) => {
                legacy += 1;
                let item = VaultItem::new(secret.as_str(), now);
                zeroize::Zeroize::zeroize(&mut secret);
                item
            }
        };
        vault.insert_item(title, item);
    }

    if legacy > 0 {
        debug!("Normalized {} legacy vault entries", legacy);
    }

    Ok(vault)
}
