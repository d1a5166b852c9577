//! Vault data model and codec

mod codec;
mod item;

pub use codec::{DerivedKey, EncryptedBlob, VaultCodec, BLOB_VERSION};
pub use item::{display_order, ItemSummary, Vault, VaultItem};
