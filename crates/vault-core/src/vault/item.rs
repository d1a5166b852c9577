//! In-memory vault model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::HashMap;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::crypto::SecretString;

/// A single stored secret
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize, Zeroize, ZeroizeOnDrop)]
#[serde(rename_all = "camelCase")]
pub struct VaultItem {
    secret: String,
    #[zeroize(skip)]
    updated_at: DateTime<Utc>,
}

impl VaultItem {
    pub fn new(secret: impl Into<String>, updated_at: DateTime<Utc>) -> Self {
        Self {
            secret: secret.into(),
            updated_at,
        }
    }

    pub fn secret(&self) -> &str {
        &self.secret
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    /// Copy the secret out into a zeroizing wrapper
    pub fn reveal(&self) -> SecretString {
        SecretString::new(self.secret.clone())
    }
}

impl std::fmt::Debug for VaultItem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VaultItem")
            .field("secret", &"[REDACTED]")
            .field("updated_at", &self.updated_at)
            .finish()
    }
}

/// Non-secret view of an item for listing
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemSummary {
    pub title: String,
    pub updated_at: DateTime<Utc>,
}

/// Case-insensitive display order, ties broken by the exact title
pub fn display_order(a: &str, b: &str) -> Ordering {
    a.chars()
        .flat_map(char::to_lowercase)
        .cmp(b.chars().flat_map(char::to_lowercase))
        .then_with(|| a.cmp(b))
}

/// Title -> item mapping owned by an unlocked session
///
/// Titles are case-sensitive keys. Titles and secrets are wiped on drop.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Vault {
    items: HashMap<String, VaultItem>,
}

impl Vault {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn get(&self, title: &str) -> Option<&VaultItem> {
        self.items.get(title)
    }

    pub fn contains(&self, title: &str) -> bool {
        self.items.contains_key(title)
    }

    /// Insert or replace the whole item, stamping it with `now`
    pub fn upsert(&mut self, title: &str, secret: &str, now: DateTime<Utc>) {
        self.items
            .insert(title.to_string(), VaultItem::new(secret, now));
    }

    /// Insert an item as decoded, keeping its timestamp
    pub(crate) fn insert_item(&mut self, title: String, item: VaultItem) {
        self.items.insert(title, item);
    }

    pub fn remove(&mut self, title: &str) -> bool {
        match self.items.remove_entry(title) {
            Some((mut key, _item)) => {
                key.zeroize();
                true
            }
            None => false,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &VaultItem)> {
        self.items.iter()
    }

    /// Items in display order, without their secrets
    pub fn summaries(&self) -> Vec<ItemSummary> {
        let mut summaries: Vec<ItemSummary> = self
            .items
            .iter()
            .map(|(title, item)| ItemSummary {
                title: title.clone(),
                updated_at: item.updated_at,
            })
            .collect();
        summaries.sort_by(|a, b| display_order(&a.title, &b.title));
        summaries
    }
}

impl std::fmt::Debug for Vault {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Vault")
            .field("items", &self.items.len())
            .finish()
    }
}

impl Drop for Vault {
    fn drop(&mut self) {
        for (mut title, _item) in self.items.drain() {
            title.zeroize();
        }
    }
}
