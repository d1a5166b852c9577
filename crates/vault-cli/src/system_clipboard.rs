//! Desktop clipboard behind the vault's `Clipboard` seam

use std::sync::Mutex;

use vault_core::{Clipboard, Result, VaultError};

/// OS clipboard via `arboard`
pub struct SystemClipboard {
    inner: Mutex<arboard::Clipboard>,
}

impl SystemClipboard {
    pub fn new() -> Result<Self> {
        let inner = arboard::Clipboard::new()
            .map_err(|e| VaultError::Storage(format!("Clipboard unavailable: {}", e)))?;
        Ok(Self {
            inner: Mutex::new(inner),
        })
    }
}

impl Clipboard for SystemClipboard {
    fn write_text(&self, text: &str) -> Result<()> {
        self.inner
            .lock()
            .map_err(|_| VaultError::Storage("clipboard lock poisoned".to_string()))?
            .set_text(text)
            .map_err(|e| VaultError::Storage(format!("Clipboard write failed: {}", e)))
    }
}
