//! Clipboard exposure guard
//!
//! A copied secret is wiped from the clipboard after a fixed window. Copying
//! again restarts the window; only the latest copy schedules a clear.

use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::crypto::SecretString;
use crate::error::{Result, VaultError};

/// System clipboard seam
pub trait Clipboard: Send + Sync {
    fn write_text(&self, text: &str) -> Result<()>;
}

/// In-process clipboard that records every write
#[derive(Debug, Default)]
pub struct MemoryClipboard {
    writes: Mutex<Vec<String>>,
}

impl MemoryClipboard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every value written so far, oldest first
    pub fn writes(&self) -> Vec<String> {
        self.writes.lock().map(|w| w.clone()).unwrap_or_default()
    }

    /// Current clipboard contents
    pub fn contents(&self) -> Option<String> {
        self.writes().pop()
    }
}

impl Clipboard for MemoryClipboard {
    fn write_text(&self, text: &str) -> Result<()> {
        self.writes
            .lock()
            .map_err(|_| VaultError::Storage("clipboard lock poisoned".to_string()))?
            .push(text.to_string());
        Ok(())
    }
}

/// Copies secrets and clears them after `window`
pub struct ClipboardGuard {
    clipboard: Arc<dyn Clipboard>,
    window: Duration,
    pending: Mutex<Option<JoinHandle<()>>>,
}

impl ClipboardGuard {
    pub fn new(clipboard: Arc<dyn Clipboard>, window: Duration) -> Self {
        Self {
            clipboard,
            window,
            pending: Mutex::new(None),
        }
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// Put `secret` on the clipboard and schedule the clear
    ///
    /// Must be called inside a tokio runtime. If the write fails, any clear
    /// already scheduled for an earlier copy stays armed.
    pub fn copy(&self, secret: &SecretString) -> Result<()> {
        let mut pending = self
            .pending
            .lock()
            .map_err(|_| VaultError::Storage("clipboard guard lock poisoned".to_string()))?;

        self.clipboard.write_text(secret.expose())?;

        let clipboard = self.clipboard.clone();
        let window = self.window;
        let clear = tokio::spawn(async move {
            tokio::time::sleep(window).await;
            // Clear unconditionally, even if something else was copied since
            match clipboard.write_text("") {
                Ok(()) => debug!("Clipboard cleared"),
                Err(e) => warn!("Failed to clear clipboard: {}", e),
            }
        });

        if let Some(previous) = pending.replace(clear) {
            previous.abort();
        }

        debug!("Secret copied, clearing in {:?}", window);
        Ok(())
    }

    /// Wait for the scheduled clear to run; returns at once when none is armed
    pub async fn wait_cleared(&self) {
        let handle = match self.pending.lock() {
            Ok(mut pending) => pending.take(),
            Err(_) => None,
        };
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                if !e.is_cancelled() {
                    warn!("Clipboard clear task failed: {}", e);
                }
            }
        }
    }

    /// Drop the pending clear without touching the clipboard
    pub fn cancel(&self) {
        if let Ok(mut pending) = self.pending.lock() {
            if let Some(handle) = pending.take() {
                handle.abort();
            }
        }
    }

    /// Whether a clear is still scheduled
    pub fn is_armed(&self) -> bool {
        self.pending
            .lock()
            .map(|p| p.as_ref().is_some_and(|h| !h.is_finished()))
            .unwrap_or(false)
    }
}

impl Drop for ClipboardGuard {
    fn drop(&mut self) {
        self.cancel();
    }
}
