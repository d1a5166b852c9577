//! Application settings management
//!
//! Stores non-sensitive configuration in a plain JSON file.
//! Settings are accessible even when the vault is locked.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, warn};

use crate::error::Result;
use crate::store::write_atomic;

/// Bounds for the auto-lock timeout, in minutes
pub const MIN_AUTO_LOCK_MINUTES: u32 = 1;
pub const MAX_AUTO_LOCK_MINUTES: u32 = 60;
pub const DEFAULT_AUTO_LOCK_MINUTES: u32 = 5;

/// How long a copied secret stays on the clipboard
pub const DEFAULT_CLIPBOARD_CLEAR_SECONDS: u64 = 20;

/// Clamp a requested timeout into the supported range
pub fn clamp_auto_lock_minutes(minutes: u32) -> u32 {
    minutes.clamp(MIN_AUTO_LOCK_MINUTES, MAX_AUTO_LOCK_MINUTES)
}

/// Application settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Settings {
    /// Settings file version
    pub version: u32,
    /// Auto-lock timeout in minutes, within [1, 60]
    pub auto_lock_timeout_minutes: u32,
    /// Seconds before a copied secret is wiped from the clipboard
    pub clipboard_clear_seconds: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            version: 1,
            auto_lock_timeout_minutes: DEFAULT_AUTO_LOCK_MINUTES,
            clipboard_clear_seconds: DEFAULT_CLIPBOARD_CLEAR_SECONDS,
        }
    }
}

impl Settings {
    pub fn auto_lock_timeout(&self) -> Duration {
        Duration::from_secs(u64::from(clamp_auto_lock_minutes(self.auto_lock_timeout_minutes)) * 60)
    }

    pub fn clipboard_window(&self) -> Duration {
        Duration::from_secs(self.clipboard_clear_seconds.max(1))
    }
}

/// Settings manager
pub struct SettingsManager {
    settings_file: PathBuf,
    settings: Settings,
}

impl SettingsManager {
    /// Create a new settings manager
    pub fn new(storage_dir: &Path) -> Self {
        let settings_file = storage_dir.join("settings.json");
        let settings = match Self::load_from_file(&settings_file) {
            Ok(settings) => settings,
            Err(e) => {
                warn!("Ignoring unreadable settings file: {}", e);
                Settings::default()
            }
        };

        Self {
            settings_file,
            settings,
        }
    }

    /// Load settings from file
    fn load_from_file(path: &Path) -> Result<Settings> {
        if !path.exists() {
            debug!("No settings file found, using defaults");
            return Ok(Settings::default());
        }

        let contents = std::fs::read_to_string(path)?;
        let mut settings: Settings = serde_json::from_str(&contents)?;
        settings.auto_lock_timeout_minutes = clamp_auto_lock_minutes(settings.auto_lock_timeout_minutes);
        debug!("Loaded settings from {:?}", path);
        Ok(settings)
    }

    /// Save settings to file
    pub async fn save(&self) -> Result<()> {
        let contents = serde_json::to_vec_pretty(&self.settings)?;
        if let Some(parent) = self.settings_file.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        write_atomic(&self.settings_file, &contents).await?;

        debug!("Saved settings to {:?}", self.settings_file);
        Ok(())
    }

    /// Get current settings
    pub fn get(&self) -> &Settings {
        &self.settings
    }

    /// Get auto-lock timeout
    pub fn get_auto_lock_timeout(&self) -> u32 {
        self.settings.auto_lock_timeout_minutes
    }

    /// Set auto-lock timeout (clamped to [1, 60]) and save
    pub async fn set_auto_lock_timeout(&mut self, minutes: u32) -> Result<u32> {
        let clamped = clamp_auto_lock_minutes(minutes);
        self.settings.auto_lock_timeout_minutes = clamped;
        self.save().await?;
        Ok(clamped)
    }

    /// Set the clipboard exposure window and save
    pub async fn set_clipboard_clear_seconds(&mut self, seconds: u64) -> Result<()> {
        self.settings.clipboard_clear_seconds = seconds.max(1);
        self.save().await
    }

    /// Reset settings to defaults and delete settings file
    pub async fn reset(&mut self) -> Result<()> {
        self.settings = Settings::default();

        if self.settings_file.exists() {
            tokio::fs::remove_file(&self.settings_file).await?;
        }

        Ok(())
    }
}
