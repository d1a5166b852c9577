//! Storage backends for encrypted vault blobs
//!
//! This module provides two backends:
//! 1. In-memory (tests and embedding)
//! 2. Directory of files with atomic replace

mod file;
mod memory;
mod traits;

pub use file::FileVaultStore;
pub use memory::MemoryVaultStore;
pub use traits::VaultStore;

use rand::RngCore;
use std::path::Path;
use tokio::io::AsyncWriteExt;
use tracing::warn;

use crate::error::Result;

/// Random 32-byte session token, hex encoded
pub(crate) fn new_token() -> String {
    let mut token_bytes = [0u8; 32];
    rand::rngs::OsRng.fill_bytes(&mut token_bytes);
    hex::encode(token_bytes)
}

/// Write to a sibling temp file, sync, rename over `path`, then sync the
/// parent directory so the rename itself survives a crash
pub(crate) async fn write_atomic(path: &Path, contents: &[u8]) -> Result<()> {
    let temp_path = path.with_extension("tmp");

    let mut file = tokio::fs::File::create(&temp_path).await?;
    file.write_all(contents).await?;
    file.sync_all().await?;
    drop(file);

    if let Err(e) = tokio::fs::rename(&temp_path, path).await {
        if let Err(cleanup) = tokio::fs::remove_file(&temp_path).await {
            warn!("Failed to remove temp file {:?}: {}", temp_path, cleanup);
        }
        return Err(e.into());
    }

    sync_parent_dir(path).await
}

#[cfg(unix)]
async fn sync_parent_dir(path: &Path) -> Result<()> {
    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    tokio::fs::File::open(parent).await?.sync_all().await?;
    Ok(())
}

// Directory handles cannot be opened for syncing on this platform
#[cfg(not(unix))]
async fn sync_parent_dir(_path: &Path) -> Result<()> {
    Ok(())
}
