//! Write-through render cache
//!
//! Blobs live at `<cache dir>/<key>.<ext>`. The cache is never authoritative:
//! read failures are misses and write failures are ignored. Entries are
//! written to a temporary file and renamed into place, so a reader sees
//! either the old blob or the new one. Concurrent writers of one key race
//! benignly, last writer wins.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use tracing::{debug, info, warn};

use crate::errors::Result;

/// On-disk content cache keyed by fingerprint
#[derive(Debug, Clone)]
pub struct ContentCache {
    dir: PathBuf,
    enabled: bool,
}

impl ContentCache {
    pub fn new(dir: impl Into<PathBuf>, enabled: bool) -> Self {
        Self {
            dir: dir.into(),
            enabled,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn entry_path(&self, key: &str, ext: &str) -> PathBuf {
        self.dir.join(format!("{key}.{ext}"))
    }

    /// Cached blob, `None` on a miss, a read error, or when caching is off
    pub async fn get(&self, key: &str, ext: &str) -> Option<Vec<u8>> {
        if !self.enabled {
            return None;
        }

        let path = self.entry_path(key, ext);
        match tokio::fs::read(&path).await {
            Ok(data) if !data.is_empty() => {
                debug!("Cache hit: {}.{}", key, ext);
                Some(data)
            }
            Ok(_) => None,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("Cache miss: {}.{}", key, ext);
                None
            }
            Err(e) => {
                warn!("Failed to read cache entry {:?}: {}", path, e);
                None
            }
        }
    }

    /// Unique scratch path next to the entry, never matched by `get`
    fn staging_path(&self, key: &str, ext: &str) -> PathBuf {
        static NEXT: AtomicU64 = AtomicU64::new(0);
        let serial = NEXT.fetch_add(1, Ordering::Relaxed);
        self.dir
            .join(format!(".{key}.{ext}.{}.{serial}.tmp", std::process::id()))
    }

    /// Best-effort write; failures are logged and dropped
    pub async fn put(&self, key: &str, ext: &str, data: &[u8]) {
        if !self.enabled {
            return;
        }

        let path = self.entry_path(key, ext);
        let staging = self.staging_path(key, ext);
        if let Err(e) = tokio::fs::write(&staging, data).await {
            warn!("Failed to write cache entry {:?}: {}", path, e);
            tokio::fs::remove_file(&staging).await.ok();
            return;
        }

        if let Err(e) = tokio::fs::rename(&staging, &path).await {
            warn!("Failed to commit cache entry {:?}: {}", path, e);
            tokio::fs::remove_file(&staging).await.ok();
        }
    }

    /// Delete every entry. Only called at startup, before first use.
    pub async fn clear_all(&self) -> Result<usize> {
        let mut entries = match tokio::fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(e.into()),
        };

        let mut removed = 0;
        while let Some(entry) = entries.next_entry().await? {
            if entry.file_type().await?.is_file() {
                tokio::fs::remove_file(entry.path()).await?;
                removed += 1;
            }
        }

        info!("Cleared {} cached render(s)", removed);
        Ok(removed)
    }
}
