use crate::types::Result;
use serde::de::DeserializeOwned;
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use tempfile::NamedTempFile;
use tracing::{debug, warn};

/// Merged per-title page records.
pub const PAGE_TTL: Duration = Duration::from_secs(14 * 24 * 60 * 60);
/// API product records.
pub const PRODUCT_TTL: Duration = Duration::from_secs(7 * 24 * 60 * 60);
/// Cover images.
pub const COVER_TTL: Duration = Duration::from_secs(30 * 24 * 60 * 60);

/// On-disk key/value store with per-read freshness windows.
///
/// Entries are files named by the digest of their semantic key. A stale entry
/// is treated as a miss and left in place until the next successful write
/// replaces it. Writes stage into a temporary file and publish via atomic
/// rename, so readers never observe a partially written entry.
pub struct FreshnessCache {
    root: PathBuf,
}

impl FreshnessCache {
    pub fn new(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    /// Fixed-length collision-resistant key for a composite semantic string,
    /// e.g. `product:1207658924|locale:en-US` or a raw source URL.
    pub fn key_for(semantic: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(semantic.as_bytes());
        format!("{:x}", hasher.finalize())
    }

    /// Absolute path of an entry, for consumers that serve the file directly.
    pub fn path_for(&self, file_name: &str) -> PathBuf {
        self.root.join(file_name)
    }

    pub fn is_fresh(&self, file_name: &str, ttl: Duration) -> bool {
        entry_age(&self.path_for(file_name))
            .map(|age| age < ttl)
            .unwrap_or(false)
    }

    pub fn get_bytes(&self, file_name: &str, ttl: Duration) -> Option<Vec<u8>> {
        let path = self.path_for(file_name);
        let age = entry_age(&path)?;
        if age >= ttl {
            debug!("Cache entry {} is stale ({:?} old)", file_name, age);
            return None;
        }
        fs::read(&path).ok()
    }

    pub fn put_bytes(&self, file_name: &str, payload: &[u8]) -> Result<()> {
        let mut staged = NamedTempFile::new_in(&self.root)?;
        staged.write_all(payload)?;
        staged
            .persist(self.path_for(file_name))
            .map_err(|e| e.error)?;
        debug!("Cached {} ({} bytes)", file_name, payload.len());
        Ok(())
    }

    pub fn get_json<T: DeserializeOwned>(&self, file_name: &str, ttl: Duration) -> Option<T> {
        let bytes = self.get_bytes(file_name, ttl)?;
        match serde_json::from_slice(&bytes) {
            Ok(value) => Some(value),
            Err(e) => {
                warn!("Discarding unreadable cache entry {}: {}", file_name, e);
                None
            }
        }
    }

    pub fn put_json<T: Serialize>(&self, file_name: &str, value: &T) -> Result<()> {
        let bytes = serde_json::to_vec(value)?;
        self.put_bytes(file_name, &bytes)
    }
}

fn entry_age(path: &Path) -> Option<Duration> {
    let modified = fs::metadata(path).ok()?.modified().ok()?;
    // A clock skew putting the mtime in the future counts as just written.
    Some(
        SystemTime::now()
            .duration_since(modified)
            .unwrap_or(Duration::ZERO),
    )
}
