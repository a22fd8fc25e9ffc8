// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Durable key/value storage for the refresh token.
//!
//! Only the refresh token is ever written here, under [`REFRESH_TOKEN_KEY`].
//! The access token and user stay in memory.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use tracing::{debug, warn};

/// Well-known key holding the refresh token.
pub const REFRESH_TOKEN_KEY: &str = "refresh_token";

/// Minimal string key/value capability.
pub trait TokenCache: Send + Sync {
    fn get(&self, key: &str) -> anyhow::Result<Option<String>>;
    fn set(&self, key: &str, value: &str) -> anyhow::Result<()>;
    fn delete(&self, key: &str) -> anyhow::Result<()>;
}

/// Read the stored refresh token. A failed read counts as "none".
pub fn load_refresh_token(cache: &dyn TokenCache) -> Option<String> {
    match cache.get(REFRESH_TOKEN_KEY) {
        Ok(token) => token.filter(|t| !t.is_empty()),
        Err(e) => {
            warn!(err = %e, "failed to read refresh token");
            None
        }
    }
}

pub fn store_refresh_token(cache: &dyn TokenCache, token: &str) {
    if let Err(e) = cache.set(REFRESH_TOKEN_KEY, token) {
        warn!(err = %e, "failed to persist refresh token");
    }
}

pub fn clear_refresh_token(cache: &dyn TokenCache) {
    if let Err(e) = cache.delete(REFRESH_TOKEN_KEY) {
        warn!(err = %e, "failed to delete refresh token");
    }
}

/// Process-local cache. Does not survive restarts.
#[derive(Debug, Default)]
pub struct MemoryTokenCache {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryTokenCache {
    pub fn new() -> Self {
        Self::default()
    }
}

impl TokenCache for MemoryTokenCache {
    fn get(&self, key: &str) -> anyhow::Result<Option<String>> {
        Ok(self.entries.lock().get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> anyhow::Result<()> {
        self.entries.lock().insert(key.to_owned(), value.to_owned());
        Ok(())
    }

    fn delete(&self, key: &str) -> anyhow::Result<()> {
        self.entries.lock().remove(key);
        Ok(())
    }
}

/// JSON object on disk, rewritten atomically (tmp + rename) on every change.
///
/// No cross-process locking: two processes sharing the file can race a
/// rotation and invalidate each other's refresh token.
#[derive(Debug)]
pub struct FileTokenCache {
    path: PathBuf,
    /// Serializes read-modify-write within this process.
    write_lock: Mutex<()>,
}

impl FileTokenCache {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into(), write_lock: Mutex::new(()) }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load(&self) -> anyhow::Result<HashMap<String, String>> {
        let contents = match std::fs::read_to_string(&self.path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(HashMap::new()),
            Err(e) => return Err(e.into()),
        };
        if contents.trim().is_empty() {
            return Ok(HashMap::new());
        }
        Ok(serde_json::from_str(&contents)?)
    }

    /// Uses a unique temp filename (PID + counter) so concurrent saves never
    /// share a `.tmp` file.
    fn save(&self, entries: &HashMap<String, String>) -> anyhow::Result<()> {
        use std::sync::atomic::{AtomicU32, Ordering};
        static COUNTER: AtomicU32 = AtomicU32::new(0);

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let json = serde_json::to_string_pretty(entries)?;
        let seq = COUNTER.fetch_add(1, Ordering::Relaxed);
        let tmp_name = format!(
            "{}.{}.{}.tmp",
            self.path.file_name().unwrap_or_default().to_string_lossy(),
            std::process::id(),
            seq,
        );
        let tmp_path = self.path.with_file_name(tmp_name);
        std::fs::write(&tmp_path, json)?;
        std::fs::rename(&tmp_path, &self.path)?;
        debug!(path = %self.path.display(), keys = entries.len(), "token cache written");
        Ok(())
    }
}

impl TokenCache for FileTokenCache {
    fn get(&self, key: &str) -> anyhow::Result<Option<String>> {
        Ok(self.load()?.remove(key))
    }

    fn set(&self, key: &str, value: &str) -> anyhow::Result<()> {
        let _guard = self.write_lock.lock();
        let mut entries = self.load().unwrap_or_else(|e| {
            warn!(path = %self.path.display(), err = %e, "discarding unreadable token cache");
            HashMap::new()
        });
        entries.insert(key.to_owned(), value.to_owned());
        self.save(&entries)
    }

    fn delete(&self, key: &str) -> anyhow::Result<()> {
        let _guard = self.write_lock.lock();
        let mut entries = match self.load() {
            Ok(entries) => entries,
            Err(e) => {
                warn!(path = %self.path.display(), err = %e, "discarding unreadable token cache");
                HashMap::new()
            }
        };
        let removed = entries.remove(key).is_some();
        if entries.is_empty() {
            return match std::fs::remove_file(&self.path) {
                Ok(()) => Ok(()),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
                Err(e) => Err(e.into()),
            };
        }
        if removed {
            self.save(&entries)?;
        }
        Ok(())
    }
}

#[cfg(test)]
#[path = "token_cache_tests.rs"]
mod tests;
