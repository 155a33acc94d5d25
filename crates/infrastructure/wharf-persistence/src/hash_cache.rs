use std::collections::HashMap;
use std::fs;
use std::io;

use camino::{Utf8Path, Utf8PathBuf};
use serde::{Deserialize, Serialize};
use wharf_core::paths::SitePath;

/// Hidden project-local directory holding one cache file per deploy target.
pub const CACHE_DIR: &str = ".wharf";

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct HashRecord {
    /// File modification time in milliseconds since the epoch.
    pub mtime_ms: u64,
    pub hash: String,
}

/// Persisted table of `relative path -> (mtime, content hash)` for one
/// deploy target. Best effort by contract: a cache that cannot be read is
/// an empty cache, and a cache that cannot be written costs a warning, not
/// the deploy.
#[derive(Debug, Serialize, Deserialize, Default, Clone, PartialEq, Eq)]
pub struct HashCache {
    /// Map relative path (Unix style) -> record
    pub entries: HashMap<String, HashRecord>,
}

impl HashCache {
    pub fn cache_path(project_root: &Utf8Path, key: &str) -> Utf8PathBuf {
        project_root.join(CACHE_DIR).join(format!("uploads.{key}.json"))
    }

    /// Load the table for a target. Missing, unreadable, or corrupt files
    /// all yield an empty table, never an error.
    pub fn load(project_root: &Utf8Path, key: &str) -> Self {
        let path = Self::cache_path(project_root, key);
        match fs::read_to_string(&path) {
            Ok(s) => serde_json::from_str::<HashCache>(&s).unwrap_or_else(|e| {
                tracing::warn!("Hash cache corrupted at {}, resetting: {}", path, e);
                Self::default()
            }),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Self::default(),
            Err(e) => {
                tracing::warn!("Hash cache unreadable at {}, resetting: {}", path, e);
                Self::default()
            }
        }
    }

    /// Atomically replace the on-disk table for a target.
    pub fn dump(&self, project_root: &Utf8Path, key: &str) -> io::Result<()> {
        let path = Self::cache_path(project_root, key);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let s = serde_json::to_string(self)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;

        // Atomic write
        let tmp_path = path.with_extension("tmp");
        fs::write(&tmp_path, s)?;
        fs::rename(&tmp_path, path)?;
        Ok(())
    }

    /// Overwrite the on-disk table with an empty one. Used after the remote
    /// rejects a content hash, so the next run rehashes from scratch.
    pub fn invalidate(project_root: &Utf8Path, key: &str) -> io::Result<()> {
        Self::default().dump(project_root, key)
    }

    pub fn get(&self, rel_path: &str) -> Option<&HashRecord> {
        self.entries.get(&SitePath::normalize(rel_path))
    }

    pub fn insert(&mut self, rel_path: &str, mtime_ms: u64, hash: String) {
        self.entries
            .insert(SitePath::normalize(rel_path), HashRecord { mtime_ms, hash });
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
