//! Key → value caches persisted as a single JSON object file.
//!
//! Entries never expire. An optional entry cap evicts the oldest inserted keys
//! first; without a cap the file grows indefinitely.
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use indexmap::IndexMap;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, info};

#[derive(Debug)]
pub struct JsonFileCache<V> {
    path: PathBuf,
    entries: IndexMap<String, V>,
    max_entries: Option<usize>,
}

impl<V> JsonFileCache<V>
where
    V: Serialize + DeserializeOwned + Clone,
{
    /// Load the cache from `path`; a missing file yields an empty cache.
    pub fn load(path: impl Into<PathBuf>, max_entries: Option<usize>) -> Result<Self> {
        let path = path.into();
        let entries = if path.exists() {
            let raw = std::fs::read_to_string(&path)
                .with_context(|| format!("reading cache file {}", path.display()))?;
            let parsed: IndexMap<String, V> = if raw.trim().is_empty() {
                IndexMap::new()
            } else {
                serde_json::from_str(&raw)
                    .with_context(|| format!("parsing cache file {}", path.display()))?
            };
            info!(path = %path.display(), entries = parsed.len(), "loaded cache");
            parsed
        } else {
            info!(path = %path.display(), "no cache found; starting fresh");
            IndexMap::new()
        };
        let mut cache = Self {
            path,
            entries,
            max_entries: max_entries.filter(|n| *n > 0),
        };
        cache.enforce_cap();
        Ok(cache)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn get(&self, key: &str) -> Option<&V> {
        self.entries.get(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Insert or overwrite `key`. Overwriting keeps the key's original position.
    pub fn insert(&mut self, key: impl Into<String>, value: V) {
        self.entries.insert(key.into(), value);
        self.enforce_cap();
    }

    /// Rewrite the whole file. The new content goes to a sibling temp file that
    /// is then renamed over the old one.
    pub fn save(&self) -> Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("creating cache dir {}", parent.display()))?;
        }
        let body = serde_json::to_vec(&self.entries).context("serializing cache")?;
        let mut tmp = self.path.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);
        std::fs::write(&tmp, body)
            .with_context(|| format!("writing cache file {}", tmp.display()))?;
        std::fs::rename(&tmp, &self.path)
            .with_context(|| format!("replacing cache file {}", self.path.display()))?;
        debug!(path = %self.path.display(), entries = self.entries.len(), "saved cache");
        Ok(())
    }

    fn enforce_cap(&mut self) {
        let Some(cap) = self.max_entries else {
            return;
        };
        while self.entries.len() > cap {
            if let Some((key, _)) = self.entries.shift_remove_index(0) {
                debug!(key = %key, cap, "evicted oldest cache entry");
            }
        }
    }
}
