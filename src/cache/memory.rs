use super::key::CacheKey;
use chrono::{DateTime, Utc};
use polars::prelude::*;
use std::collections::HashMap;
use std::sync::Mutex;

struct MemoryEntry {
    frame: DataFrame,
    stored_at: DateTime<Utc>,
}

/// In-process memory tier.
///
/// A mutex-guarded map of fingerprint to DataFrame. Unbounded: entries live until
/// `clear()` or process exit. The lock is held only across map access; DataFrame
/// clones are cheap (column buffers are shared).
pub struct MemoryCache {
    entries: Mutex<HashMap<CacheKey, MemoryEntry>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
        }
    }

    pub fn get(&self, key: &CacheKey) -> Option<DataFrame> {
        let entries = self.entries.lock().unwrap();
        entries.get(key).map(|entry| entry.frame.clone())
    }

    pub fn set(&self, key: &CacheKey, frame: DataFrame) {
        let entry = MemoryEntry {
            frame,
            stored_at: Utc::now(),
        };
        let mut entries = self.entries.lock().unwrap();
        entries.insert(key.clone(), entry);
    }

    /// When the entry for `key` was written, if present.
    pub fn stored_at(&self, key: &CacheKey) -> Option<DateTime<Utc>> {
        let entries = self.entries.lock().unwrap();
        entries.get(key).map(|entry| entry.stored_at)
    }

    pub fn clear(&self) {
        let mut entries = self.entries.lock().unwrap();
        entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for MemoryCache {
    fn default() -> Self {
        Self::new()
    }
}
