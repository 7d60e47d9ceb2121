//! Unbounded key→entry store.

use crate::{Cache, CacheEntry, CacheKey};
use sqlmapper_core::Result;
use std::collections::HashMap;
use std::sync::RwLock;

/// An unbounded cache with no eviction policy.
///
/// The building block for both cache tiers. The inner lock only protects
/// map structure; coordination between units of work is the decorators'
/// job, and a first-level instance is owned by a single executor outright.
#[derive(Debug)]
pub struct PerpetualCache {
    id: String,
    entries: RwLock<HashMap<CacheKey, CacheEntry>>,
}

impl PerpetualCache {
    /// Create an empty cache with the given id.
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            entries: RwLock::new(HashMap::new()),
        }
    }
}

impl Cache for PerpetualCache {
    fn id(&self) -> &str {
        &self.id
    }

    fn get(&self, key: &CacheKey) -> Result<Option<CacheEntry>> {
        Ok(self
            .entries
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(key)
            .cloned())
    }

    fn put(&self, key: CacheKey, entry: CacheEntry) -> Result<()> {
        self.entries
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(key, entry);
        Ok(())
    }

    fn remove(&self, key: &CacheKey) -> Result<Option<CacheEntry>> {
        Ok(self
            .entries
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .remove(key))
    }

    fn clear(&self) -> Result<()> {
        self.entries
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .clear();
        Ok(())
    }

    fn size(&self) -> usize {
        self.entries
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .len()
    }
}
