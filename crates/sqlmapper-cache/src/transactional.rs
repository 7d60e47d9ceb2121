//! Per-unit-of-work transactional buffer over a shared cache.

use crate::{Cache, CacheEntry, CacheKey};
use sqlmapper_core::Result;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

/// Buffers puts and records misses for one unit of work, flushing or
/// discarding atomically at commit/rollback.
///
/// Nothing is written through while the unit of work runs: results land in
/// the pending-put map and every miss observed on the shared cache is
/// remembered. On commit, pending puts are written through, and every
/// observed miss with no pending put is written through as an explicit
/// [`CacheEntry::Null`] — releasing any per-key lock the shared cache holds
/// without leaving stale data. On rollback, observed misses are removed
/// from the shared cache (again releasing locks) and no puts are applied.
///
/// `clear` marks the buffer clear-on-commit: reads report misses from that
/// point on, and the shared cache is wiped at commit, right before pending
/// puts flush. The wipe is never applied eagerly; concurrent readers keep
/// seeing the old entries until this unit of work commits.
pub struct TransactionalCache {
    delegate: Arc<dyn Cache>,
    clear_on_commit: bool,
    entries_to_add_on_commit: HashMap<CacheKey, CacheEntry>,
    entries_missed_in_cache: HashSet<CacheKey>,
}

impl TransactionalCache {
    /// Wrap a shared cache in a fresh, empty buffer.
    pub fn new(delegate: Arc<dyn Cache>) -> Self {
        Self {
            delegate,
            clear_on_commit: false,
            entries_to_add_on_commit: HashMap::new(),
            entries_missed_in_cache: HashSet::new(),
        }
    }

    /// Identifier of the shared cache.
    pub fn id(&self) -> &str {
        self.delegate.id()
    }

    /// Entry count of the shared cache.
    pub fn size(&self) -> usize {
        self.delegate.size()
    }

    /// Consult the shared cache, recording a miss for later lock release.
    ///
    /// When clear-on-commit is set the cache is conceptually already wiped
    /// from this unit of work's viewpoint, so a miss is reported regardless
    /// of what the delegate holds.
    pub fn get(&mut self, key: &CacheKey) -> Result<Option<CacheEntry>> {
        let entry = self.delegate.get(key)?;
        let hit = entry.as_ref().is_some_and(CacheEntry::is_hit);
        if !hit {
            self.entries_missed_in_cache.insert(key.clone());
        }
        if self.clear_on_commit {
            Ok(None)
        } else {
            Ok(entry.filter(CacheEntry::is_hit))
        }
    }

    /// Buffer a put; nothing reaches the shared cache until commit.
    pub fn put(&mut self, key: CacheKey, entry: CacheEntry) {
        self.entries_to_add_on_commit.insert(key, entry);
    }

    /// Mark the buffer clear-on-commit and drop buffered puts.
    ///
    /// The shared cache is not touched yet; the wipe happens at commit.
    pub fn clear(&mut self) {
        self.clear_on_commit = true;
        self.entries_to_add_on_commit.clear();
    }

    /// Write the buffer through to the shared cache and reset.
    pub fn commit(&mut self) -> Result<()> {
        if self.clear_on_commit {
            self.delegate.clear()?;
        }
        self.flush_pending_entries()?;
        self.reset();
        Ok(())
    }

    /// Release locks for observed misses, discard buffered puts, reset.
    pub fn rollback(&mut self) -> Result<()> {
        self.unlock_missed_entries();
        self.reset();
        Ok(())
    }

    fn reset(&mut self) {
        self.clear_on_commit = false;
        self.entries_to_add_on_commit.clear();
        self.entries_missed_in_cache.clear();
    }

    fn flush_pending_entries(&mut self) -> Result<()> {
        for (key, entry) in &self.entries_to_add_on_commit {
            self.delegate.put(key.clone(), entry.clone())?;
        }
        for key in &self.entries_missed_in_cache {
            if !self.entries_to_add_on_commit.contains_key(key) {
                self.delegate.put(key.clone(), CacheEntry::Null)?;
            }
        }
        Ok(())
    }

    fn unlock_missed_entries(&mut self) {
        for key in &self.entries_missed_in_cache {
            // A non-conforming adapter must not abort the broader rollback.
            if let Err(error) = self.delegate.remove(key) {
                tracing::warn!(
                    cache = self.delegate.id(),
                    %error,
                    "unexpected failure notifying a rollback to the cache adapter"
                );
            }
        }
    }
}
