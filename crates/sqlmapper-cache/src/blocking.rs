//! Blocking cache decorator.

use crate::{Cache, CacheEntry, CacheKey};
use sqlmapper_core::error::{CacheError, CacheErrorKind};
use sqlmapper_core::{Error, Result};
use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::sync::{Arc, Condvar, Mutex};
use std::thread::{self, ThreadId};
use std::time::{Duration, Instant};

/// Single-use gate guarding one key.
///
/// Installed by the first thread to miss on the key; opened exactly once,
/// by the put or release that ends that thread's computation. Waiters that
/// observe the open loop back and race to install a fresh gate.
#[derive(Debug)]
struct KeyGate {
    owner: ThreadId,
    released: Mutex<bool>,
    opened: Condvar,
}

impl KeyGate {
    fn new(owner: ThreadId) -> Self {
        Self {
            owner,
            released: Mutex::new(false),
            opened: Condvar::new(),
        }
    }

    fn open(&self) {
        let mut released = self.released.lock().unwrap_or_else(|e| e.into_inner());
        *released = true;
        self.opened.notify_all();
    }

    /// Wait until the gate opens. Returns `false` on timeout.
    fn wait(&self, timeout: Option<Duration>) -> bool {
        let mut released = self.released.lock().unwrap_or_else(|e| e.into_inner());
        match timeout {
            None => {
                while !*released {
                    released = self
                        .opened
                        .wait(released)
                        .unwrap_or_else(|e| e.into_inner());
                }
                true
            }
            Some(bound) => {
                let deadline = Instant::now() + bound;
                while !*released {
                    let now = Instant::now();
                    if now >= deadline {
                        return false;
                    }
                    let (guard, _) = self
                        .opened
                        .wait_timeout(released, deadline - now)
                        .unwrap_or_else(|e| e.into_inner());
                    released = guard;
                }
                true
            }
        }
    }
}

/// Decorator that serializes concurrent misses on the same key.
///
/// A miss leaves the key locked by the reading thread: other threads
/// attempting the same key block until the owner stores a value
/// ([`Cache::put`]) or gives up ([`Cache::remove`], which only releases the
/// lock). This way exactly one caller computes a missing value while the
/// rest wait for it instead of hitting the backing store.
///
/// Every miss must be paired with exactly one subsequent put or remove on
/// the same key by the same logical operation, or the key stays locked
/// forever. Re-acquiring a key already held by the current thread is an
/// idempotent hold, so a retried read cannot deadlock its own thread.
#[derive(Debug)]
pub struct BlockingCache<C: Cache> {
    delegate: Arc<C>,
    locks: Mutex<HashMap<CacheKey, Arc<KeyGate>>>,
    timeout: Option<Duration>,
}

impl<C: Cache> BlockingCache<C> {
    /// Wrap a cache, waiting on locked keys without bound.
    pub fn new(delegate: Arc<C>) -> Self {
        Self {
            delegate,
            locks: Mutex::new(HashMap::new()),
            timeout: None,
        }
    }

    /// Bound lock waits; exceeding the bound raises a lock-timeout error.
    #[must_use]
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// The wrapped cache.
    pub fn delegate(&self) -> &Arc<C> {
        &self.delegate
    }

    fn acquire_lock(&self, key: &CacheKey) -> Result<()> {
        let me = thread::current().id();
        loop {
            let gate = {
                let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
                match locks.entry(key.clone()) {
                    Entry::Vacant(slot) => {
                        slot.insert(Arc::new(KeyGate::new(me)));
                        return Ok(());
                    }
                    Entry::Occupied(slot) => Arc::clone(slot.get()),
                }
            };
            if gate.owner == me {
                // Already held by this thread; one release still frees it.
                return Ok(());
            }
            tracing::debug!(cache = self.delegate.id(), key = %key, "waiting for key lock");
            if !gate.wait(self.timeout) {
                return Err(Error::Cache(CacheError {
                    kind: CacheErrorKind::LockTimeout,
                    cache_id: self.delegate.id().to_string(),
                    message: format!(
                        "couldn't get a lock in {:?} for the key {key}",
                        self.timeout.unwrap_or_default()
                    ),
                    source: None,
                }));
            }
        }
    }

    fn release_lock(&self, key: &CacheKey) -> Result<()> {
        let gate = {
            let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
            locks.remove(key)
        };
        match gate {
            Some(gate) => {
                gate.open();
                Ok(())
            }
            None => Err(Error::Cache(CacheError {
                kind: CacheErrorKind::UnheldRelease,
                cache_id: self.delegate.id().to_string(),
                message: format!(
                    "detected an attempt at releasing unacquired lock for the key {key}"
                ),
                source: None,
            })),
        }
    }
}

impl<C: Cache> Cache for BlockingCache<C> {
    fn id(&self) -> &str {
        self.delegate.id()
    }

    /// Acquire the key's lock, then read the delegate. A hit releases the
    /// lock immediately; a miss keeps it held until the caller's matching
    /// put or remove.
    fn get(&self, key: &CacheKey) -> Result<Option<CacheEntry>> {
        self.acquire_lock(key)?;
        let entry = self.delegate.get(key)?;
        match entry {
            Some(entry) if entry.is_hit() => {
                self.release_lock(key)?;
                Ok(Some(entry))
            }
            _ => Ok(None),
        }
    }

    fn put(&self, key: CacheKey, entry: CacheEntry) -> Result<()> {
        let result = self.delegate.put(key.clone(), entry);
        self.release_lock(&key)?;
        result
    }

    /// Despite the name, this only releases the key's lock; the delegate
    /// entry, if any, stays. Callers use it to signal "looked, found
    /// nothing, done" without caching a negative result.
    fn remove(&self, key: &CacheKey) -> Result<Option<CacheEntry>> {
        self.release_lock(key)?;
        Ok(None)
    }

    fn clear(&self) -> Result<()> {
        self.delegate.clear()
    }

    fn size(&self) -> usize {
        self.delegate.size()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::PerpetualCache;
    use sqlmapper_core::Value;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::mpsc;

    fn key(n: i64) -> CacheKey {
        let mut key = CacheKey::new();
        key.update(Value::BigInt(n));
        key
    }

    fn blocking() -> BlockingCache<PerpetualCache> {
        BlockingCache::new(Arc::new(PerpetualCache::new("shared")))
    }

    #[test]
    fn hit_releases_immediately() {
        let cache = blocking();
        cache
            .delegate()
            .put(key(1), CacheEntry::Parameter(Value::Int(1)))
            .unwrap();

        // Two consecutive hits from the same thread; no lock is retained,
        // so no put/remove pairing is needed.
        assert!(cache.get(&key(1)).unwrap().is_some());
        assert!(cache.get(&key(1)).unwrap().is_some());
    }

    #[test]
    fn miss_then_put_completes_protocol() {
        let cache = blocking();
        assert!(cache.get(&key(1)).unwrap().is_none());
        cache
            .put(key(1), CacheEntry::Parameter(Value::Int(7)))
            .unwrap();
        let entry = cache.get(&key(1)).unwrap().unwrap();
        assert!(entry.is_hit());
    }

    #[test]
    fn same_thread_reacquire_does_not_deadlock() {
        let cache = blocking();
        assert!(cache.get(&key(1)).unwrap().is_none());
        // Second miss on the held key from the same thread: idempotent hold.
        assert!(cache.get(&key(1)).unwrap().is_none());
        cache
            .put(key(1), CacheEntry::Parameter(Value::Int(1)))
            .unwrap();
        // Fully released: a third reader gets the stored value and exits clean.
        assert!(cache.get(&key(1)).unwrap().is_some());
    }

    #[test]
    fn remove_releases_without_deleting() {
        let cache = blocking();
        assert!(cache.get(&key(1)).unwrap().is_none());
        assert!(cache.remove(&key(1)).unwrap().is_none());
        // The delegate was never touched by the release.
        assert_eq!(cache.size(), 0);
        // The key is usable again without blocking.
        assert!(cache.get(&key(1)).unwrap().is_none());
        assert!(cache.remove(&key(1)).unwrap().is_none());
    }

    #[test]
    fn releasing_unheld_lock_is_fatal() {
        let cache = blocking();
        let err = cache.remove(&key(9)).unwrap_err();
        assert!(err.is_usage());
    }

    #[test]
    fn loser_blocks_until_winner_puts() {
        let cache = Arc::new(blocking());
        assert!(cache.get(&key(1)).unwrap().is_none());

        let (started_tx, started_rx) = mpsc::channel();
        let (done_tx, done_rx) = mpsc::channel();
        let contender = {
            let cache = Arc::clone(&cache);
            thread::spawn(move || {
                started_tx.send(()).unwrap();
                let entry = cache.get(&key(1)).unwrap();
                done_tx.send(entry.is_some()).unwrap();
            })
        };

        started_rx.recv().unwrap();
        // The contender must still be parked on the gate.
        assert!(
            done_rx
                .recv_timeout(Duration::from_millis(100))
                .is_err()
        );

        cache
            .put(key(1), CacheEntry::Parameter(Value::Int(42)))
            .unwrap();
        assert!(done_rx.recv_timeout(Duration::from_secs(5)).unwrap());
        contender.join().unwrap();
    }

    #[test]
    fn wait_times_out_as_catchable_error() {
        let cache = Arc::new(
            BlockingCache::new(Arc::new(PerpetualCache::new("shared")))
                .timeout(Duration::from_millis(50)),
        );
        assert!(cache.get(&key(1)).unwrap().is_none());

        let contender = {
            let cache = Arc::clone(&cache);
            thread::spawn(move || cache.get(&key(1)))
        };
        let result = contender.join().unwrap();
        assert!(result.unwrap_err().is_lock_timeout());

        // The original holder still completes its side of the protocol.
        assert!(cache.remove(&key(1)).unwrap().is_none());
    }

    #[test]
    fn exactly_one_caller_computes() {
        let cache = Arc::new(blocking());
        let computations = Arc::new(AtomicUsize::new(0));

        let workers: Vec<_> = (0..4)
            .map(|_| {
                let cache = Arc::clone(&cache);
                let computations = Arc::clone(&computations);
                thread::spawn(move || {
                    match cache.get(&key(1)).unwrap() {
                        Some(entry) => entry,
                        None => {
                            computations.fetch_add(1, Ordering::SeqCst);
                            thread::sleep(Duration::from_millis(20));
                            let entry = CacheEntry::Parameter(Value::Int(99));
                            cache.put(key(1), entry.clone()).unwrap();
                            entry
                        }
                    }
                })
            })
            .collect();

        for worker in workers {
            let entry = worker.join().unwrap();
            assert!(entry.is_hit());
        }
        assert_eq!(computations.load(Ordering::SeqCst), 1);
    }
}
