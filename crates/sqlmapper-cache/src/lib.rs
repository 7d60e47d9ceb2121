//! Cache tiers and decorators for SqlMapper Rust.
//!
//! This crate provides the cache building blocks the executors compose:
//!
//! - [`CacheKey`] — order-sensitive fingerprint for statement invocations
//! - [`PerpetualCache`] — unbounded key→entry store
//! - [`BlockingCache`] — decorator serializing concurrent misses per key
//! - [`TransactionalCache`] — per-unit-of-work buffer over a shared cache
//!
//! Decorators compose by owning the next cache in the chain behind the same
//! [`Cache`] capability; a shared second-level cache is typically a
//! `PerpetualCache` wrapped in a `BlockingCache`, with each unit of work
//! layering its own `TransactionalCache` buffer on top.

pub mod blocking;
pub mod key;
pub mod perpetual;
pub mod transactional;

pub use blocking::BlockingCache;
pub use key::CacheKey;
pub use perpetual::PerpetualCache;
pub use transactional::TransactionalCache;

use sqlmapper_core::{Result, Row, Value};
use std::sync::Arc;

/// A cached value.
///
/// `Pending` is the in-flight sentinel installed before a backing-store
/// call; `Null` is the explicit negative entry flushed at commit for
/// observed misses. Neither is a servable result: every read path treats
/// them as misses via [`CacheEntry::is_hit`].
#[derive(Debug, Clone)]
pub enum CacheEntry {
    /// Explicit negative entry; exists to release blocking locks
    Null,
    /// A cached result set
    Rows(Arc<Vec<Row>>),
    /// A cached output-parameter object for a stored-procedure call
    Parameter(Value),
    /// Backing-store call in flight; never a servable result
    Pending,
}

impl CacheEntry {
    /// Is this a real, servable result?
    pub const fn is_hit(&self) -> bool {
        matches!(self, CacheEntry::Rows(_) | CacheEntry::Parameter(_))
    }

    /// Is this the in-flight sentinel?
    pub const fn is_pending(&self) -> bool {
        matches!(self, CacheEntry::Pending)
    }

    /// Extract the result rows, if this entry holds any.
    pub fn rows(&self) -> Option<Arc<Vec<Row>>> {
        match self {
            CacheEntry::Rows(rows) => Some(Arc::clone(rows)),
            _ => None,
        }
    }
}

/// The cache capability every tier and decorator satisfies.
///
/// Plain stores return exactly what they hold, including `Null` and
/// `Pending` entries; decorators may normalize non-hit entries to `None`
/// on read (the blocking decorator does, since a non-hit means the reader
/// now owns the key's lock).
pub trait Cache: Send + Sync {
    /// Identifier for log and error messages.
    fn id(&self) -> &str;

    /// Look up an entry.
    fn get(&self, key: &CacheKey) -> Result<Option<CacheEntry>>;

    /// Store an entry.
    fn put(&self, key: CacheKey, entry: CacheEntry) -> Result<()>;

    /// Remove an entry, returning what was stored.
    fn remove(&self, key: &CacheKey) -> Result<Option<CacheEntry>>;

    /// Drop every entry.
    fn clear(&self) -> Result<()>;

    /// Current entry count.
    fn size(&self) -> usize;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entry_classification() {
        assert!(!CacheEntry::Null.is_hit());
        assert!(!CacheEntry::Pending.is_hit());
        assert!(CacheEntry::Pending.is_pending());
        assert!(CacheEntry::Rows(Arc::new(Vec::new())).is_hit());
        assert!(CacheEntry::Parameter(Value::Null).is_hit());
    }

    #[test]
    fn rows_extraction() {
        let rows = Arc::new(vec![Row::new(vec!["n".to_string()], vec![Value::Int(1)])]);
        let entry = CacheEntry::Rows(Arc::clone(&rows));
        assert_eq!(entry.rows().unwrap().len(), 1);
        assert!(CacheEntry::Null.rows().is_none());
    }
}
