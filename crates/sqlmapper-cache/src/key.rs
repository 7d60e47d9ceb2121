//! Order-sensitive cache-key fingerprints.

use sqlmapper_core::Value;
use std::collections::hash_map::DefaultHasher;
use std::fmt;
use std::hash::{Hash, Hasher};

const MULTIPLIER: u64 = 37;

/// A deterministic fingerprint over an ordered sequence of contributions.
///
/// Executors feed in the statement id, pagination bounds, the final SQL
/// text, every input argument value, and (when configured) the environment
/// id. Two keys are equal iff every contribution is pairwise equal in the
/// same order; equal elements in a different order produce unequal keys.
///
/// Keys are append-only: there is no removal or reordering operation, and
/// a key stops changing once its owner finishes contributing.
///
/// # Example
///
/// ```
/// use sqlmapper_cache::CacheKey;
/// use sqlmapper_core::Value;
///
/// let mut a = CacheKey::new();
/// a.update(Value::from("findById"));
/// a.update(Value::BigInt(1));
///
/// let mut b = CacheKey::new();
/// b.update(Value::from("findById"));
/// b.update(Value::BigInt(1));
///
/// assert_eq!(a, b);
/// ```
#[derive(Debug, Clone)]
pub struct CacheKey {
    hash: u64,
    checksum: u64,
    parts: Vec<Value>,
}

impl CacheKey {
    /// Create an empty key.
    #[must_use]
    pub fn new() -> Self {
        Self {
            hash: 17,
            checksum: 0,
            parts: Vec::new(),
        }
    }

    /// Append one contribution.
    ///
    /// `Value::Null` is a legitimate contribution: a null argument and a
    /// missing argument list hash differently.
    pub fn update(&mut self, value: impl Into<Value>) {
        let value = value.into();
        let mut hasher = DefaultHasher::new();
        value.hash_into(&mut hasher);
        let base = hasher.finish();

        let count = self.parts.len() as u64 + 1;
        self.checksum = self.checksum.wrapping_add(base);
        self.hash = self
            .hash
            .wrapping_mul(MULTIPLIER)
            .wrapping_add(base.wrapping_mul(count));
        self.parts.push(value);
    }

    /// Append several contributions in order.
    pub fn update_all<I>(&mut self, values: I)
    where
        I: IntoIterator,
        I::Item: Into<Value>,
    {
        for value in values {
            self.update(value);
        }
    }

    /// Number of contributions so far.
    pub fn update_count(&self) -> usize {
        self.parts.len()
    }
}

impl Default for CacheKey {
    fn default() -> Self {
        Self::new()
    }
}

impl PartialEq for CacheKey {
    fn eq(&self, other: &Self) -> bool {
        if self.hash != other.hash
            || self.checksum != other.checksum
            || self.parts.len() != other.parts.len()
        {
            return false;
        }
        self.parts
            .iter()
            .zip(&other.parts)
            .all(|(a, b)| a.key_eq(b))
    }
}

impl Eq for CacheKey {}

impl Hash for CacheKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        state.write_u64(self.hash);
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.hash, self.checksum)?;
        for part in &self.parts {
            write!(f, ":{part}")?;
        }
        Ok(())
    }
}
