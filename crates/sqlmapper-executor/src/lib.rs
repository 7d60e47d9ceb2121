//! Statement executors with two-tier caching for SqlMapper Rust.
//!
//! `sqlmapper-executor` is the **execution layer**. It orchestrates cache
//! keys, the per-unit-of-work first-level cache with its in-flight
//! placeholder protocol, deferred nested loads, and the shared second-level
//! cache behind a transactional buffer:
//!
//! - [`Executor`] — the contract callers drive
//! - [`BaseExecutor`] — first-level cache, deferred loads, store round-trips
//! - [`CachingExecutor`] — second-level cache decorator
//! - [`MappedStatement`] / [`RowBounds`] — statement metadata
//! - [`BackingStore`] — the raw execution primitives (out-of-scope
//!   implementations plug in here)

pub mod backing;
pub mod base;
pub mod caching;
pub mod statement;

pub use backing::{BackingStore, BatchResult, Cursor};
pub use base::BaseExecutor;
pub use caching::{CachingExecutor, TransactionalCacheManager};
pub use statement::{MappedStatement, MappedStatementBuilder, RowBounds, StatementType};

use sqlmapper_cache::CacheKey;
use sqlmapper_core::{BoundSql, Configuration, Result, Row, Transaction, Value};
use std::sync::{Arc, RwLock};

/// Shared, mutable handle to a result object a deferred load writes into.
pub type ResultRef = Arc<RwLock<Value>>;

/// The contract any caller drives against an execution unit.
///
/// One executor instance belongs to one unit of work and is driven
/// sequentially by its owning thread; only the shared second-level cache
/// coordinates across units of work.
pub trait Executor {
    /// Resolve, key, and run a query through both cache tiers.
    fn query(
        &mut self,
        statement: &MappedStatement,
        parameter: &mut Value,
        bounds: RowBounds,
    ) -> Result<Arc<Vec<Row>>>;

    /// Run a query with a pre-built cache key and bound statement.
    fn query_with_key(
        &mut self,
        statement: &MappedStatement,
        parameter: &mut Value,
        bounds: RowBounds,
        key: CacheKey,
        bound_sql: &BoundSql,
    ) -> Result<Arc<Vec<Row>>>;

    /// Run a query as a lazy cursor, bypassing both cache tiers.
    fn query_cursor(
        &mut self,
        statement: &MappedStatement,
        parameter: &Value,
        bounds: RowBounds,
    ) -> Result<Cursor>;

    /// Run an insert/update/delete, clearing the first-level cache.
    fn update(&mut self, statement: &MappedStatement, parameter: &mut Value) -> Result<u64>;

    /// Drain batched-but-unexecuted statements.
    fn flush_statements(&mut self) -> Result<Vec<BatchResult>>;

    /// Clear caches, flush batches, then commit the transaction resource
    /// when `required`.
    fn commit(&mut self, required: bool) -> Result<()>;

    /// Clear caches, discard batches, then roll back the transaction
    /// resource when `required`.
    fn rollback(&mut self, required: bool) -> Result<()>;

    /// Release all owned resources. Idempotent; failures are logged.
    fn close(&mut self, force_rollback: bool);

    /// Has this executor been closed?
    fn is_closed(&self) -> bool;

    /// Build the cache key for a statement invocation.
    fn create_cache_key(
        &self,
        statement: &MappedStatement,
        parameter: &Value,
        bounds: RowBounds,
        bound_sql: &BoundSql,
    ) -> Result<CacheKey>;

    /// Is anything (result or in-flight placeholder) under this key in the
    /// first-level cache?
    fn is_cached(&self, statement: &MappedStatement, key: &CacheKey) -> bool;

    /// Schedule a nested-result property for resolution.
    ///
    /// Resolves immediately when the key already holds a materialized
    /// result; otherwise queues until the outermost call completes.
    fn defer_load(
        &mut self,
        target: ResultRef,
        property: &str,
        key: CacheKey,
        many: bool,
    ) -> Result<()>;

    /// Wipe the first-level cache.
    fn clear_local_cache(&mut self);

    /// The owned transaction resource.
    fn transaction_mut(&mut self) -> Result<&mut dyn Transaction>;
}

/// Build an executor for one unit of work.
///
/// Wraps the base executor in the second-level caching decorator when the
/// configuration enables caching.
pub fn build_executor(
    configuration: Configuration,
    transaction: Box<dyn Transaction>,
    store: Box<dyn BackingStore>,
) -> Box<dyn Executor> {
    let cache_enabled = configuration.cache_enabled;
    let base = BaseExecutor::new(configuration, transaction, store);
    if cache_enabled {
        Box::new(CachingExecutor::new(Box::new(base)))
    } else {
        Box::new(base)
    }
}
