//! Second-level cache decorator.

use crate::backing::{BatchResult, Cursor};
use crate::statement::{MappedStatement, RowBounds, StatementType};
use crate::{Executor, ResultRef};
use sqlmapper_cache::{Cache, CacheEntry, CacheKey, TransactionalCache};
use sqlmapper_core::{BoundSql, Error, Result, Row, Transaction, Value};
use std::collections::HashMap;
use std::sync::Arc;

/// Per-unit-of-work transactional buffers, one per shared cache.
#[derive(Default)]
pub struct TransactionalCacheManager {
    caches: HashMap<String, TransactionalCache>,
}

impl TransactionalCacheManager {
    /// Create an empty manager.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The buffer for a shared cache, created on first use.
    pub fn cache_for(&mut self, cache: &Arc<dyn Cache>) -> &mut TransactionalCache {
        self.caches
            .entry(cache.id().to_string())
            .or_insert_with(|| TransactionalCache::new(Arc::clone(cache)))
    }

    /// Record clear-intent for a shared cache.
    pub fn clear(&mut self, cache: &Arc<dyn Cache>) {
        self.cache_for(cache).clear();
    }

    /// Commit every buffer.
    pub fn commit(&mut self) -> Result<()> {
        for cache in self.caches.values_mut() {
            cache.commit()?;
        }
        Ok(())
    }

    /// Roll back every buffer.
    pub fn rollback(&mut self) -> Result<()> {
        for cache in self.caches.values_mut() {
            cache.rollback()?;
        }
        Ok(())
    }
}

/// Decorator adding the shared second-level cache around an executor.
///
/// Reads go through the unit of work's transactional buffer; results are
/// buffered rather than written through, and a statement's flush intent is
/// recorded for commit instead of wiping the shared cache eagerly, so
/// concurrent readers keep the old entries until this unit of work commits.
pub struct CachingExecutor {
    delegate: Box<dyn Executor>,
    tcm: TransactionalCacheManager,
}

impl CachingExecutor {
    /// Wrap an executor.
    pub fn new(delegate: Box<dyn Executor>) -> Self {
        Self {
            delegate,
            tcm: TransactionalCacheManager::new(),
        }
    }

    fn flush_cache_if_required(&mut self, statement: &MappedStatement) {
        if let Some(cache) = statement.cache() {
            if statement.flush_cache_required() {
                self.tcm.clear(cache);
            }
        }
    }
}

/// Stored procedures with output parameters cannot be replayed from a
/// cache; declaring them cacheable is a configuration error.
fn ensure_no_out_params(statement: &MappedStatement, bound_sql: &BoundSql) -> Result<()> {
    if statement.statement_type() == StatementType::Callable && bound_sql.has_output_bindings() {
        return Err(Error::config(format!(
            "caching stored procedures with output parameters is not supported; \
             disable cache use for statement '{}'",
            statement.id()
        )));
    }
    Ok(())
}

impl Executor for CachingExecutor {
    fn query(
        &mut self,
        statement: &MappedStatement,
        parameter: &mut Value,
        bounds: RowBounds,
    ) -> Result<Arc<Vec<Row>>> {
        let bound_sql = statement.bound_sql(parameter)?;
        let key = self.create_cache_key(statement, parameter, bounds, &bound_sql)?;
        self.query_with_key(statement, parameter, bounds, key, &bound_sql)
    }

    fn query_with_key(
        &mut self,
        statement: &MappedStatement,
        parameter: &mut Value,
        bounds: RowBounds,
        key: CacheKey,
        bound_sql: &BoundSql,
    ) -> Result<Arc<Vec<Row>>> {
        if let Some(cache) = statement.cache().map(Arc::clone) {
            self.flush_cache_if_required(statement);
            if statement.is_use_cache() {
                ensure_no_out_params(statement, bound_sql)?;
                if let Some(entry) = self.tcm.cache_for(&cache).get(&key)? {
                    if let Some(rows) = entry.rows() {
                        tracing::debug!(
                            statement = statement.id(),
                            cache = cache.id(),
                            "serving query from the second-level cache"
                        );
                        return Ok(rows);
                    }
                }
                let rows = self
                    .delegate
                    .query_with_key(statement, parameter, bounds, key.clone(), bound_sql)?;
                self.tcm
                    .cache_for(&cache)
                    .put(key, CacheEntry::Rows(Arc::clone(&rows)));
                return Ok(rows);
            }
        }
        self.delegate
            .query_with_key(statement, parameter, bounds, key, bound_sql)
    }

    fn query_cursor(
        &mut self,
        statement: &MappedStatement,
        parameter: &Value,
        bounds: RowBounds,
    ) -> Result<Cursor> {
        self.flush_cache_if_required(statement);
        self.delegate.query_cursor(statement, parameter, bounds)
    }

    fn update(&mut self, statement: &MappedStatement, parameter: &mut Value) -> Result<u64> {
        self.flush_cache_if_required(statement);
        self.delegate.update(statement, parameter)
    }

    fn flush_statements(&mut self) -> Result<Vec<BatchResult>> {
        self.delegate.flush_statements()
    }

    fn commit(&mut self, required: bool) -> Result<()> {
        self.delegate.commit(required)?;
        self.tcm.commit()
    }

    fn rollback(&mut self, required: bool) -> Result<()> {
        let delegated = self.delegate.rollback(required);
        let buffered = if required {
            self.tcm.rollback()
        } else {
            Ok(())
        };
        delegated?;
        buffered
    }

    fn close(&mut self, force_rollback: bool) {
        let buffered = if force_rollback {
            self.tcm.rollback()
        } else {
            self.tcm.commit()
        };
        if let Err(error) = buffered {
            tracing::warn!(%error, "unexpected error settling the transactional cache on close");
        }
        self.delegate.close(force_rollback);
    }

    fn is_closed(&self) -> bool {
        self.delegate.is_closed()
    }

    fn create_cache_key(
        &self,
        statement: &MappedStatement,
        parameter: &Value,
        bounds: RowBounds,
        bound_sql: &BoundSql,
    ) -> Result<CacheKey> {
        self.delegate
            .create_cache_key(statement, parameter, bounds, bound_sql)
    }

    fn is_cached(&self, statement: &MappedStatement, key: &CacheKey) -> bool {
        self.delegate.is_cached(statement, key)
    }

    fn defer_load(
        &mut self,
        target: ResultRef,
        property: &str,
        key: CacheKey,
        many: bool,
    ) -> Result<()> {
        self.delegate.defer_load(target, property, key, many)
    }

    fn clear_local_cache(&mut self) {
        self.delegate.clear_local_cache();
    }

    fn transaction_mut(&mut self) -> Result<&mut dyn Transaction> {
        self.delegate.transaction_mut()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backing::BackingStore;
    use crate::base::BaseExecutor;
    use sqlmapper_cache::PerpetualCache;
    use sqlmapper_core::value::map;
    use sqlmapper_core::Configuration;
    use sqlmapper_scripting::{RawSqlSource, SqlSource};
    use std::any::Any;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct MockTransaction {
        conn: (),
    }

    impl Transaction for MockTransaction {
        fn connection(&mut self) -> &mut dyn Any {
            &mut self.conn
        }
        fn commit(&mut self) -> Result<()> {
            Ok(())
        }
        fn rollback(&mut self) -> Result<()> {
            Ok(())
        }
        fn close(&mut self) -> Result<()> {
            Ok(())
        }
    }

    struct CountingStore {
        query_calls: Arc<AtomicUsize>,
        update_calls: Arc<AtomicUsize>,
    }

    impl CountingStore {
        fn new() -> Self {
            Self {
                query_calls: Arc::new(AtomicUsize::new(0)),
                update_calls: Arc::new(AtomicUsize::new(0)),
            }
        }
    }

    impl BackingStore for CountingStore {
        fn run_query(
            &mut self,
            _transaction: &mut dyn Transaction,
            _statement: &MappedStatement,
            _parameter: &mut Value,
            _bounds: RowBounds,
            _bound_sql: &BoundSql,
        ) -> Result<Vec<Row>> {
            self.query_calls.fetch_add(1, Ordering::SeqCst);
            Ok(vec![Row::new(
                vec!["id".to_string()],
                vec![Value::BigInt(1)],
            )])
        }

        fn run_query_cursor(
            &mut self,
            _transaction: &mut dyn Transaction,
            _statement: &MappedStatement,
            _parameter: &Value,
            _bounds: RowBounds,
            _bound_sql: &BoundSql,
        ) -> Result<Cursor> {
            Ok(Cursor::from_rows(Vec::new()))
        }

        fn run_update(
            &mut self,
            _transaction: &mut dyn Transaction,
            _statement: &MappedStatement,
            _parameter: &mut Value,
            _bound_sql: &BoundSql,
        ) -> Result<u64> {
            self.update_calls.fetch_add(1, Ordering::SeqCst);
            Ok(1)
        }

        fn flush(
            &mut self,
            _transaction: &mut dyn Transaction,
            _is_rollback: bool,
        ) -> Result<Vec<BatchResult>> {
            Ok(Vec::new())
        }
    }

    fn caching_executor() -> (CachingExecutor, Arc<AtomicUsize>) {
        let store = CountingStore::new();
        let calls = Arc::clone(&store.query_calls);
        let base = BaseExecutor::new(
            Configuration::new(),
            Box::new(MockTransaction::default()),
            Box::new(store),
        );
        (CachingExecutor::new(Box::new(base)), calls)
    }

    fn cached_select(id: &str, cache: &Arc<dyn Cache>) -> MappedStatement {
        let source: Arc<dyn SqlSource> =
            Arc::new(RawSqlSource::from_sql("SELECT * FROM users WHERE id = #{id}").unwrap());
        MappedStatement::builder(id, source)
            .cache(Arc::clone(cache))
            .build()
    }

    fn shared_cache() -> Arc<dyn Cache> {
        Arc::new(PerpetualCache::new("users"))
    }

    #[test]
    fn committed_results_serve_other_units_of_work() {
        let shared = shared_cache();
        let ms = cached_select("findById", &shared);
        let mut parameter = map([("id", Value::BigInt(1))]);

        let (mut first, first_calls) = caching_executor();
        first
            .query(&ms, &mut parameter, RowBounds::DEFAULT)
            .unwrap();
        assert_eq!(first_calls.load(Ordering::SeqCst), 1);
        // Buffered only: nothing is visible to the shared cache yet.
        assert_eq!(shared.size(), 0);
        first.commit(true).unwrap();
        assert!(shared.get(&first.create_cache_key(
            &ms,
            &parameter,
            RowBounds::DEFAULT,
            &ms.bound_sql(&parameter).unwrap()
        ).unwrap()).unwrap().is_some());

        let (mut second, second_calls) = caching_executor();
        second
            .query(&ms, &mut parameter, RowBounds::DEFAULT)
            .unwrap();
        assert_eq!(second_calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn rolled_back_results_are_discarded() {
        let shared = shared_cache();
        let ms = cached_select("findById", &shared);
        let mut parameter = map([("id", Value::BigInt(1))]);

        let (mut first, _) = caching_executor();
        first
            .query(&ms, &mut parameter, RowBounds::DEFAULT)
            .unwrap();
        first.rollback(true).unwrap();
        assert_eq!(shared.size(), 0);

        let (mut second, second_calls) = caching_executor();
        second
            .query(&ms, &mut parameter, RowBounds::DEFAULT)
            .unwrap();
        assert_eq!(second_calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn use_cache_false_bypasses_second_level() {
        let shared = shared_cache();
        let source: Arc<dyn SqlSource> =
            Arc::new(RawSqlSource::from_sql("SELECT * FROM users WHERE id = #{id}").unwrap());
        let ms = MappedStatement::builder("findById", source)
            .cache(Arc::clone(&shared))
            .use_cache(false)
            .build();
        let mut parameter = map([("id", Value::BigInt(1))]);

        let (mut executor, _) = caching_executor();
        executor
            .query(&ms, &mut parameter, RowBounds::DEFAULT)
            .unwrap();
        executor.commit(true).unwrap();
        assert_eq!(shared.size(), 0);
    }

    #[test]
    fn statement_without_cache_delegates_directly() {
        let source: Arc<dyn SqlSource> =
            Arc::new(RawSqlSource::from_sql("SELECT * FROM users WHERE id = #{id}").unwrap());
        let ms = MappedStatement::builder("findById", source).build();
        let mut parameter = map([("id", Value::BigInt(1))]);

        let (mut executor, calls) = caching_executor();
        executor
            .query(&ms, &mut parameter, RowBounds::DEFAULT)
            .unwrap();
        // First-level cache still works underneath.
        executor
            .query(&ms, &mut parameter, RowBounds::DEFAULT)
            .unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn cached_callable_with_out_params_is_a_configuration_error() {
        let shared = shared_cache();
        let source: Arc<dyn SqlSource> = Arc::new(
            RawSqlSource::from_sql("CALL count_users(#{region}, #{count,mode=OUT})").unwrap(),
        );
        let ms = MappedStatement::builder("countUsers", source)
            .statement_type(StatementType::Callable)
            .cache(shared)
            .build();
        let mut parameter = map([("region", Value::from("eu"))]);

        let (mut executor, _) = caching_executor();
        let err = executor
            .query(&ms, &mut parameter, RowBounds::DEFAULT)
            .unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn flush_intent_is_deferred_to_commit() {
        let shared = shared_cache();
        let stale = {
            let mut key = CacheKey::new();
            key.update(Value::from("stale"));
            key
        };
        shared
            .put(stale.clone(), CacheEntry::Rows(Arc::new(Vec::new())))
            .unwrap();

        let source: Arc<dyn SqlSource> =
            Arc::new(RawSqlSource::from_sql("SELECT * FROM users WHERE id = #{id}").unwrap());
        let ms = MappedStatement::builder("findFresh", source)
            .cache(Arc::clone(&shared))
            .flush_cache_required(true)
            .build();
        let mut parameter = map([("id", Value::BigInt(1))]);

        let (mut executor, calls) = caching_executor();
        executor
            .query(&ms, &mut parameter, RowBounds::DEFAULT)
            .unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        // Clear-intent only: concurrent readers still see the old entry.
        assert!(shared.get(&stale).unwrap().is_some());

        executor.commit(true).unwrap();
        // The wipe lands at commit, before the fresh result flushes.
        assert!(shared.get(&stale).unwrap().is_none());
        assert_eq!(shared.size(), 1);
    }

    #[test]
    fn flushing_update_wipes_shared_cache_at_commit() {
        let shared = shared_cache();
        let stale = {
            let mut key = CacheKey::new();
            key.update(Value::from("stale"));
            key
        };
        shared
            .put(stale.clone(), CacheEntry::Rows(Arc::new(Vec::new())))
            .unwrap();

        let source: Arc<dyn SqlSource> =
            Arc::new(RawSqlSource::from_sql("DELETE FROM users WHERE id = #{id}").unwrap());
        let ms = MappedStatement::builder("deleteUser", source)
            .cache(Arc::clone(&shared))
            .flush_cache_required(true)
            .build();
        let mut parameter = map([("id", Value::BigInt(1))]);

        let (mut executor, _) = caching_executor();
        executor.update(&ms, &mut parameter).unwrap();
        assert!(shared.get(&stale).unwrap().is_some());
        executor.commit(true).unwrap();
        assert_eq!(shared.size(), 0);
    }

    #[test]
    fn repeated_reads_in_one_unit_hit_the_buffer_path() {
        let shared = shared_cache();
        let ms = cached_select("findById", &shared);
        let mut parameter = map([("id", Value::BigInt(1))]);

        let (mut executor, calls) = caching_executor();
        executor
            .query(&ms, &mut parameter, RowBounds::DEFAULT)
            .unwrap();
        // Second read misses the (unflushed) shared cache but hits the
        // first-level cache underneath.
        executor
            .query(&ms, &mut parameter, RowBounds::DEFAULT)
            .unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
