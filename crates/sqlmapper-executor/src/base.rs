//! The base executor: first-level cache, placeholder protocol, deferred
//! nested loads, and transaction lifecycle.

use crate::backing::{BackingStore, BatchResult, Cursor};
use crate::statement::{MappedStatement, RowBounds, StatementType};
use crate::{Executor, ResultRef};
use sqlmapper_cache::{Cache, CacheEntry, CacheKey, PerpetualCache};
use sqlmapper_core::property::{get_path, set_path};
use sqlmapper_core::{
    BoundSql, Configuration, Error, LocalCacheScope, ParameterMode, Result, Row, Transaction,
    Value,
};
use std::collections::VecDeque;
use std::sync::Arc;

/// A queued nested-property resolution.
///
/// May only materialize once its key holds a real result; while the key is
/// absent or still the in-flight placeholder it stays queued.
struct DeferredLoad {
    target: ResultRef,
    property: String,
    key: CacheKey,
    many: bool,
}

impl DeferredLoad {
    fn can_load(&self, cache: &PerpetualCache) -> bool {
        matches!(cache.get(&self.key), Ok(Some(entry)) if entry.is_hit())
    }

    fn load(&self, cache: &PerpetualCache) -> Result<()> {
        let entry = cache.get(&self.key)?;
        let rows = entry.and_then(|e| e.rows()).ok_or_else(|| {
            Error::usage(format!(
                "deferred load for '{}' resolved before its query completed",
                self.property
            ))
        })?;
        let value = extract_result(&rows, self.many)?;
        let mut target = self.target.write().unwrap_or_else(|e| e.into_inner());
        set_path(&mut target, &self.property, value)
    }
}

/// Shape a cached result set into a deferred property value.
fn extract_result(rows: &[Row], many: bool) -> Result<Value> {
    if many {
        return Ok(Value::Array(rows.iter().map(Row::to_value).collect()));
    }
    match rows.len() {
        0 => Ok(Value::Null),
        1 => Ok(rows[0].to_value()),
        n => Err(Error::usage(format!(
            "statement returned {n} rows where one or none was expected"
        ))),
    }
}

/// Executor over a single unit of work.
///
/// Owns the first-level cache outright. Query results are keyed by
/// [`CacheKey`]; before each backing-store round-trip the key is mapped to
/// an in-flight placeholder so nested invocations reaching the same key
/// defer instead of re-executing, and the placeholder is removed again even
/// when the store call fails. Deferred loads queue until the outermost call
/// in a nesting chain completes, which guarantees every nested entry they
/// read has materialized.
pub struct BaseExecutor {
    configuration: Configuration,
    transaction: Box<dyn Transaction>,
    store: Box<dyn BackingStore>,
    local_cache: PerpetualCache,
    local_output_parameter_cache: PerpetualCache,
    deferred_loads: VecDeque<DeferredLoad>,
    query_stack: usize,
    closed: bool,
}

impl BaseExecutor {
    /// Create an executor over a transaction resource and a backing store.
    pub fn new(
        configuration: Configuration,
        transaction: Box<dyn Transaction>,
        store: Box<dyn BackingStore>,
    ) -> Self {
        Self {
            configuration,
            transaction,
            store,
            local_cache: PerpetualCache::new("LocalCache"),
            local_output_parameter_cache: PerpetualCache::new("LocalOutputParameterCache"),
            deferred_loads: VecDeque::new(),
            query_stack: 0,
            closed: false,
        }
    }

    fn check_open(&self, what: &str) -> Result<()> {
        if self.closed {
            return Err(Error::closed(what));
        }
        Ok(())
    }

    fn query_checked(
        &mut self,
        statement: &MappedStatement,
        parameter: &mut Value,
        bounds: RowBounds,
        key: &CacheKey,
        bound_sql: &BoundSql,
    ) -> Result<Arc<Vec<Row>>> {
        if let Some(entry) = self.local_cache.get(key)? {
            if let Some(rows) = entry.rows() {
                tracing::debug!(
                    statement = statement.id(),
                    "serving query from the local cache"
                );
                self.handle_locally_cached_output_parameters(
                    statement, key, parameter, bound_sql,
                )?;
                return Ok(rows);
            }
        }
        self.query_from_database(statement, parameter, bounds, key, bound_sql)
    }

    /// Install the in-flight placeholder, run the store call, then replace
    /// the placeholder with the real result.
    ///
    /// The placeholder is removed even when the call fails, so a failed
    /// nested query never leaves a permanent false in-progress marker.
    fn query_from_database(
        &mut self,
        statement: &MappedStatement,
        parameter: &mut Value,
        bounds: RowBounds,
        key: &CacheKey,
        bound_sql: &BoundSql,
    ) -> Result<Arc<Vec<Row>>> {
        tracing::debug!(
            statement = statement.id(),
            sql = bound_sql.sql(),
            depth = self.query_stack,
            "executing query"
        );
        self.local_cache.put(key.clone(), CacheEntry::Pending)?;
        let outcome = self
            .store
            .run_query(&mut *self.transaction, statement, parameter, bounds, bound_sql);
        let _ = self.local_cache.remove(key)?;
        let rows = Arc::new(outcome?);
        self.local_cache
            .put(key.clone(), CacheEntry::Rows(Arc::clone(&rows)))?;
        if statement.statement_type() == StatementType::Callable {
            self.local_output_parameter_cache
                .put(key.clone(), CacheEntry::Parameter(parameter.clone()))?;
        }
        Ok(rows)
    }

    /// On a first-level hit for a stored-procedure call, copy the cached
    /// output-parameter values into the caller's parameter object.
    fn handle_locally_cached_output_parameters(
        &self,
        statement: &MappedStatement,
        key: &CacheKey,
        parameter: &mut Value,
        bound_sql: &BoundSql,
    ) -> Result<()> {
        if statement.statement_type() != StatementType::Callable || parameter.is_null() {
            return Ok(());
        }
        let Some(CacheEntry::Parameter(cached)) = self.local_output_parameter_cache.get(key)?
        else {
            return Ok(());
        };
        for binding in bound_sql.bindings() {
            if binding.parameter_mode().is_output() {
                let name = binding.property();
                let value = get_path(&cached, name).unwrap_or(Value::Null);
                set_path(parameter, name, value)?;
            }
        }
        Ok(())
    }

    fn flush_statements_internal(&mut self, is_rollback: bool) -> Result<Vec<BatchResult>> {
        self.check_open("flush statements")?;
        self.store.flush(&mut *self.transaction, is_rollback)
    }

    fn rollback_internal(&mut self, required: bool) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.clear_local_cache();
        let flushed = self.flush_statements_internal(true).map(|_| ());
        let rolled_back = if required {
            self.transaction.rollback()
        } else {
            Ok(())
        };
        flushed?;
        rolled_back
    }
}

impl Executor for BaseExecutor {
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
        self.check_open("query")?;
        if self.query_stack == 0 && statement.flush_cache_required() {
            self.clear_local_cache();
        }
        self.query_stack += 1;
        let result = self.query_checked(statement, parameter, bounds, &key, bound_sql);
        self.query_stack -= 1;
        let rows = result?;
        if self.query_stack == 0 {
            // The outermost call has completed, so every nested entry a
            // deferred load can reach has materialized.
            let drained: Vec<DeferredLoad> = self.deferred_loads.drain(..).collect();
            for load in drained {
                load.load(&self.local_cache)?;
            }
            if self.configuration.local_cache_scope == LocalCacheScope::Statement {
                self.clear_local_cache();
            }
        }
        Ok(rows)
    }

    fn query_cursor(
        &mut self,
        statement: &MappedStatement,
        parameter: &Value,
        bounds: RowBounds,
    ) -> Result<Cursor> {
        self.check_open("query cursor")?;
        let bound_sql = statement.bound_sql(parameter)?;
        self.store
            .run_query_cursor(&mut *self.transaction, statement, parameter, bounds, &bound_sql)
    }

    fn update(&mut self, statement: &MappedStatement, parameter: &mut Value) -> Result<u64> {
        self.check_open("update")?;
        tracing::debug!(statement = statement.id(), "executing update");
        self.clear_local_cache();
        let bound_sql = statement.bound_sql(parameter)?;
        self.store
            .run_update(&mut *self.transaction, statement, parameter, &bound_sql)
    }

    fn flush_statements(&mut self) -> Result<Vec<BatchResult>> {
        self.flush_statements_internal(false)
    }

    fn commit(&mut self, required: bool) -> Result<()> {
        if self.closed {
            return Err(Error::usage("cannot commit, executor is already closed"));
        }
        self.clear_local_cache();
        self.flush_statements_internal(false)?;
        if required {
            self.transaction.commit()?;
        }
        Ok(())
    }

    fn rollback(&mut self, required: bool) -> Result<()> {
        self.rollback_internal(required)
    }

    fn close(&mut self, force_rollback: bool) {
        if self.closed {
            return;
        }
        if let Err(error) = self.rollback_internal(force_rollback) {
            tracing::warn!(%error, "unexpected error rolling back while closing executor");
        }
        if let Err(error) = self.transaction.close() {
            tracing::warn!(%error, "unexpected error closing transaction");
        }
        self.deferred_loads.clear();
        let _ = self.local_cache.clear();
        let _ = self.local_output_parameter_cache.clear();
        self.closed = true;
    }

    fn is_closed(&self) -> bool {
        self.closed
    }

    fn create_cache_key(
        &self,
        statement: &MappedStatement,
        parameter: &Value,
        bounds: RowBounds,
        bound_sql: &BoundSql,
    ) -> Result<CacheKey> {
        self.check_open("create cache key")?;
        let mut key = CacheKey::new();
        key.update(Value::from(statement.id()));
        key.update(Value::BigInt(bounds.offset()));
        key.update(Value::BigInt(bounds.limit()));
        key.update(Value::from(bound_sql.sql()));
        for binding in bound_sql.bindings() {
            if binding.parameter_mode() != ParameterMode::Out {
                key.update(bound_sql.resolve_binding(parameter, binding.property()));
            }
        }
        if let Some(environment) = &self.configuration.environment {
            key.update(Value::from(environment.as_str()));
        }
        Ok(key)
    }

    fn is_cached(&self, _statement: &MappedStatement, key: &CacheKey) -> bool {
        matches!(self.local_cache.get(key), Ok(Some(_)))
    }

    fn defer_load(
        &mut self,
        target: ResultRef,
        property: &str,
        key: CacheKey,
        many: bool,
    ) -> Result<()> {
        self.check_open("defer load")?;
        let load = DeferredLoad {
            target,
            property: property.to_string(),
            key,
            many,
        };
        if load.can_load(&self.local_cache) {
            load.load(&self.local_cache)
        } else {
            self.deferred_loads.push_back(load);
            Ok(())
        }
    }

    fn clear_local_cache(&mut self) {
        if !self.closed {
            let _ = self.local_cache.clear();
            let _ = self.local_output_parameter_cache.clear();
        }
    }

    fn transaction_mut(&mut self) -> Result<&mut dyn Transaction> {
        self.check_open("access transaction")?;
        Ok(&mut *self.transaction)
    }
}
