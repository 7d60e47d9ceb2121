//! Statement metadata.

use sqlmapper_cache::Cache;
use sqlmapper_core::{BoundSql, Result, Value};
use sqlmapper_scripting::SqlSource;
use std::sync::Arc;

/// How a statement reaches the backing store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StatementType {
    /// Prepared statement with positional parameters (the default)
    #[default]
    Prepared,
    /// Stored-procedure call; may carry output parameters
    Callable,
}

/// Pagination bounds for a query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RowBounds {
    offset: i64,
    limit: i64,
}

impl RowBounds {
    /// No pagination: offset 0, unbounded limit.
    pub const DEFAULT: RowBounds = RowBounds {
        offset: 0,
        limit: i64::MAX,
    };

    /// Bounds starting at `offset`, returning at most `limit` rows.
    #[must_use]
    pub fn new(offset: i64, limit: i64) -> Self {
        Self { offset, limit }
    }

    /// First row to return.
    pub fn offset(&self) -> i64 {
        self.offset
    }

    /// Maximum number of rows to return.
    pub fn limit(&self) -> i64 {
        self.limit
    }
}

impl Default for RowBounds {
    fn default() -> Self {
        Self::DEFAULT
    }
}

/// A declarative statement definition: id, SQL source, and the execution
/// flags the executors consult.
#[derive(Clone)]
pub struct MappedStatement {
    id: String,
    sql_source: Arc<dyn SqlSource>,
    statement_type: StatementType,
    flush_cache_required: bool,
    use_cache: bool,
    cache: Option<Arc<dyn Cache>>,
}

impl MappedStatement {
    /// Start building a statement.
    pub fn builder(
        id: impl Into<String>,
        sql_source: Arc<dyn SqlSource>,
    ) -> MappedStatementBuilder {
        MappedStatementBuilder {
            statement: MappedStatement {
                id: id.into(),
                sql_source,
                statement_type: StatementType::default(),
                flush_cache_required: false,
                use_cache: true,
                cache: None,
            },
        }
    }

    /// Statement identifier.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// How this statement reaches the backing store.
    pub fn statement_type(&self) -> StatementType {
        self.statement_type
    }

    /// Must caches be flushed before this statement runs?
    pub fn flush_cache_required(&self) -> bool {
        self.flush_cache_required
    }

    /// May this statement's results be served from the second-level cache?
    pub fn is_use_cache(&self) -> bool {
        self.use_cache
    }

    /// The shared second-level cache, when one is declared.
    pub fn cache(&self) -> Option<&Arc<dyn Cache>> {
        self.cache.as_ref()
    }

    /// Resolve this statement against a parameter object.
    pub fn bound_sql(&self, parameter: &Value) -> Result<BoundSql> {
        self.sql_source.bound_sql(parameter)
    }
}

impl std::fmt::Debug for MappedStatement {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MappedStatement")
            .field("id", &self.id)
            .field("statement_type", &self.statement_type)
            .field("flush_cache_required", &self.flush_cache_required)
            .field("use_cache", &self.use_cache)
            .field("cache", &self.cache.as_ref().map(|c| c.id().to_string()))
            .finish_non_exhaustive()
    }
}

/// Builder for [`MappedStatement`].
pub struct MappedStatementBuilder {
    statement: MappedStatement,
}

impl MappedStatementBuilder {
    /// Set the statement type.
    #[must_use]
    pub fn statement_type(mut self, statement_type: StatementType) -> Self {
        self.statement.statement_type = statement_type;
        self
    }

    /// Force a cache flush before this statement runs.
    #[must_use]
    pub fn flush_cache_required(mut self, required: bool) -> Self {
        self.statement.flush_cache_required = required;
        self
    }

    /// Permit or forbid second-level cache use for this statement.
    #[must_use]
    pub fn use_cache(mut self, use_cache: bool) -> Self {
        self.statement.use_cache = use_cache;
        self
    }

    /// Attach the shared second-level cache for this statement.
    #[must_use]
    pub fn cache(mut self, cache: Arc<dyn Cache>) -> Self {
        self.statement.cache = Some(cache);
        self
    }

    /// Finish the statement.
    pub fn build(self) -> MappedStatement {
        self.statement
    }
}
