//! SqlMapper Rust: a statement mapping and execution engine.
//!
//! This facade crate re-exports the public surface of the workspace:
//!
//! - `sqlmapper-core` — values, rows, bound statements, configuration,
//!   errors, the transaction and type-handler seams
//! - `sqlmapper-cache` — cache keys, cache tiers, and decorators
//! - `sqlmapper-scripting` — dynamic SQL trees and SQL sources
//! - `sqlmapper-executor` — the executors and statement metadata
//!
//! # Example
//!
//! ```ignore
//! use sqlmapper::prelude::*;
//!
//! let statement = MappedStatement::builder(
//!     "findAdults",
//!     Arc::new(DynamicSqlSource::new(
//!         SqlNode::mixed([
//!             SqlNode::text("SELECT * FROM users"),
//!             SqlNode::where_clause(SqlNode::if_then(
//!                 Expr::prop("minAge").is_not_null(),
//!                 SqlNode::text("AND age >= #{minAge}"),
//!             )),
//!         ]),
//!         Arc::new(FragmentRegistry::new()),
//!     )),
//! )
//! .build();
//!
//! let mut executor = build_executor(Configuration::new(), transaction, store);
//! let rows = executor.query(&statement, &mut parameter, RowBounds::DEFAULT)?;
//! ```

pub use sqlmapper_core::{
    BoundSql, CacheError, CacheErrorKind, ColumnInfo, ConfigError, Configuration,
    DefaultTypeHandler, Error, ExecutorError, ExecutorErrorKind, LocalCacheScope,
    ParameterBinding, ParameterMode, ParameterSink, Result, Row, ScriptError, ScriptErrorKind,
    SqlType, StoreError, Transaction, TransactionError, TypeError, TypeHandler, Value,
};

pub use sqlmapper_cache::{
    BlockingCache, Cache, CacheEntry, CacheKey, PerpetualCache, TransactionalCache,
};

pub use sqlmapper_scripting::{
    BinaryOp, DynamicContext, DynamicSqlSource, Expr, Foreach, FragmentRegistry, RawSqlSource,
    SqlNode, SqlSource, StaticSqlSource, Trim, UnaryOp,
};

pub use sqlmapper_executor::{
    BackingStore, BaseExecutor, BatchResult, CachingExecutor, Cursor, Executor, MappedStatement,
    MappedStatementBuilder, ResultRef, RowBounds, StatementType, TransactionalCacheManager,
    build_executor,
};

/// Commonly used items in one import.
pub mod prelude {
    pub use crate::{
        BackingStore, BoundSql, Cache, CacheEntry, CacheKey, Configuration, DynamicSqlSource,
        Error, Executor, Expr, FragmentRegistry, LocalCacheScope, MappedStatement, ParameterMode,
        RawSqlSource, Result, Row, RowBounds, SqlNode, SqlSource, StatementType, Transaction,
        Value, build_executor,
    };
    pub use std::sync::Arc;
}
