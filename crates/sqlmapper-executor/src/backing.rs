//! The backing-store call seam.

use crate::statement::{MappedStatement, RowBounds};
use sqlmapper_core::{BoundSql, Result, Row, Transaction, Value};

/// A lazily-iterated result stream.
///
/// Cursor queries bypass both cache tiers; rows are mapped as the caller
/// advances the iterator.
pub struct Cursor {
    rows: Box<dyn Iterator<Item = Result<Row>> + Send>,
}

impl Cursor {
    /// Wrap a row iterator.
    pub fn new(rows: impl Iterator<Item = Result<Row>> + Send + 'static) -> Self {
        Self {
            rows: Box::new(rows),
        }
    }

    /// Cursor over an already-materialized result set.
    pub fn from_rows(rows: Vec<Row>) -> Self {
        Self::new(rows.into_iter().map(Ok))
    }
}

impl Iterator for Cursor {
    type Item = Result<Row>;

    fn next(&mut self) -> Option<Self::Item> {
        self.rows.next()
    }
}

impl std::fmt::Debug for Cursor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Cursor").finish_non_exhaustive()
    }
}

/// Outcome of one batched statement drained by a flush.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchResult {
    /// Statement id the batch was built for
    pub statement_id: String,
    /// The SQL the batch executed
    pub sql: String,
    /// Rows affected per batched parameter set
    pub update_counts: Vec<u64>,
}

/// The raw statement-execution primitives an executor delegates to.
///
/// Implementations perform the actual round-trips and raw-row mapping;
/// the executors own everything above this line: cache keys, the
/// first-level cache placeholder protocol, deferred loads, and the
/// second-level transactional overlay.
pub trait BackingStore: Send {
    /// Run a query and materialize its rows.
    fn run_query(
        &mut self,
        transaction: &mut dyn Transaction,
        statement: &MappedStatement,
        parameter: &mut Value,
        bounds: RowBounds,
        bound_sql: &BoundSql,
    ) -> Result<Vec<Row>>;

    /// Run a query, returning a lazy cursor over its rows.
    fn run_query_cursor(
        &mut self,
        transaction: &mut dyn Transaction,
        statement: &MappedStatement,
        parameter: &Value,
        bounds: RowBounds,
        bound_sql: &BoundSql,
    ) -> Result<Cursor>;

    /// Run an insert/update/delete, returning rows affected.
    fn run_update(
        &mut self,
        transaction: &mut dyn Transaction,
        statement: &MappedStatement,
        parameter: &mut Value,
        bound_sql: &BoundSql,
    ) -> Result<u64>;

    /// Drain batched-but-unexecuted statements.
    ///
    /// With `is_rollback` set, pending batches are discarded instead of
    /// executed.
    fn flush(
        &mut self,
        transaction: &mut dyn Transaction,
        is_rollback: bool,
    ) -> Result<Vec<BatchResult>>;
}
