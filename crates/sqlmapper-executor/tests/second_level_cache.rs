//! Concurrency behavior of the shared second-level cache: two units of
//! work racing on the same key coordinate through the blocking decorator.

use sqlmapper_cache::{BlockingCache, Cache, PerpetualCache};
use sqlmapper_core::{BoundSql, Configuration, Result, Row, Transaction, Value};
use sqlmapper_core::value::map;
use sqlmapper_executor::{
    BackingStore, BatchResult, CachingExecutor, BaseExecutor, Cursor, Executor, MappedStatement,
    RowBounds,
};
use sqlmapper_scripting::{RawSqlSource, SqlSource};
use std::any::Any;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{mpsc, Arc};
use std::thread;
use std::time::Duration;

#[derive(Default)]
struct NoopTransaction {
    conn: (),
}

impl Transaction for NoopTransaction {
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

/// Counts round-trips and optionally stalls inside the store call so the
/// test can overlap two units of work deterministically.
struct SlowStore {
    calls: Arc<AtomicUsize>,
    delay: Duration,
}

impl BackingStore for SlowStore {
    fn run_query(
        &mut self,
        _transaction: &mut dyn Transaction,
        _statement: &MappedStatement,
        _parameter: &mut Value,
        _bounds: RowBounds,
        _bound_sql: &BoundSql,
    ) -> Result<Vec<Row>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        thread::sleep(self.delay);
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
        Ok(0)
    }

    fn flush(
        &mut self,
        _transaction: &mut dyn Transaction,
        _is_rollback: bool,
    ) -> Result<Vec<BatchResult>> {
        Ok(Vec::new())
    }
}

fn executor_over(shared_calls: &Arc<AtomicUsize>, delay: Duration) -> CachingExecutor {
    let base = BaseExecutor::new(
        Configuration::new(),
        Box::new(NoopTransaction::default()),
        Box::new(SlowStore {
            calls: Arc::clone(shared_calls),
            delay,
        }),
    );
    CachingExecutor::new(Box::new(base))
}

fn cached_statement(shared: &Arc<dyn Cache>) -> MappedStatement {
    let source: Arc<dyn SqlSource> =
        Arc::new(RawSqlSource::from_sql("SELECT * FROM users WHERE id = #{id}").unwrap());
    MappedStatement::builder("findById", source)
        .cache(Arc::clone(shared))
        .build()
}

#[test]
fn loser_waits_and_reads_the_winners_committed_value() {
    let shared: Arc<dyn Cache> = Arc::new(BlockingCache::new(Arc::new(PerpetualCache::new(
        "users",
    ))));
    let statement = Arc::new(cached_statement(&shared));

    let winner_calls = Arc::new(AtomicUsize::new(0));
    let loser_calls = Arc::new(AtomicUsize::new(0));
    let (winner_running_tx, winner_running_rx) = mpsc::channel();
    let (loser_done_tx, loser_done_rx) = mpsc::channel();

    let winner = {
        let statement = Arc::clone(&statement);
        let calls = Arc::clone(&winner_calls);
        thread::spawn(move || {
            let mut executor = executor_over(&calls, Duration::from_millis(50));
            let mut parameter = map([("id", Value::BigInt(1))]);
            // Miss on the shared cache: this thread now owns the key lock.
            executor
                .query(&statement, &mut parameter, RowBounds::DEFAULT)
                .unwrap();
            winner_running_tx.send(()).unwrap();
            thread::sleep(Duration::from_millis(100));
            executor.commit(true).unwrap();
        })
    };

    winner_running_rx.recv().unwrap();
    let loser = {
        let statement = Arc::clone(&statement);
        let calls = Arc::clone(&loser_calls);
        thread::spawn(move || {
            let mut executor = executor_over(&calls, Duration::ZERO);
            let mut parameter = map([("id", Value::BigInt(1))]);
            // Blocks on the key lock until the winner commits.
            let rows = executor
                .query(&statement, &mut parameter, RowBounds::DEFAULT)
                .unwrap();
            loser_done_tx.send(rows.len()).unwrap();
            executor.commit(true).unwrap();
        })
    };

    // The loser cannot finish before the winner commits.
    assert!(
        loser_done_rx
            .recv_timeout(Duration::from_millis(50))
            .is_err()
    );

    winner.join().unwrap();
    let rows = loser_done_rx.recv_timeout(Duration::from_secs(5)).unwrap();
    loser.join().unwrap();

    assert_eq!(rows, 1);
    assert_eq!(winner_calls.load(Ordering::SeqCst), 1);
    // Exactly one unit of work invoked the backing store.
    assert_eq!(loser_calls.load(Ordering::SeqCst), 0);
}

#[test]
fn loser_computes_itself_after_the_winner_rolls_back() {
    let shared: Arc<dyn Cache> = Arc::new(BlockingCache::new(Arc::new(PerpetualCache::new(
        "users",
    ))));
    let statement = Arc::new(cached_statement(&shared));

    let winner_calls = Arc::new(AtomicUsize::new(0));
    let loser_calls = Arc::new(AtomicUsize::new(0));
    let (winner_running_tx, winner_running_rx) = mpsc::channel();

    let winner = {
        let statement = Arc::clone(&statement);
        let calls = Arc::clone(&winner_calls);
        thread::spawn(move || {
            let mut executor = executor_over(&calls, Duration::ZERO);
            let mut parameter = map([("id", Value::BigInt(1))]);
            executor
                .query(&statement, &mut parameter, RowBounds::DEFAULT)
                .unwrap();
            winner_running_tx.send(()).unwrap();
            thread::sleep(Duration::from_millis(100));
            // Nothing reaches the shared cache; the key lock is released
            // by removal.
            executor.rollback(true).unwrap();
        })
    };

    winner_running_rx.recv().unwrap();
    let loser = {
        let statement = Arc::clone(&statement);
        let calls = Arc::clone(&loser_calls);
        thread::spawn(move || {
            let mut executor = executor_over(&calls, Duration::ZERO);
            let mut parameter = map([("id", Value::BigInt(1))]);
            let rows = executor
                .query(&statement, &mut parameter, RowBounds::DEFAULT)
                .unwrap();
            executor.commit(true).unwrap();
            rows.len()
        })
    };

    winner.join().unwrap();
    let rows = loser.join().unwrap();

    assert_eq!(rows, 1);
    assert_eq!(winner_calls.load(Ordering::SeqCst), 1);
    // The winner's result was discarded, so the loser had to compute.
    assert_eq!(loser_calls.load(Ordering::SeqCst), 1);
}
