//! Statement execution.
//!
//! A [`QueryStore`] runs one parameterized statement and hands back raw
//! rows. The [`Executor`] wraps a store: it times the call, keys each row by
//! column name, and normalizes measure values to plain JSON numbers.
//!
//! Two stores ship with the crate:
//!
//! - [`SqliteStore`]: in-process rusqlite connections.
//! - [`WorkerStore`]: statements forwarded to the database worker
//!   (Postgres, DuckDB).
//!
//! Both bound concurrency the same way: a semaphore sized to the pool, with
//! callers waiting at most the acquire timeout for a permit.

mod sqlite;
mod worker;

use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde_json::{Map, Number, Value};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use crate::compile::CompiledQuery;
use crate::sql::{Dialect, SqlValue};
use crate::worker::WorkerError;

pub use sqlite::SqliteStore;
pub use worker::WorkerStore;

/// One result row keyed by column name, in select-list order.
pub type Row = Map<String, Value>;

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Anything that can go wrong running a statement.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("no connection became free within {0:?}")]
    AcquireTimeout(Duration),

    #[error("query did not finish within {0:?} and was interrupted")]
    QueryTimeout(Duration),

    #[error("connection pool is closed")]
    Closed,

    #[error("sqlite: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error(transparent)]
    Worker(#[from] WorkerError),

    #[error("blocking task failed: {0}")]
    Task(String),

    #[error("row has {found} values for {expected} columns")]
    RowShape { expected: usize, found: usize },
}

/// Raw statement output.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RowSet {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Value>>,
}

/// A database that runs parameterized SELECT statements.
#[async_trait]
pub trait QueryStore: Send + Sync {
    /// Dialect statements for this store must be compiled for.
    fn dialect(&self) -> Dialect;

    /// Run `sql` with `params` bound to its placeholders, in order.
    async fn fetch(&self, sql: &str, params: &[SqlValue]) -> StoreResult<RowSet>;
}

// ============================================================================
// Pool limits
// ============================================================================

/// Concurrency and timeout limits for a store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolOptions {
    pub max_open_conns: usize,
    pub acquire_timeout: Duration,
    pub query_timeout: Duration,
}

impl Default for PoolOptions {
    fn default() -> Self {
        Self {
            max_open_conns: 4,
            acquire_timeout: Duration::from_secs(5),
            query_timeout: Duration::from_secs(30),
        }
    }
}

/// Admission control shared by the stores.
#[derive(Debug, Clone)]
pub(crate) struct PoolGate {
    permits: Arc<Semaphore>,
    acquire_timeout: Duration,
}

impl PoolGate {
    pub(crate) fn new(options: &PoolOptions) -> Self {
        Self {
            permits: Arc::new(Semaphore::new(options.max_open_conns.max(1))),
            acquire_timeout: options.acquire_timeout,
        }
    }

    /// Wait for a free slot, up to the acquire timeout.
    pub(crate) async fn acquire(&self) -> StoreResult<OwnedSemaphorePermit> {
        match tokio::time::timeout(self.acquire_timeout, self.permits.clone().acquire_owned()).await
        {
            Ok(Ok(permit)) => Ok(permit),
            Ok(Err(_)) => Err(StoreError::Closed),
            Err(_) => Err(StoreError::AcquireTimeout(self.acquire_timeout)),
        }
    }
}

// ============================================================================
// Executor
// ============================================================================

/// Rows produced by one execution.
#[derive(Debug, Clone, Default)]
pub struct ExecutionOutput {
    pub rows: Vec<Row>,
    pub elapsed: Duration,
}

/// Runs compiled statements against a store.
#[derive(Clone)]
pub struct Executor {
    store: Arc<dyn QueryStore>,
}

impl Executor {
    pub fn new(store: Arc<dyn QueryStore>) -> Self {
        Self { store }
    }

    pub fn dialect(&self) -> Dialect {
        self.store.dialect()
    }

    /// Execute once. No retries.
    pub async fn run(&self, compiled: &CompiledQuery) -> StoreResult<ExecutionOutput> {
        let started = Instant::now();
        let set = self.store.fetch(&compiled.sql, &compiled.params).await?;
        let elapsed = started.elapsed();

        let measures: HashSet<&str> = compiled.measure_keys().collect();
        let rows = key_rows(set, &measures)?;

        Ok(ExecutionOutput { rows, elapsed })
    }
}

fn key_rows(set: RowSet, measures: &HashSet<&str>) -> StoreResult<Vec<Row>> {
    let RowSet { columns, rows } = set;
    rows.into_iter()
        .map(|values| {
            if values.len() != columns.len() {
                return Err(StoreError::RowShape {
                    expected: columns.len(),
                    found: values.len(),
                });
            }
            Ok(columns
                .iter()
                .zip(values)
                .map(|(name, value)| {
                    let value = if measures.contains(name.as_str()) {
                        normalize_number(value)
                    } else {
                        value
                    };
                    (name.clone(), value)
                })
                .collect())
        })
        .collect()
}

/// Turn numeric strings (decimals, big integers sent as text) into JSON numbers.
///
/// Anything that does not parse is returned unchanged.
pub fn normalize_number(value: Value) -> Value {
    let Value::String(text) = &value else {
        return value;
    };
    let text = text.trim();
    if let Ok(n) = text.parse::<i64>() {
        return Value::from(n);
    }
    match text.parse::<f64>().ok().and_then(Number::from_f64) {
        Some(n) => Value::Number(n),
        None => value,
    }
}

/// Read a JSON cell as a float: numbers directly, numeric strings parsed,
/// everything else 0.
pub fn as_f64(value: Option<&Value>) -> f64 {
    match value {
        Some(Value::Number(n)) => n.as_f64().unwrap_or(0.0),
        Some(Value::String(s)) => s.trim().parse().unwrap_or(0.0),
        _ => 0.0,
    }
}
