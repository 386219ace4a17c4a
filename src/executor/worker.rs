//! Store that forwards statements to the database worker.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Number, Value};

use super::{PoolGate, PoolOptions, QueryStore, RowSet, StoreResult};
use crate::config::Driver;
use crate::sql::{Dialect, SqlValue};
use crate::worker::WorkerClient;

/// Runs statements through `query.execute` on a [`WorkerClient`].
///
/// The worker owns the real connection pool; this store only caps how many
/// statements it has in flight at once.
pub struct WorkerStore {
    client: Arc<WorkerClient>,
    driver: Driver,
    connection_string: String,
    gate: PoolGate,
}

impl WorkerStore {
    pub fn new(
        client: Arc<WorkerClient>,
        driver: Driver,
        connection_string: impl Into<String>,
        options: PoolOptions,
    ) -> Self {
        Self {
            client,
            driver,
            connection_string: connection_string.into(),
            gate: PoolGate::new(&options),
        }
    }

    pub fn driver(&self) -> Driver {
        self.driver
    }
}

/// Positional argument as the worker expects it.
fn worker_arg(value: &SqlValue) -> Value {
    match value {
        SqlValue::Text(s) => Value::String(s.clone()),
        SqlValue::Number(n) => Number::from_f64(*n).map(Value::Number).unwrap_or(Value::Null),
    }
}

#[async_trait]
impl QueryStore for WorkerStore {
    fn dialect(&self) -> Dialect {
        self.driver.dialect()
    }

    async fn fetch(&self, sql: &str, params: &[SqlValue]) -> StoreResult<RowSet> {
        let _permit = self.gate.acquire().await?;
        let args = params.iter().map(worker_arg).collect();
        let response = self
            .client
            .execute_query(self.driver.as_str(), &self.connection_string, sql, args)
            .await?;

        Ok(RowSet {
            columns: response.columns.into_iter().map(|c| c.name).collect(),
            rows: response.rows,
        })
    }
}
