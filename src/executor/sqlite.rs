//! rusqlite-backed store.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use rusqlite::types::{ToSqlOutput, ValueRef};
use rusqlite::{Connection, ToSql};
use serde_json::{Number, Value};

use super::{PoolGate, PoolOptions, QueryStore, RowSet, StoreError, StoreResult};
use crate::sql::{Dialect, SqlValue};

/// How long a connection waits on a locked database file.
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

impl ToSql for SqlValue {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(match self {
            SqlValue::Text(s) => ToSqlOutput::from(s.as_str()),
            SqlValue::Number(n) => ToSqlOutput::from(*n),
        })
    }
}

/// A pool of SQLite connections to one database file.
///
/// Connections are opened on demand up to `max_open_conns` and reused.
/// Each statement runs on the blocking thread pool; one that outlives the
/// query timeout is interrupted through its connection's interrupt handle.
///
/// Every connection opens the file independently, so `:memory:` gives each
/// one its own empty database. Use a file path.
pub struct SqliteStore {
    path: PathBuf,
    idle: Arc<Mutex<Vec<Connection>>>,
    gate: PoolGate,
    query_timeout: Duration,
}

impl SqliteStore {
    /// Open the database at `path`, checking that it can be opened.
    pub fn open(path: impl AsRef<Path>, options: PoolOptions) -> StoreResult<Self> {
        let path = path.as_ref().to_path_buf();
        let first = open_connection(&path)?;
        Ok(Self {
            path,
            idle: Arc::new(Mutex::new(vec![first])),
            gate: PoolGate::new(&options),
            query_timeout: options.query_timeout,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn checkout(&self) -> StoreResult<Connection> {
        let reused = self
            .idle
            .lock()
            .map_err(|_| StoreError::Closed)?
            .pop();
        match reused {
            Some(conn) => Ok(conn),
            None => Ok(open_connection(&self.path)?),
        }
    }

    fn checkin(&self, conn: Connection) {
        match self.idle.lock() {
            Ok(mut idle) => idle.push(conn),
            Err(_) => tracing::warn!("sqlite pool lock poisoned; dropping connection"),
        }
    }
}

fn open_connection(path: &Path) -> rusqlite::Result<Connection> {
    let conn = Connection::open(path)?;
    conn.busy_timeout(BUSY_TIMEOUT)?;
    Ok(conn)
}

#[async_trait]
impl QueryStore for SqliteStore {
    fn dialect(&self) -> Dialect {
        Dialect::Sqlite
    }

    async fn fetch(&self, sql: &str, params: &[SqlValue]) -> StoreResult<RowSet> {
        let _permit = self.gate.acquire().await?;
        let conn = self.checkout()?;
        let interrupt = conn.get_interrupt_handle();

        let sql = sql.to_owned();
        let params = params.to_vec();
        let mut task = tokio::task::spawn_blocking(move || {
            let result = run_query(&conn, &sql, &params);
            (conn, result)
        });

        let (conn, result) = match tokio::time::timeout(self.query_timeout, &mut task).await {
            Ok(joined) => joined.map_err(|e| StoreError::Task(e.to_string()))?,
            Err(_) => {
                interrupt.interrupt();
                let (conn, _) = task.await.map_err(|e| StoreError::Task(e.to_string()))?;
                self.checkin(conn);
                return Err(StoreError::QueryTimeout(self.query_timeout));
            }
        };

        self.checkin(conn);
        Ok(result?)
    }
}

fn run_query(conn: &Connection, sql: &str, params: &[SqlValue]) -> rusqlite::Result<RowSet> {
    let mut stmt = conn.prepare(sql)?;
    let columns: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();

    let mut rows = stmt.query(rusqlite::params_from_iter(params.iter()))?;
    let mut out = Vec::new();
    while let Some(row) = rows.next()? {
        let mut values = Vec::with_capacity(columns.len());
        for i in 0..columns.len() {
            values.push(json_value(row.get_ref(i)?));
        }
        out.push(values);
    }

    Ok(RowSet { columns, rows: out })
}

fn json_value(value: ValueRef<'_>) -> Value {
    match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(i) => Value::from(i),
        ValueRef::Real(f) => Number::from_f64(f).map(Value::Number).unwrap_or(Value::Null),
        ValueRef::Text(bytes) | ValueRef::Blob(bytes) => {
            Value::String(String::from_utf8_lossy(bytes).into_owned())
        }
    }
}
