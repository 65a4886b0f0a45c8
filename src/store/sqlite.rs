use super::{checked_unsigned, insert_sql, update_sql, RecordStore, StoreResult, SCHEMA_SQL};
use crate::error::StoreError;
use crate::model::{RecordId, RecordKind, Row, Value};
use async_trait::async_trait;
use rusqlite::types::Value as SqlValue;
use rusqlite::{params_from_iter, Connection};
use std::path::Path;
use std::sync::{Arc, Mutex};
use tracing::{debug, info};

/// Record store backed by a local SQLite database.
///
/// A single connection is shared behind a mutex; statements run on tokio's blocking pool so
/// a slow disk never stalls the request executor.
#[derive(Clone)]
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    pub fn open<P: AsRef<Path>>(path: P) -> StoreResult<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(StoreError::database)?;
        }
        let conn = Connection::open(path).map_err(StoreError::database)?;
        conn.execute_batch("PRAGMA journal_mode=WAL;")
            .map_err(StoreError::database)?;

        info!("Opened SQLite record store at {}", path.display());
        Self::with_connection(conn)
    }

    pub fn open_in_memory() -> StoreResult<Self> {
        let conn = Connection::open_in_memory().map_err(StoreError::database)?;
        Self::with_connection(conn)
    }

    fn with_connection(conn: Connection) -> StoreResult<Self> {
        conn.execute_batch(SCHEMA_SQL)
            .map_err(StoreError::database)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    async fn run<T, F>(&self, f: F) -> StoreResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> StoreResult<T> + Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let conn = conn.lock().map_err(StoreError::unavailable)?;
            f(&conn)
        })
        .await
        .map_err(StoreError::unavailable)?
    }
}

fn to_sql_value(column: &str, value: &Value) -> StoreResult<SqlValue> {
    Ok(match value {
        Value::Null => SqlValue::Null,
        Value::Integer(v) => SqlValue::Integer(*v),
        Value::Unsigned(v) => SqlValue::Integer(checked_unsigned(column, *v)?),
        Value::Real(v) => SqlValue::Real(*v),
        Value::Text(v) => SqlValue::Text(v.clone()),
    })
}

fn bind_values(row: &Row) -> StoreResult<Vec<SqlValue>> {
    row.columns()
        .iter()
        .map(|(column, value)| to_sql_value(column, value))
        .collect()
}

#[async_trait]
impl RecordStore for SqliteStore {
    async fn insert(&self, kind: RecordKind, row: Row) -> StoreResult<RecordId> {
        let sql = insert_sql(kind, &row);
        let values = bind_values(&row)?;

        let id = self
            .run(move |conn| {
                conn.execute(&sql, params_from_iter(values))
                    .map_err(StoreError::database)?;
                Ok(RecordId(conn.last_insert_rowid()))
            })
            .await?;

        debug!("Inserted {} row with id {}", kind, id);
        Ok(id)
    }

    async fn update_by_id(&self, kind: RecordKind, id: RecordId, row: Row) -> StoreResult<()> {
        let sql = update_sql(kind, &row);
        let mut values = bind_values(&row)?;
        values.push(SqlValue::Integer(id.0));

        let changed = self
            .run(move |conn| {
                conn.execute(&sql, params_from_iter(values))
                    .map_err(StoreError::database)
            })
            .await?;

        if changed == 0 {
            return Err(StoreError::NotFound { kind, id });
        }
        debug!("Updated {} row with id {}", kind, id);
        Ok(())
    }
}
