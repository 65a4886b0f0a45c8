use super::{checked_unsigned, insert_sql, update_sql, RecordStore, StoreResult, SCHEMA_SQL};
use crate::error::StoreError;
use crate::model::{RecordId, RecordKind, Row, Value};
use async_trait::async_trait;
use libsql::params::Params;
use libsql::{Builder, Connection, Database};
use std::env;
use tracing::{debug, info};

/// Record store backed by a remote Turso/libSQL database.
pub struct LibsqlStore {
    db: Database,
}

impl LibsqlStore {
    /// Connect using `LIBSQL_URL` and `LIBSQL_AUTH_TOKEN`, creating missing tables.
    pub async fn connect() -> StoreResult<Self> {
        let url = env::var("LIBSQL_URL").map_err(|_| StoreError::Unavailable {
            message: "LIBSQL_URL environment variable not set".to_string(),
        })?;

        let auth_token = env::var("LIBSQL_AUTH_TOKEN").map_err(|_| StoreError::Unavailable {
            message: "LIBSQL_AUTH_TOKEN environment variable not set".to_string(),
        })?;

        info!("Connecting to Turso database at {}", url);

        let db = Builder::new_remote(url, auth_token)
            .build()
            .await
            .map_err(|e| StoreError::Unavailable {
                message: format!("Failed to connect to database: {e}"),
            })?;

        let store = Self { db };
        store.create_tables().await?;
        Ok(store)
    }

    fn connection(&self) -> StoreResult<Connection> {
        self.db.connect().map_err(|e| StoreError::Unavailable {
            message: format!("Failed to get database connection: {e}"),
        })
    }

    async fn create_tables(&self) -> StoreResult<()> {
        let conn = self.connection()?;
        conn.execute_batch(SCHEMA_SQL)
            .await
            .map_err(|e| StoreError::Database {
                message: format!("Failed to create tables: {e}"),
            })?;
        Ok(())
    }
}

fn to_libsql_value(column: &str, value: &Value) -> StoreResult<libsql::Value> {
    Ok(match value {
        Value::Null => libsql::Value::Null,
        Value::Integer(v) => libsql::Value::Integer(*v),
        Value::Unsigned(v) => libsql::Value::Integer(checked_unsigned(column, *v)?),
        Value::Real(v) => libsql::Value::Real(*v),
        Value::Text(v) => libsql::Value::Text(v.clone()),
    })
}

fn bind_values(row: &Row) -> StoreResult<Vec<libsql::Value>> {
    row.columns()
        .iter()
        .map(|(column, value)| to_libsql_value(column, value))
        .collect()
}

#[async_trait]
impl RecordStore for LibsqlStore {
    async fn insert(&self, kind: RecordKind, row: Row) -> StoreResult<RecordId> {
        let conn = self.connection()?;
        let sql = format!("{} RETURNING id", insert_sql(kind, &row));
        let values = bind_values(&row)?;

        let mut rows = conn
            .query(&sql, Params::Positional(values))
            .await
            .map_err(|e| StoreError::Database {
                message: format!("Failed to insert {kind} row: {e}"),
            })?;

        let returned = rows.next().await.map_err(|e| StoreError::Database {
            message: format!("Failed to read row: {e}"),
        })?;
        let id: i64 = returned
            .ok_or_else(|| StoreError::Database {
                message: format!("Insert into {} returned no id", kind.table()),
            })?
            .get(0)
            .map_err(|e| StoreError::Database {
                message: format!("Failed to get id: {e}"),
            })?;

        debug!("Inserted {} row with id {}", kind, id);
        Ok(RecordId(id))
    }

    async fn update_by_id(&self, kind: RecordKind, id: RecordId, row: Row) -> StoreResult<()> {
        let conn = self.connection()?;
        let sql = update_sql(kind, &row);
        let mut values = bind_values(&row)?;
        values.push(libsql::Value::Integer(id.0));

        let changed = conn
            .execute(&sql, Params::Positional(values))
            .await
            .map_err(|e| StoreError::Database {
                message: format!("Failed to update {kind} row: {e}"),
            })?;

        if changed == 0 {
            return Err(StoreError::NotFound { kind, id });
        }
        debug!("Updated {} row with id {}", kind, id);
        Ok(())
    }
}
