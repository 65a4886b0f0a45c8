use super::{RecordStore, StoreResult};
use crate::error::StoreError;
use crate::model::{RecordId, RecordKind, Row};
use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::debug;

#[derive(Default)]
struct Table {
    last_id: i64,
    rows: BTreeMap<RecordId, Row>,
}

/// In-memory store for development and testing. Ids start at 1 per kind.
#[derive(Clone, Default)]
pub struct InMemoryStore {
    tables: Arc<Mutex<HashMap<RecordKind, Table>>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> StoreResult<MutexGuard<'_, HashMap<RecordKind, Table>>> {
        self.tables.lock().map_err(StoreError::unavailable)
    }

    /// Snapshot of every row of `kind`, in id order.
    pub fn rows(&self, kind: RecordKind) -> StoreResult<Vec<(RecordId, Row)>> {
        let tables = self.lock()?;
        Ok(tables
            .get(&kind)
            .map(|table| {
                table
                    .rows
                    .iter()
                    .map(|(id, row)| (*id, row.clone()))
                    .collect()
            })
            .unwrap_or_default())
    }

    pub fn len(&self, kind: RecordKind) -> StoreResult<usize> {
        Ok(self.lock()?.get(&kind).map_or(0, |table| table.rows.len()))
    }
}

#[async_trait]
impl RecordStore for InMemoryStore {
    async fn insert(&self, kind: RecordKind, row: Row) -> StoreResult<RecordId> {
        let mut tables = self.lock()?;
        let table = tables.entry(kind).or_default();
        table.last_id += 1;
        let id = RecordId(table.last_id);
        table.rows.insert(id, row);

        debug!("Inserted {} row with id {}", kind, id);
        Ok(id)
    }

    async fn update_by_id(&self, kind: RecordKind, id: RecordId, row: Row) -> StoreResult<()> {
        let mut tables = self.lock()?;
        let stored = tables
            .get_mut(&kind)
            .and_then(|table| table.rows.get_mut(&id))
            .ok_or(StoreError::NotFound { kind, id })?;

        let mut merged = Row::new();
        for (column, value) in stored.columns() {
            let value = row.get(column).unwrap_or(value).clone();
            merged = merged.with(column.clone(), value);
        }
        *stored = merged;

        debug!("Updated {} row with id {}", kind, id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Value;

    #[tokio::test]
    async fn ids_increase_per_kind() {
        let store = InMemoryStore::new();
        let a = store
            .insert(RecordKind::WakuMessage, Row::new().with("x", 1i64))
            .await
            .unwrap();
        let b = store
            .insert(RecordKind::WakuMessage, Row::new().with("x", 2i64))
            .await
            .unwrap();
        let c = store
            .insert(RecordKind::ReceivedMessage, Row::new())
            .await
            .unwrap();

        assert_eq!(a, RecordId(1));
        assert_eq!(b, RecordId(2));
        assert_eq!(c, RecordId(1));
        assert_eq!(store.len(RecordKind::WakuMessage).unwrap(), 2);
    }

    #[tokio::test]
    async fn update_replaces_only_named_columns() {
        let store = InMemoryStore::new();
        let id = store
            .insert(
                RecordKind::ReceivedEnvelope,
                Row::new()
                    .with("messageHash", "0x01")
                    .with("processingError", ""),
            )
            .await
            .unwrap();

        store
            .update_by_id(
                RecordKind::ReceivedEnvelope,
                id,
                Row::new().with("processingError", "decrypt failed"),
            )
            .await
            .unwrap();

        let rows = store.rows(RecordKind::ReceivedEnvelope).unwrap();
        let row = &rows[0].1;
        assert_eq!(row.get("messageHash"), Some(&Value::Text("0x01".into())));
        assert_eq!(
            row.get("processingError"),
            Some(&Value::Text("decrypt failed".into()))
        );
    }

    #[tokio::test]
    async fn update_of_unknown_id_is_not_found() {
        let store = InMemoryStore::new();
        let err = store
            .update_by_id(RecordKind::ReceivedEnvelope, RecordId(9), Row::new())
            .await
            .unwrap_err();
        assert_eq!(
            err,
            StoreError::NotFound {
                kind: RecordKind::ReceivedEnvelope,
                id: RecordId(9)
            }
        );
    }
}
