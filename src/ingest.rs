//! Batch ingestion: strict decode, then independent per-record persistence.
//!
//! A batch either decodes completely or is refused as a whole. Once decoded, every record is
//! inserted on its own; a failed insert drops that record from the result and never rolls back
//! or blocks the others. The aggregate outcome only says whether all of them made it.

use crate::anonymize::anonymize_peer_id;
use crate::error::{DecodeError, StoreError};
use crate::metrics::IngestMetrics;
use crate::model::{ProtocolStat, Record, RecordId};
use crate::store::{RecordStore, StoreResult};
use chrono::Utc;
use tracing::{debug, warn};

/// Decode a JSON array of records. One bad record refuses the whole batch.
pub fn decode_batch<R: Record>(body: &[u8]) -> Result<Vec<R>, DecodeError> {
    Ok(serde_json::from_slice(body)?)
}

/// Decode a single JSON object record.
pub fn decode_record<R: Record>(body: &[u8]) -> Result<R, DecodeError> {
    Ok(serde_json::from_slice(body)?)
}

#[derive(Debug, Clone, PartialEq)]
pub struct RecordFailure {
    /// Position of the record in the submitted batch.
    pub index: usize,
    pub error: StoreError,
}

#[derive(Debug, Clone)]
pub struct BatchOutcome<R> {
    pub received: usize,
    pub persisted: Vec<R>,
    pub failures: Vec<RecordFailure>,
}

impl<R> BatchOutcome<R> {
    pub fn all_succeeded(&self) -> bool {
        self.persisted.len() == self.received
    }

    pub fn into_parts(self) -> (Vec<R>, bool) {
        let all_succeeded = self.all_succeeded();
        (self.persisted, all_succeeded)
    }
}

/// Discard any client id, stamp server-owned fields, insert, and take the store's id.
pub(crate) async fn persist<R: Record>(
    store: &dyn RecordStore,
    record: &mut R,
) -> StoreResult<RecordId> {
    record.set_id(None);
    record.stamp(Utc::now().timestamp());
    let id = store.insert(R::KIND, record.to_row()).await?;
    record.set_id(Some(id));
    Ok(id)
}

/// Persist every record independently and report which ones made it.
pub async fn ingest_batch<R: Record>(store: &dyn RecordStore, records: Vec<R>) -> BatchOutcome<R> {
    let kind = R::KIND;
    let received = records.len();
    let mut persisted = Vec::with_capacity(received);
    let mut failures = Vec::new();

    for (index, mut record) in records.into_iter().enumerate() {
        match persist(store, &mut record).await {
            Ok(id) => {
                debug!(kind = %kind, index, id = %id, "saved record");
                persisted.push(record);
            }
            Err(error) => {
                warn!(kind = %kind, index, error = %error, "could not save record");
                IngestMetrics::record_store_failure(kind, "insert", error.label());
                failures.push(RecordFailure { index, error });
            }
        }
    }

    IngestMetrics::record_batch(kind, received, persisted.len());
    BatchOutcome {
        received,
        persisted,
        failures,
    }
}

/// Anonymize the peer id and persist one protocol stat.
pub async fn ingest_protocol_stat(
    store: &dyn RecordStore,
    mut stat: ProtocolStat,
) -> StoreResult<ProtocolStat> {
    stat.peer_id = anonymize_peer_id(&stat.peer_id);

    match persist(store, &mut stat).await {
        Ok(_) => {
            IngestMetrics::record_batch(ProtocolStat::KIND, 1, 1);
            Ok(stat)
        }
        Err(error) => {
            warn!(error = %error, "could not save protocol stats");
            IngestMetrics::record_store_failure(ProtocolStat::KIND, "insert", error.label());
            IngestMetrics::record_batch(ProtocolStat::KIND, 1, 0);
            Err(error)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ProtocolMetric, RecordKind, Row, Value, WakuMessage};
    use crate::store::InMemoryStore;
    use async_trait::async_trait;
    use serde_json::json;
    use std::collections::HashSet;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Fails the insert attempts whose zero-based position is listed.
    struct FlakyStore {
        inner: InMemoryStore,
        attempts: AtomicUsize,
        fail_at: Vec<usize>,
    }

    impl FlakyStore {
        fn new(fail_at: Vec<usize>) -> Self {
            Self {
                inner: InMemoryStore::new(),
                attempts: AtomicUsize::new(0),
                fail_at,
            }
        }
    }

    #[async_trait]
    impl RecordStore for FlakyStore {
        async fn insert(&self, kind: RecordKind, row: Row) -> StoreResult<RecordId> {
            let attempt = self.attempts.fetch_add(1, Ordering::SeqCst);
            if self.fail_at.contains(&attempt) {
                return Err(StoreError::database("connection reset"));
            }
            self.inner.insert(kind, row).await
        }

        async fn update_by_id(&self, kind: RecordKind, id: RecordId, row: Row) -> StoreResult<()> {
            self.inner.update_by_id(kind, id, row).await
        }
    }

    fn waku(seq: u64) -> WakuMessage {
        serde_json::from_value(json!({
            "walletAddress": "0xabc",
            "peerIdSender": "sender",
            "peerIdReporter": "reporter",
            "sequenceHash": "hash",
            "sequenceTotal": 3,
            "sequenceIndex": seq,
            "contentTopic": "/app/1/chat/proto",
            "pubsubTopic": "/waku/2/default-waku/proto",
            "timestamp": 1_700_000_000
        }))
        .unwrap()
    }

    fn metric() -> ProtocolMetric {
        ProtocolMetric {
            total_in: 10,
            total_out: 20,
            rate_in: 1.0,
            rate_out: 2.0,
        }
    }

    #[tokio::test]
    async fn full_batch_gets_distinct_ids() {
        let store = InMemoryStore::new();
        let outcome = ingest_batch(&store, vec![waku(0), waku(1), waku(2)]).await;

        assert!(outcome.all_succeeded());
        assert!(outcome.failures.is_empty());
        let (persisted, all_succeeded) = outcome.into_parts();
        assert!(all_succeeded);
        assert_eq!(persisted.len(), 3);

        let ids: HashSet<RecordId> = persisted.iter().filter_map(|m| m.id).collect();
        assert_eq!(ids.len(), 3);
    }

    #[tokio::test]
    async fn one_failed_insert_does_not_roll_back_the_rest() {
        let store = FlakyStore::new(vec![1]);
        let outcome = ingest_batch(&store, vec![waku(0), waku(1), waku(2)]).await;

        assert!(!outcome.all_succeeded());
        assert_eq!(outcome.failures.len(), 1);
        assert_eq!(outcome.failures[0].index, 1);

        let (persisted, all_succeeded) = outcome.into_parts();
        assert!(!all_succeeded);
        assert_eq!(persisted.len(), 2);
        assert!(persisted.iter().all(|m| m.id.is_some()));
        assert_eq!(
            persisted.iter().map(|m| m.sequence_index).collect::<Vec<_>>(),
            vec![0, 2]
        );
        assert_eq!(store.inner.len(RecordKind::WakuMessage).unwrap(), 2);
    }

    #[tokio::test]
    async fn empty_batch_succeeds() {
        let store = InMemoryStore::new();
        let outcome = ingest_batch::<WakuMessage>(&store, Vec::new()).await;
        assert!(outcome.all_succeeded());
    }

    #[tokio::test]
    async fn created_at_is_server_time_and_client_id_is_discarded() {
        let store = InMemoryStore::new();
        let mut msg = waku(0);
        msg.id = Some(RecordId(999));

        let before = Utc::now().timestamp();
        let (persisted, _) = ingest_batch(&store, vec![msg]).await.into_parts();
        let after = Utc::now().timestamp();

        assert_eq!(persisted[0].id, Some(RecordId(1)));
        assert!(persisted[0].created_at >= before && persisted[0].created_at <= after);
    }

    #[test]
    fn one_malformed_record_refuses_the_batch() {
        let body = json!([
            serde_json::to_value(waku(0)).unwrap(),
            { "walletAddress": "0xabc" }
        ]);
        let result = decode_batch::<WakuMessage>(body.to_string().as_bytes());
        assert!(matches!(result, Err(DecodeError::Json(_))));
    }

    #[test]
    fn object_body_is_not_a_batch() {
        let body = serde_json::to_vec(&waku(0)).unwrap();
        assert!(decode_batch::<WakuMessage>(&body).is_err());
    }

    #[tokio::test]
    async fn protocol_stat_is_stored_anonymized() {
        let store = InMemoryStore::new();
        let stat = ProtocolStat {
            id: None,
            peer_id: "16Uiu2HAmRawPeer".to_string(),
            relay: metric(),
            store: metric(),
            filter_push: metric(),
            filter_subscribe: metric(),
            lightpush: metric(),
        };

        let saved = ingest_protocol_stat(&store, stat).await.unwrap();
        let digest = anonymize_peer_id("16Uiu2HAmRawPeer");
        assert_eq!(saved.peer_id, digest);

        let rows = store.rows(RecordKind::ProtocolStat).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].1.get("peerId"), Some(&Value::Text(digest)));
    }

    #[tokio::test]
    async fn protocol_stat_store_failure_is_reported() {
        let store = FlakyStore::new(vec![0]);
        let stat = ProtocolStat {
            id: None,
            peer_id: "peer".to_string(),
            relay: metric(),
            store: metric(),
            filter_push: metric(),
            filter_subscribe: metric(),
            lightpush: metric(),
        };
        assert!(ingest_protocol_stat(&store, stat).await.is_err());
    }
}
