//! Two-stage envelope lifecycle: creation, then an optional processing-error update.
//!
//! Neither stage ever reports a store failure to the caller. The outcome is kept in the
//! returned [`LifecycleReport`] and sent to tracing and metrics instead.

use crate::error::{DecodeError, StoreError};
use crate::ingest::{decode_record, persist};
use crate::metrics::IngestMetrics;
use crate::model::{ReceivedEnvelope, Record, RecordId};
use crate::store::RecordStore;
use tracing::{debug, error};

#[derive(Debug, Clone, PartialEq)]
pub enum EnvelopeOutcome {
    Created(RecordId),
    Updated(RecordId),
    StoreFailed(StoreError),
}

impl EnvelopeOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            EnvelopeOutcome::Created(_) => "created",
            EnvelopeOutcome::Updated(_) => "updated",
            EnvelopeOutcome::StoreFailed(_) => "store_failed",
        }
    }

    pub fn is_success(&self) -> bool {
        !matches!(self, EnvelopeOutcome::StoreFailed(_))
    }
}

#[derive(Debug, Clone)]
pub struct LifecycleReport {
    pub envelope: ReceivedEnvelope,
    pub outcome: EnvelopeOutcome,
}

/// Input of the processing-error update; the target id is mandatory.
#[derive(Debug, Clone, PartialEq)]
pub struct ProcessingErrorUpdate {
    pub id: RecordId,
    pub envelope: ReceivedEnvelope,
}

impl TryFrom<ReceivedEnvelope> for ProcessingErrorUpdate {
    type Error = DecodeError;

    fn try_from(envelope: ReceivedEnvelope) -> Result<Self, Self::Error> {
        let id = envelope.id.ok_or(DecodeError::MissingField("id"))?;
        Ok(Self { id, envelope })
    }
}

/// Decode an update body: the creation shape plus a required `id`.
pub fn decode_update(body: &[u8]) -> Result<ProcessingErrorUpdate, DecodeError> {
    decode_record::<ReceivedEnvelope>(body)?.try_into()
}

fn observe(operation: &'static str, envelope: &ReceivedEnvelope, outcome: &EnvelopeOutcome) {
    IngestMetrics::record_envelope_outcome(operation, outcome.label());
    match outcome {
        EnvelopeOutcome::StoreFailed(err) => {
            IngestMetrics::record_store_failure(ReceivedEnvelope::KIND, operation, err.label());
            error!(
                operation,
                message_hash = %envelope.message_hash,
                error = %err,
                "could not persist envelope"
            );
        }
        EnvelopeOutcome::Created(id) | EnvelopeOutcome::Updated(id) => {
            debug!(operation, id = %id, "envelope persisted");
        }
    }
}

/// Persist a new envelope. A store failure leaves the envelope without an id.
pub async fn create_envelope(store: &dyn RecordStore, mut envelope: ReceivedEnvelope) -> LifecycleReport {
    let outcome = match persist(store, &mut envelope).await {
        Ok(id) => EnvelopeOutcome::Created(id),
        Err(err) => EnvelopeOutcome::StoreFailed(err),
    };

    observe("create", &envelope, &outcome);
    LifecycleReport { envelope, outcome }
}

/// Overwrite the processing error of a previously created envelope. Every other stored
/// column keeps the value it was created with.
pub async fn update_processing_error(
    store: &dyn RecordStore,
    update: ProcessingErrorUpdate,
) -> LifecycleReport {
    let ProcessingErrorUpdate { id, envelope } = update;
    let outcome = match store
        .update_by_id(ReceivedEnvelope::KIND, id, envelope.processing_error_row())
        .await
    {
        Ok(()) => EnvelopeOutcome::Updated(id),
        Err(err) => EnvelopeOutcome::StoreFailed(err),
    };

    observe("update", &envelope, &outcome);
    LifecycleReport { envelope, outcome }
}
