//! Prometheus metrics for the ingestion endpoints.
//!
//! All recording goes through the `metrics` facade; until [`init_metrics`] installs the
//! Prometheus recorder every call is a no-op, so library code and tests need no setup.

use crate::model::RecordKind;
use std::net::SocketAddr;
use std::sync::Once;
use std::time::Instant;
use tracing::{info, warn};

pub const RECORDS_RECEIVED: &str = "telemetry_records_received_total";
pub const RECORDS_PERSISTED: &str = "telemetry_records_persisted_total";
pub const STORE_FAILURES: &str = "telemetry_store_failures_total";
pub const DECODE_FAILURES: &str = "telemetry_decode_failures_total";
pub const ENVELOPE_OUTCOMES: &str = "telemetry_envelope_outcomes_total";
pub const REQUEST_DURATION: &str = "telemetry_request_duration_seconds";

static INIT: Once = Once::new();

/// Install the Prometheus recorder with an HTTP listener on `listen`.
///
/// Idempotent. Must run inside a tokio runtime; an install failure is logged and the
/// server keeps running without metrics.
pub fn init_metrics(listen: SocketAddr) {
    INIT.call_once(|| {
        let builder =
            metrics_exporter_prometheus::PrometheusBuilder::new().with_http_listener(listen);
        match builder.install() {
            Ok(()) => {
                info!("Prometheus exporter listening on http://{}/metrics", listen);
            }
            Err(e) => {
                warn!("Prometheus exporter install failed: {}", e);
            }
        }
    });
}

/// Counters for the ingestion and envelope paths.
pub struct IngestMetrics;

impl IngestMetrics {
    pub fn record_batch(kind: RecordKind, received: usize, persisted: usize) {
        ::metrics::counter!(RECORDS_RECEIVED, "kind" => kind.as_str()).increment(received as u64);
        ::metrics::counter!(RECORDS_PERSISTED, "kind" => kind.as_str())
            .increment(persisted as u64);
    }

    pub fn record_store_failure(kind: RecordKind, operation: &'static str, error: &'static str) {
        ::metrics::counter!(
            STORE_FAILURES,
            "kind" => kind.as_str(),
            "operation" => operation,
            "error" => error
        )
        .increment(1);
    }

    pub fn record_decode_failure(route: &'static str) {
        ::metrics::counter!(DECODE_FAILURES, "route" => route).increment(1);
    }

    pub fn record_envelope_outcome(operation: &'static str, outcome: &'static str) {
        ::metrics::counter!(ENVELOPE_OUTCOMES, "operation" => operation, "outcome" => outcome)
            .increment(1);
    }
}

/// A timing guard that records the request duration when dropped
pub struct TimingGuard {
    start: Instant,
    route: &'static str,
}

impl TimingGuard {
    pub fn new(route: &'static str) -> Self {
        Self {
            start: Instant::now(),
            route,
        }
    }

    pub fn elapsed(&self) -> std::time::Duration {
        self.start.elapsed()
    }
}

impl Drop for TimingGuard {
    fn drop(&mut self) {
        let duration = self.start.elapsed().as_secs_f64();
        ::metrics::histogram!(REQUEST_DURATION, "route" => self.route).record(duration);
    }
}

/// Convenience function to create a timing guard for one request
pub fn time_request(route: &'static str) -> TimingGuard {
    TimingGuard::new(route)
}
