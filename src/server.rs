use crate::envelope::{create_envelope, decode_update, update_processing_error};
use crate::error::DecodeError;
use crate::ingest::{decode_batch, decode_record, ingest_batch, ingest_protocol_stat};
use crate::metrics::{time_request, IngestMetrics, TimingGuard};
use crate::model::{ProtocolStat, ReceivedEnvelope, ReceivedMessage, Record, WakuMessage};
use crate::store::RecordStore;
use axum::{
    body::Bytes,
    extract::DefaultBodyLimit,
    http::{header, HeaderName, Method, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Extension, Router,
};
use hyper::Server;
use serde_json::json;
use std::net::SocketAddr;
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::cors::{Any, CorsLayer};
use tracing::{info, warn};

pub const PROTOCOL_STATS: &str = "/protocol-stats";
pub const RECEIVED_MESSAGES: &str = "/received-messages";
pub const WAKU_MESSAGES: &str = "/waku-messages";
pub const RECEIVED_ENVELOPE: &str = "/received-envelope";
pub const UPDATE_ENVELOPE: &str = "/update-envelope";
pub const HEALTH: &str = "/health";

pub const INVALID_PAYLOAD: &str = "Invalid request payload";
pub const PARTIAL_BATCH: &str = "Could not save all record";
pub const PROTOCOL_STATS_FAILED: &str = "Could not save protocol stats";

/// Shared by every request; the store is the only shared resource.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn RecordStore>,
}

fn error_response(status: StatusCode, message: &str) -> Response {
    (status, Json(json!({ "error": message }))).into_response()
}

fn invalid_payload(route: &'static str, err: &DecodeError) -> Response {
    warn!(route, error = %err, "rejected request payload");
    IngestMetrics::record_decode_failure(route);
    error_response(StatusCode::BAD_REQUEST, INVALID_PAYLOAD)
}

fn log_request(route: &'static str, timing: &TimingGuard, response: &Response) {
    info!(
        method = "POST",
        route,
        status = response.status().as_u16(),
        elapsed_ms = timing.elapsed().as_millis() as u64,
        "handled request"
    );
}

/// Health check endpoint
async fn health() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}

async fn create_protocol_stats(Extension(state): Extension<AppState>, body: Bytes) -> Response {
    let timing = time_request(PROTOCOL_STATS);
    let response = match decode_record::<ProtocolStat>(&body) {
        Err(err) => invalid_payload(PROTOCOL_STATS, &err),
        Ok(stat) => match ingest_protocol_stat(state.store.as_ref(), stat).await {
            Ok(_) => (StatusCode::CREATED, Json(json!({ "error": "" }))).into_response(),
            Err(_) => error_response(StatusCode::INTERNAL_SERVER_ERROR, PROTOCOL_STATS_FAILED),
        },
    };
    log_request(PROTOCOL_STATS, &timing, &response);
    response
}

/// 201 with every record when all were saved, 500 as soon as one was not.
async fn ingest_route<R: Record>(state: &AppState, route: &'static str, body: &[u8]) -> Response {
    let timing = time_request(route);
    let response = match decode_batch::<R>(body) {
        Err(err) => invalid_payload(route, &err),
        Ok(records) => {
            let (persisted, all_succeeded) =
                ingest_batch(state.store.as_ref(), records).await.into_parts();
            if all_succeeded {
                (StatusCode::CREATED, Json(persisted)).into_response()
            } else {
                error_response(StatusCode::INTERNAL_SERVER_ERROR, PARTIAL_BATCH)
            }
        }
    };
    log_request(route, &timing, &response);
    response
}

async fn create_received_messages(Extension(state): Extension<AppState>, body: Bytes) -> Response {
    ingest_route::<ReceivedMessage>(&state, RECEIVED_MESSAGES, &body).await
}

async fn create_waku_messages(Extension(state): Extension<AppState>, body: Bytes) -> Response {
    ingest_route::<WakuMessage>(&state, WAKU_MESSAGES, &body).await
}

async fn create_received_envelope(Extension(state): Extension<AppState>, body: Bytes) -> Response {
    let timing = time_request(RECEIVED_ENVELOPE);
    let response = match decode_record::<ReceivedEnvelope>(&body) {
        Err(err) => invalid_payload(RECEIVED_ENVELOPE, &err),
        Ok(envelope) => {
            let report = create_envelope(state.store.as_ref(), envelope).await;
            (StatusCode::CREATED, Json(report.envelope)).into_response()
        }
    };
    log_request(RECEIVED_ENVELOPE, &timing, &response);
    response
}

async fn update_envelope(Extension(state): Extension<AppState>, body: Bytes) -> Response {
    let timing = time_request(UPDATE_ENVELOPE);
    let response = match decode_update(&body) {
        Err(err) => invalid_payload(UPDATE_ENVELOPE, &err),
        Ok(update) => {
            let report = update_processing_error(state.store.as_ref(), update).await;
            (StatusCode::CREATED, Json(report.envelope)).into_response()
        }
    };
    log_request(UPDATE_ENVELOPE, &timing, &response);
    response
}

/// Create the HTTP server with all routes. Request bodies are not size-capped.
pub fn create_server(store: Arc<dyn RecordStore>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([
            Method::GET,
            Method::HEAD,
            Method::POST,
            Method::PUT,
            Method::OPTIONS,
        ])
        .allow_headers([
            HeaderName::from_static("x-requested-with"),
            header::CONTENT_TYPE,
            header::AUTHORIZATION,
        ]);

    Router::new()
        .route(PROTOCOL_STATS, post(create_protocol_stats))
        .route(RECEIVED_MESSAGES, post(create_received_messages))
        .route(WAKU_MESSAGES, post(create_waku_messages))
        .route(RECEIVED_ENVELOPE, post(create_received_envelope))
        .route(UPDATE_ENVELOPE, post(update_envelope))
        .route(HEALTH, get(health))
        .layer(DefaultBodyLimit::disable())
        .layer(Extension(AppState { store }))
        .layer(ServiceBuilder::new().layer(cors))
}

/// Start the HTTP server on the given address
pub async fn start_server(store: Arc<dyn RecordStore>, addr: SocketAddr) -> anyhow::Result<()> {
    let app = create_server(store);

    info!("HTTP server running on http://{}", addr);
    info!("Health check: http://{}{}", addr, HEALTH);

    Server::bind(&addr).serve(app.into_make_service()).await?;

    Ok(())
}
