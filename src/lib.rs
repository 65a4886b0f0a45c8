pub mod anonymize;
pub mod config;
pub mod envelope;
pub mod error;
pub mod ingest;
pub mod logging;
pub mod metrics;
pub mod model;
pub mod server;
pub mod store;
