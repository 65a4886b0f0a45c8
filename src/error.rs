use crate::model::{RecordId, RecordKind};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ServerError {
    #[error("TOML deserialization failed: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

pub type Result<T> = std::result::Result<T, ServerError>;

/// Failure of a single insert or update against the record store.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum StoreError {
    #[error("Database error: {message}")]
    Database { message: String },

    #[error("no {kind} row with id {id}")]
    NotFound { kind: RecordKind, id: RecordId },

    #[error("column {column} value {value} does not fit a signed 64-bit integer")]
    OutOfRange { column: String, value: u64 },

    #[error("store unavailable: {message}")]
    Unavailable { message: String },
}

impl StoreError {
    pub fn database(err: impl std::fmt::Display) -> Self {
        StoreError::Database {
            message: err.to_string(),
        }
    }

    pub fn unavailable(err: impl std::fmt::Display) -> Self {
        StoreError::Unavailable {
            message: err.to_string(),
        }
    }

    /// Short label used for metrics.
    pub fn label(&self) -> &'static str {
        match self {
            StoreError::Database { .. } => "database",
            StoreError::NotFound { .. } => "not_found",
            StoreError::OutOfRange { .. } => "out_of_range",
            StoreError::Unavailable { .. } => "unavailable",
        }
    }
}

/// Request body could not be turned into the records a route expects.
#[derive(Error, Debug)]
pub enum DecodeError {
    #[error("JSON deserialization failed: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Missing required field: {0}")]
    MissingField(&'static str),
}
