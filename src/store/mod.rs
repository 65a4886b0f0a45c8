//! Record persistence.
//!
//! The ingestion paths only ever insert a row and get its id back, or update a row by id.
//! Backends: [`InMemoryStore`] for development and tests, [`SqliteStore`] for a local
//! database file, and `LibsqlStore` (feature `db`) for a remote Turso database.

use crate::error::StoreError;
use crate::model::{RecordId, RecordKind, Row};
use async_trait::async_trait;

pub mod memory;
pub mod sqlite;

#[cfg(feature = "db")]
pub mod turso;

pub use memory::InMemoryStore;
pub use sqlite::SqliteStore;

#[cfg(feature = "db")]
pub use turso::LibsqlStore;

pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Storage trait for persisting telemetry rows
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Insert one row into the table for `kind` and return its generated id.
    async fn insert(&self, kind: RecordKind, row: Row) -> StoreResult<RecordId>;

    /// Overwrite the given columns of the row with `id`. Fails with
    /// [`StoreError::NotFound`] when no such row exists.
    async fn update_by_id(&self, kind: RecordKind, id: RecordId, row: Row) -> StoreResult<()>;
}

/// Tables for every record kind. Only ever created if absent; never altered.
pub(crate) const SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS protocolStats (
    id                    INTEGER PRIMARY KEY AUTOINCREMENT,
    peerId                TEXT NOT NULL,
    relayTotalIn          INTEGER NOT NULL,
    relayTotalOut         INTEGER NOT NULL,
    relayRateIn           REAL NOT NULL,
    relayRateOut          REAL NOT NULL,
    storeTotalIn          INTEGER NOT NULL,
    storeTotalOut         INTEGER NOT NULL,
    storeRateIn           REAL NOT NULL,
    storeRateOut          REAL NOT NULL,
    filterPushTotalIn     INTEGER NOT NULL,
    filterPushTotalOut    INTEGER NOT NULL,
    filterPushRateIn      REAL NOT NULL,
    filterPushRateOut     REAL NOT NULL,
    filterSubscribeTotalIn  INTEGER NOT NULL,
    filterSubscribeTotalOut INTEGER NOT NULL,
    filterSubscribeRateIn   REAL NOT NULL,
    filterSubscribeRateOut  REAL NOT NULL,
    lightpushTotalIn      INTEGER NOT NULL,
    lightpushTotalOut     INTEGER NOT NULL,
    lightpushRateIn       REAL NOT NULL,
    lightpushRateOut      REAL NOT NULL
);
CREATE TABLE IF NOT EXISTS receivedMessages (
    id              INTEGER PRIMARY KEY AUTOINCREMENT,
    chatId          TEXT NOT NULL,
    messageHash     TEXT NOT NULL,
    messageId       TEXT NOT NULL,
    receiverKeyUID  TEXT NOT NULL,
    nodeName        TEXT NOT NULL,
    sentAt          INTEGER NOT NULL,
    topic           TEXT NOT NULL,
    messageType     TEXT NOT NULL,
    messageSize     INTEGER NOT NULL,
    pubsubTopic     TEXT NOT NULL,
    createdAt       INTEGER NOT NULL
);
CREATE TABLE IF NOT EXISTS wakuMessages (
    id              INTEGER PRIMARY KEY AUTOINCREMENT,
    walletAddress   TEXT NOT NULL,
    peerIdSender    TEXT NOT NULL,
    peerIdReporter  TEXT NOT NULL,
    sequenceHash    TEXT NOT NULL,
    sequenceTotal   INTEGER NOT NULL,
    sequenceIndex   INTEGER NOT NULL,
    contentTopic    TEXT NOT NULL,
    pubsubTopic     TEXT NOT NULL,
    timestamp       INTEGER NOT NULL,
    createdAt       INTEGER NOT NULL
);
CREATE TABLE IF NOT EXISTS receivedEnvelopes (
    id              INTEGER PRIMARY KEY AUTOINCREMENT,
    messageHash     TEXT NOT NULL,
    sentAt          INTEGER NOT NULL,
    pubsubTopic     TEXT NOT NULL,
    topic           TEXT NOT NULL,
    receiverKeyUID  TEXT NOT NULL,
    nodeName        TEXT NOT NULL,
    processingError TEXT NOT NULL DEFAULT '',
    createdAt       INTEGER NOT NULL
);
"#;

/// `INSERT INTO <table> (<cols>) VALUES (?1, ?2, ...)`
pub(crate) fn insert_sql(kind: RecordKind, row: &Row) -> String {
    let columns: Vec<&str> = row.columns().iter().map(|(name, _)| name.as_str()).collect();
    let placeholders: Vec<String> = (1..=columns.len()).map(|i| format!("?{i}")).collect();
    format!(
        "INSERT INTO {} ({}) VALUES ({})",
        kind.table(),
        columns.join(", "),
        placeholders.join(", ")
    )
}

/// `UPDATE <table> SET a = ?1, b = ?2 WHERE id = ?3`; the id binds last.
pub(crate) fn update_sql(kind: RecordKind, row: &Row) -> String {
    let assignments: Vec<String> = row
        .columns()
        .iter()
        .enumerate()
        .map(|(i, (name, _))| format!("{name} = ?{}", i + 1))
        .collect();
    format!(
        "UPDATE {} SET {} WHERE id = ?{}",
        kind.table(),
        assignments.join(", "),
        row.len() + 1
    )
}

/// Signed value for an unsigned column, or the error a BIGINT column would raise.
pub(crate) fn checked_unsigned(column: &str, value: u64) -> StoreResult<i64> {
    i64::try_from(value).map_err(|_| StoreError::OutOfRange {
        column: column.to_string(),
        value,
    })
}
