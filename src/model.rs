//! Telemetry record shapes and their projection onto store rows.
//!
//! Every record kind decodes strictly from camelCase JSON: a missing required field or a value
//! of the wrong type fails the decode. Identifiers are assigned by the store and are never taken
//! from a client on the create paths.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Store-assigned identifier of a persisted record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordId(pub i64);

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RecordKind {
    ProtocolStat,
    ReceivedMessage,
    WakuMessage,
    ReceivedEnvelope,
}

impl RecordKind {
    pub const ALL: [RecordKind; 4] = [
        RecordKind::ProtocolStat,
        RecordKind::ReceivedMessage,
        RecordKind::WakuMessage,
        RecordKind::ReceivedEnvelope,
    ];

    pub fn table(self) -> &'static str {
        match self {
            RecordKind::ProtocolStat => "protocolStats",
            RecordKind::ReceivedMessage => "receivedMessages",
            RecordKind::WakuMessage => "wakuMessages",
            RecordKind::ReceivedEnvelope => "receivedEnvelopes",
        }
    }

    /// Label used in logs and metrics.
    pub fn as_str(self) -> &'static str {
        match self {
            RecordKind::ProtocolStat => "protocol_stat",
            RecordKind::ReceivedMessage => "received_message",
            RecordKind::WakuMessage => "waku_message",
            RecordKind::ReceivedEnvelope => "received_envelope",
        }
    }
}

impl fmt::Display for RecordKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single column value handed to the store.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Integer(i64),
    Unsigned(u64),
    Real(f64),
    Text(String),
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Integer(v)
    }
}

impl From<u64> for Value {
    fn from(v: u64) -> Self {
        Value::Unsigned(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Real(v)
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Text(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

/// Ordered column/value pairs for one insert or update statement.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Row {
    columns: Vec<(String, Value)>,
}

impl Row {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.columns.push((column.into(), value.into()));
        self
    }

    pub fn columns(&self) -> &[(String, Value)] {
        &self.columns
    }

    pub fn get(&self, column: &str) -> Option<&Value> {
        self.columns
            .iter()
            .find(|(name, _)| name == column)
            .map(|(_, value)| value)
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }
}

/// A telemetry record that can be decoded from a request and written as one row.
pub trait Record: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {
    const KIND: RecordKind;

    fn id(&self) -> Option<RecordId>;

    fn set_id(&mut self, id: Option<RecordId>);

    /// Fill server-owned fields right before the insert. `now` is unix seconds.
    fn stamp(&mut self, _now: i64) {}

    fn to_row(&self) -> Row;
}

/// Traffic counters for one protocol.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProtocolMetric {
    pub total_in: i64,
    pub total_out: i64,
    pub rate_in: f64,
    pub rate_out: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProtocolStat {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<RecordId>,
    pub peer_id: String,
    pub relay: ProtocolMetric,
    pub store: ProtocolMetric,
    pub filter_push: ProtocolMetric,
    pub filter_subscribe: ProtocolMetric,
    pub lightpush: ProtocolMetric,
}

impl ProtocolStat {
    fn protocols(&self) -> [(&'static str, &ProtocolMetric); 5] {
        [
            ("relay", &self.relay),
            ("store", &self.store),
            ("filterPush", &self.filter_push),
            ("filterSubscribe", &self.filter_subscribe),
            ("lightpush", &self.lightpush),
        ]
    }
}

impl Record for ProtocolStat {
    const KIND: RecordKind = RecordKind::ProtocolStat;

    fn id(&self) -> Option<RecordId> {
        self.id
    }

    fn set_id(&mut self, id: Option<RecordId>) {
        self.id = id;
    }

    fn to_row(&self) -> Row {
        self.protocols().iter().fold(
            Row::new().with("peerId", self.peer_id.as_str()),
            |row, (prefix, metric)| {
                row.with(format!("{prefix}TotalIn"), metric.total_in)
                    .with(format!("{prefix}TotalOut"), metric.total_out)
                    .with(format!("{prefix}RateIn"), metric.rate_in)
                    .with(format!("{prefix}RateOut"), metric.rate_out)
            },
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReceivedMessage {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<RecordId>,
    pub chat_id: String,
    pub message_hash: String,
    pub message_id: String,
    #[serde(rename = "receiverKeyUID")]
    pub receiver_key_uid: String,
    pub node_name: String,
    pub sent_at: i64,
    pub topic: String,
    pub message_type: String,
    pub message_size: u64,
    pub pubsub_topic: String,
    #[serde(default, skip_deserializing)]
    pub created_at: i64,
}

impl Record for ReceivedMessage {
    const KIND: RecordKind = RecordKind::ReceivedMessage;

    fn id(&self) -> Option<RecordId> {
        self.id
    }

    fn set_id(&mut self, id: Option<RecordId>) {
        self.id = id;
    }

    fn stamp(&mut self, now: i64) {
        self.created_at = now;
    }

    fn to_row(&self) -> Row {
        Row::new()
            .with("chatId", self.chat_id.as_str())
            .with("messageHash", self.message_hash.as_str())
            .with("messageId", self.message_id.as_str())
            .with("receiverKeyUID", self.receiver_key_uid.as_str())
            .with("nodeName", self.node_name.as_str())
            .with("sentAt", self.sent_at)
            .with("topic", self.topic.as_str())
            .with("messageType", self.message_type.as_str())
            .with("messageSize", self.message_size)
            .with("pubsubTopic", self.pubsub_topic.as_str())
            .with("createdAt", self.created_at)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WakuMessage {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<RecordId>,
    pub wallet_address: String,
    pub peer_id_sender: String,
    pub peer_id_reporter: String,
    pub sequence_hash: String,
    pub sequence_total: u64,
    pub sequence_index: u64,
    pub content_topic: String,
    pub pubsub_topic: String,
    /// Origin timestamp reported by the client.
    pub timestamp: i64,
    /// Set when the row is written; a client-supplied value is ignored.
    #[serde(default, skip_deserializing)]
    pub created_at: i64,
}

impl Record for WakuMessage {
    const KIND: RecordKind = RecordKind::WakuMessage;

    fn id(&self) -> Option<RecordId> {
        self.id
    }

    fn set_id(&mut self, id: Option<RecordId>) {
        self.id = id;
    }

    fn stamp(&mut self, now: i64) {
        self.created_at = now;
    }

    fn to_row(&self) -> Row {
        Row::new()
            .with("walletAddress", self.wallet_address.as_str())
            .with("peerIdSender", self.peer_id_sender.as_str())
            .with("peerIdReporter", self.peer_id_reporter.as_str())
            .with("sequenceHash", self.sequence_hash.as_str())
            .with("sequenceTotal", self.sequence_total)
            .with("sequenceIndex", self.sequence_index)
            .with("contentTopic", self.content_topic.as_str())
            .with("pubsubTopic", self.pubsub_topic.as_str())
            .with("timestamp", self.timestamp)
            .with("createdAt", self.created_at)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReceivedEnvelope {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<RecordId>,
    pub message_hash: String,
    pub sent_at: i64,
    pub pubsub_topic: String,
    pub topic: String,
    #[serde(rename = "receiverKeyUID")]
    pub receiver_key_uid: String,
    pub node_name: String,
    #[serde(default)]
    pub processing_error: String,
    #[serde(default, skip_deserializing, skip_serializing_if = "is_unstamped")]
    pub created_at: i64,
}

/// Only a create stamps the envelope; an update echo carries no creation time.
fn is_unstamped(created_at: &i64) -> bool {
    *created_at == 0
}

impl ReceivedEnvelope {
    /// Columns touched by the processing-error update.
    pub fn processing_error_row(&self) -> Row {
        Row::new().with("processingError", self.processing_error.as_str())
    }
}

impl Record for ReceivedEnvelope {
    const KIND: RecordKind = RecordKind::ReceivedEnvelope;

    fn id(&self) -> Option<RecordId> {
        self.id
    }

    fn set_id(&mut self, id: Option<RecordId>) {
        self.id = id;
    }

    fn stamp(&mut self, now: i64) {
        self.created_at = now;
    }

    fn to_row(&self) -> Row {
        Row::new()
            .with("messageHash", self.message_hash.as_str())
            .with("sentAt", self.sent_at)
            .with("pubsubTopic", self.pubsub_topic.as_str())
            .with("topic", self.topic.as_str())
            .with("receiverKeyUID", self.receiver_key_uid.as_str())
            .with("nodeName", self.node_name.as_str())
            .with("processingError", self.processing_error.as_str())
            .with("createdAt", self.created_at)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn waku_json() -> serde_json::Value {
        json!({
            "walletAddress": "0xabc",
            "peerIdSender": "16Uiu2Sender",
            "peerIdReporter": "16Uiu2Reporter",
            "sequenceHash": "hash-1",
            "sequenceTotal": 3,
            "sequenceIndex": 0,
            "contentTopic": "/waku/2/default-content/proto",
            "pubsubTopic": "/waku/2/default-waku/proto",
            "timestamp": 1_700_000_000
        })
    }

    #[test]
    fn waku_message_ignores_client_created_at_and_id_is_optional() {
        let mut value = waku_json();
        value["createdAt"] = json!(42);
        let msg: WakuMessage = serde_json::from_value(value).unwrap();
        assert_eq!(msg.created_at, 0);
        assert_eq!(msg.id, None);
    }

    #[test]
    fn negative_unsigned_field_is_rejected() {
        let mut value = waku_json();
        value["sequenceTotal"] = json!(-1);
        assert!(serde_json::from_value::<WakuMessage>(value).is_err());
    }

    #[test]
    fn missing_field_is_rejected() {
        let mut value = waku_json();
        value.as_object_mut().unwrap().remove("contentTopic");
        assert!(serde_json::from_value::<WakuMessage>(value).is_err());
    }

    #[test]
    fn envelope_processing_error_defaults_to_empty() {
        let env: ReceivedEnvelope = serde_json::from_value(json!({
            "messageHash": "0x01",
            "sentAt": 10,
            "pubsubTopic": "/waku/2/default-waku/proto",
            "topic": "0x1234",
            "receiverKeyUID": "uid",
            "nodeName": "node"
        }))
        .unwrap();
        assert_eq!(env.processing_error, "");
        assert_eq!(
            env.processing_error_row().get("processingError"),
            Some(&Value::Text(String::new()))
        );
    }

    #[test]
    fn protocol_stat_row_has_counter_columns_per_protocol() {
        let metric = ProtocolMetric {
            total_in: 1,
            total_out: 2,
            rate_in: 0.5,
            rate_out: 1.5,
        };
        let stat = ProtocolStat {
            id: None,
            peer_id: "peer".to_string(),
            relay: metric,
            store: metric,
            filter_push: metric,
            filter_subscribe: metric,
            lightpush: metric,
        };
        let row = stat.to_row();
        assert_eq!(row.len(), 21);
        assert_eq!(row.get("filterPushTotalOut"), Some(&Value::Integer(2)));
        assert_eq!(row.get("lightpushRateIn"), Some(&Value::Real(0.5)));
    }

    #[test]
    fn id_is_omitted_from_output_until_assigned() {
        let mut msg: WakuMessage = serde_json::from_value(waku_json()).unwrap();
        let out = serde_json::to_value(&msg).unwrap();
        assert!(out.get("id").is_none());

        msg.set_id(Some(RecordId(7)));
        let out = serde_json::to_value(&msg).unwrap();
        assert_eq!(out["id"], json!(7));
    }
}
