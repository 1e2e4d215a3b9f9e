//! Wire frames exchanged over the push channel
//!
//! Every frame is a JSON text message of the form
//! `{"event": "<name>", "data": {...}}` with camelCase field names.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::TransportError;

/// Frames sent by this client
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "kebab-case")]
pub enum ClientFrame {
    #[serde(rename_all = "camelCase")]
    Authenticate { actor_id: String },
    #[serde(rename_all = "camelCase")]
    SendMessage {
        sender_id: String,
        receiver_id: String,
        body: String,
    },
    #[serde(rename_all = "camelCase")]
    Typing {
        sender_id: String,
        receiver_id: String,
    },
    #[serde(rename_all = "camelCase")]
    StopTyping {
        sender_id: String,
        receiver_id: String,
    },
}

/// Frames pushed by the server
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "kebab-case")]
pub enum ServerFrame {
    #[serde(rename_all = "camelCase")]
    ReceiveMessage {
        sender_id: String,
        body: String,
        #[serde(with = "flexible_timestamp")]
        timestamp: DateTime<Utc>,
    },
    #[serde(rename_all = "camelCase")]
    UserTyping { sender_id: String },
    #[serde(rename_all = "camelCase")]
    UserStopTyping { sender_id: String },
}

impl ClientFrame {
    pub fn encode(&self) -> Result<String, TransportError> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn decode(text: &str) -> Result<Self, TransportError> {
        Ok(serde_json::from_str(text)?)
    }

    /// Event name as it appears on the wire
    pub fn event_name(&self) -> &'static str {
        match self {
            ClientFrame::Authenticate { .. } => "authenticate",
            ClientFrame::SendMessage { .. } => "send-message",
            ClientFrame::Typing { .. } => "typing",
            ClientFrame::StopTyping { .. } => "stop-typing",
        }
    }
}

impl ServerFrame {
    pub fn encode(&self) -> Result<String, TransportError> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn decode(text: &str) -> Result<Self, TransportError> {
        Ok(serde_json::from_str(text)?)
    }
}

/// A chat message pushed by the server
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReceivedMessage {
    pub sender_id: String,
    pub body: String,
    pub timestamp: DateTime<Utc>,
}

/// Accepts either an RFC 3339 string or integer epoch milliseconds; always
/// writes RFC 3339.
mod flexible_timestamp {
    use chrono::{DateTime, TimeZone, Utc};
    use serde::{Deserialize, Deserializer, Serializer};

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Millis(i64),
        Text(String),
    }

    pub fn serialize<S>(timestamp: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&timestamp.to_rfc3339())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
    where
        D: Deserializer<'de>,
    {
        match Raw::deserialize(deserializer)? {
            Raw::Millis(ms) => Utc.timestamp_millis_opt(ms).single().ok_or_else(|| {
                serde::de::Error::custom(format!("timestamp out of range: {ms}"))
            }),
            Raw::Text(text) => DateTime::parse_from_rfc3339(&text)
                .map(|dt| dt.with_timezone(&Utc))
                .map_err(serde::de::Error::custom),
        }
    }
}
