//! Chat data structures shown to UI consumers

use chrono::{DateTime, Utc};
use rentride_store::{Actor, ActorId, Message};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Per-session sequence id of a client-created log entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct LocalSeq(pub u64);

impl fmt::Display for LocalSeq {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "local-{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EntryId {
    Local(LocalSeq),
    Server(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum EntryState {
    /// Sent locally, persistence in flight
    Pending,
    /// The store rejected the message; kept until retried
    Failed { reason: String },
    /// Canonical record from the store
    Confirmed,
    /// Pushed over the transport, not yet re-read from the store
    Received,
}

/// One record of a conversation log
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    pub id: EntryId,
    pub client_ref: Option<Uuid>,
    pub sender_id: ActorId,
    pub receiver_id: ActorId,
    pub body: String,
    pub created_at: DateTime<Utc>,
    pub read: bool,
    pub state: EntryState,
}

impl LogEntry {
    pub fn provisional(
        seq: LocalSeq,
        sender_id: &str,
        receiver_id: &str,
        body: &str,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: EntryId::Local(seq),
            client_ref: Some(Uuid::new_v4()),
            sender_id: sender_id.to_string(),
            receiver_id: receiver_id.to_string(),
            body: body.to_string(),
            created_at,
            read: false,
            state: EntryState::Pending,
        }
    }

    pub fn received(
        seq: LocalSeq,
        sender_id: &str,
        receiver_id: &str,
        body: &str,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: EntryId::Local(seq),
            client_ref: None,
            sender_id: sender_id.to_string(),
            receiver_id: receiver_id.to_string(),
            body: body.to_string(),
            created_at,
            read: true,
            state: EntryState::Received,
        }
    }

    pub fn local_seq(&self) -> Option<LocalSeq> {
        match self.id {
            EntryId::Local(seq) => Some(seq),
            EntryId::Server(_) => None,
        }
    }

    pub fn server_id(&self) -> Option<&str> {
        match &self.id {
            EntryId::Server(id) => Some(id),
            EntryId::Local(_) => None,
        }
    }

    /// Pending or failed, i.e. created here and not confirmed
    pub fn is_provisional(&self) -> bool {
        matches!(self.state, EntryState::Pending | EntryState::Failed { .. })
    }

    /// Adopt the canonical record, keeping the client reference
    pub(crate) fn confirm(&mut self, message: Message) {
        self.id = EntryId::Server(message.id);
        self.sender_id = message.sender_id;
        self.receiver_id = message.receiver_id;
        self.body = message.body;
        self.created_at = message.created_at;
        self.read = message.read;
        self.state = EntryState::Confirmed;
    }
}

impl From<Message> for LogEntry {
    fn from(message: Message) -> Self {
        Self {
            id: EntryId::Server(message.id),
            client_ref: None,
            sender_id: message.sender_id,
            receiver_id: message.receiver_id,
            body: message.body,
            created_at: message.created_at,
            read: message.read,
            state: EntryState::Confirmed,
        }
    }
}

/// Authenticated actor of a session
#[derive(Debug, Clone)]
pub struct Identity {
    pub actor: Actor,
    pub token: String,
}

impl Identity {
    pub fn new(actor: Actor, token: impl Into<String>) -> Self {
        Self {
            actor,
            token: token.into(),
        }
    }

    pub fn actor_id(&self) -> &str {
        &self.actor.id
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConversationPhase {
    Idle,
    Loading,
    Active,
}

/// Result of a history load
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadOutcome {
    /// The history was applied to the log
    Applied { messages: usize },
    /// A newer load started meanwhile; nothing was applied
    Superseded,
}
