//! Events published by a chat session

use rentride_store::ActorId;
use rentride_transport::ChannelState;

use crate::models::{LocalSeq, LogEntry};

/// Change notification for UI consumers
#[derive(Debug, Clone, PartialEq)]
pub enum ChatEvent {
    // Conversation lifecycle
    ConversationLoading {
        peer_id: ActorId,
    },
    ConversationLoaded {
        peer_id: ActorId,
        messages: usize,
    },

    // Log changes
    EntryAppended {
        peer_id: ActorId,
        entry: LogEntry,
    },
    EntryConfirmed {
        peer_id: ActorId,
        seq: LocalSeq,
        message_id: String,
    },
    EntryFailed {
        peer_id: ActorId,
        seq: LocalSeq,
        reason: String,
    },
    EntryRetrying {
        peer_id: ActorId,
        seq: LocalSeq,
    },

    // Badges and presence
    UnreadChanged {
        peer_id: ActorId,
        unread: u32,
    },
    TypingChanged {
        peer_id: ActorId,
        typing: bool,
    },

    TransportStateChanged {
        state: ChannelState,
    },
}
