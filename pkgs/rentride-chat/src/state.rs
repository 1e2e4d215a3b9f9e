//! Conversation state machine
//!
//! [`ChatState`] holds every log, unread counter and typing flag of a session
//! and applies the orchestrator's transitions synchronously. It performs no
//! IO; [`crate::session::ChatSession`] owns it behind a mutex and drives it
//! from store responses and transport events.
//!
//! History loads are identified by a monotonically increasing token. Only the
//! load holding the latest token, for the peer that is still selected, may
//! change the log.

use chrono::{DateTime, Duration, Utc};
use rentride_store::{ActorId, Message};
use std::collections::{HashMap, HashSet};

use crate::error::ChatError;
use crate::models::{ConversationPhase, EntryState, LocalSeq, LogEntry};

/// Tolerance when matching a pushed message against its stored copy
const ECHO_WINDOW_MS: i64 = 2_000;

/// Handle of one history load
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadTicket {
    pub peer_id: ActorId,
    pub token: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfirmOutcome {
    /// The provisional entry now carries the canonical record
    Replaced,
    /// History already held the canonical record; the provisional entry was dropped
    Merged,
    /// No provisional entry with that sequence id
    Missing,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundOutcome {
    /// Our own message echoed back by the server
    SelfEcho,
    /// Appended to the active conversation
    Appended(LogEntry),
    /// Counted as unread for an inactive peer
    Counted { unread: u32 },
}

#[derive(Debug)]
pub struct ChatState {
    actor_id: ActorId,
    active_peer: Option<ActorId>,
    phase: ConversationPhase,
    latest_token: u64,
    next_seq: u64,
    logs: HashMap<ActorId, Vec<LogEntry>>,
    unread: HashMap<ActorId, u32>,
    /// peer -> generation of the typing-start that raised the flag
    typing: HashMap<ActorId, u64>,
    typing_generation: u64,
}

impl ChatState {
    pub fn new(actor_id: impl Into<ActorId>) -> Self {
        Self {
            actor_id: actor_id.into(),
            active_peer: None,
            phase: ConversationPhase::Idle,
            latest_token: 0,
            next_seq: 0,
            logs: HashMap::new(),
            unread: HashMap::new(),
            typing: HashMap::new(),
            typing_generation: 0,
        }
    }

    pub fn actor_id(&self) -> &str {
        &self.actor_id
    }

    pub fn active_peer(&self) -> Option<&str> {
        self.active_peer.as_deref()
    }

    pub fn phase(&self) -> ConversationPhase {
        self.phase
    }

    pub fn log(&self, peer_id: &str) -> &[LogEntry] {
        self.logs.get(peer_id).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn unread(&self, peer_id: &str) -> u32 {
        self.unread.get(peer_id).copied().unwrap_or(0)
    }

    pub fn unread_counts(&self) -> HashMap<ActorId, u32> {
        self.unread
            .iter()
            .filter(|(_, count)| **count > 0)
            .map(|(peer, count)| (peer.clone(), *count))
            .collect()
    }

    pub fn total_unread(&self) -> u32 {
        self.unread.values().sum()
    }

    pub fn is_typing(&self, peer_id: &str) -> bool {
        self.typing.contains_key(peer_id)
    }

    pub fn typing_peers(&self) -> Vec<ActorId> {
        let mut peers: Vec<ActorId> = self.typing.keys().cloned().collect();
        peers.sort();
        peers
    }

    /// Select `peer_id` and start a new load, superseding any earlier one
    pub fn begin_load(&mut self, peer_id: &str) -> LoadTicket {
        self.latest_token += 1;
        self.active_peer = Some(peer_id.to_string());
        self.phase = ConversationPhase::Loading;
        self.unread.remove(peer_id);

        LoadTicket {
            peer_id: peer_id.to_string(),
            token: self.latest_token,
        }
    }

    pub fn is_current(&self, ticket: &LoadTicket) -> bool {
        ticket.token == self.latest_token && self.active_peer.as_deref() == Some(&ticket.peer_id)
    }

    /// Replace the log with `history`, keeping local entries it does not cover
    ///
    /// Returns `false` and changes nothing when the ticket was superseded.
    pub fn apply_history(&mut self, ticket: &LoadTicket, mut history: Vec<Message>) -> bool {
        if !self.is_current(ticket) {
            return false;
        }

        history.sort_by_key(|m| m.created_at);
        let server_ids: HashSet<&str> = history.iter().map(|m| m.id.as_str()).collect();

        // Each history record stands in for at most one pushed entry
        let mut unclaimed: Vec<&Message> = history.iter().collect();

        let previous = self.logs.remove(&ticket.peer_id).unwrap_or_default();
        let kept: Vec<LogEntry> = previous
            .into_iter()
            .filter(|entry| match &entry.state {
                EntryState::Pending | EntryState::Failed { .. } => true,
                EntryState::Confirmed => entry
                    .server_id()
                    .is_some_and(|id| !server_ids.contains(id)),
                EntryState::Received => {
                    match unclaimed.iter().position(|m| is_echo_of(entry, m)) {
                        Some(index) => {
                            unclaimed.remove(index);
                            false
                        }
                        None => true,
                    }
                }
            })
            .collect();

        let mut log: Vec<LogEntry> = history.into_iter().map(LogEntry::from).collect();
        log.extend(kept);
        self.logs.insert(ticket.peer_id.clone(), log);

        self.phase = ConversationPhase::Active;
        self.unread.remove(&ticket.peer_id);
        true
    }

    /// Finish a failed load; the log keeps its previous entries
    pub fn fail_load(&mut self, ticket: &LoadTicket) -> bool {
        if !self.is_current(ticket) {
            return false;
        }
        self.phase = ConversationPhase::Active;
        true
    }

    /// Zero the unread counter if the load is still the current one
    pub fn acknowledge(&mut self, ticket: &LoadTicket) -> bool {
        if !self.is_current(ticket) {
            return false;
        }
        self.unread.remove(&ticket.peer_id);
        true
    }

    /// Append a pending entry for a local send
    pub fn push_provisional(
        &mut self,
        peer_id: &str,
        body: &str,
        now: DateTime<Utc>,
    ) -> (LocalSeq, LogEntry) {
        let seq = self.next_local_seq();
        let entry = LogEntry::provisional(seq, &self.actor_id, peer_id, body, now);
        self.logs
            .entry(peer_id.to_string())
            .or_default()
            .push(entry.clone());
        (seq, entry)
    }

    /// Swap the provisional entry `seq` for its canonical record
    pub fn confirm(&mut self, peer_id: &str, seq: LocalSeq, message: Message) -> ConfirmOutcome {
        let Some(log) = self.logs.get_mut(peer_id) else {
            return ConfirmOutcome::Missing;
        };
        let Some(index) = log.iter().position(|e| e.local_seq() == Some(seq)) else {
            return ConfirmOutcome::Missing;
        };

        if log.iter().any(|e| e.server_id() == Some(message.id.as_str())) {
            log.remove(index);
            return ConfirmOutcome::Merged;
        }

        log[index].confirm(message);
        ConfirmOutcome::Replaced
    }

    pub fn mark_failed(&mut self, peer_id: &str, seq: LocalSeq, reason: &str) -> bool {
        match self.provisional_mut(peer_id, seq) {
            Some(entry) => {
                entry.state = EntryState::Failed {
                    reason: reason.to_string(),
                };
                true
            }
            None => false,
        }
    }

    /// Put a failed entry back in flight and return its body
    pub fn begin_retry(&mut self, peer_id: &str, seq: LocalSeq) -> Result<String, ChatError> {
        let entry = self
            .provisional_mut(peer_id, seq)
            .ok_or_else(|| ChatError::EntryNotFound {
                peer_id: peer_id.to_string(),
                seq,
            })?;

        match entry.state {
            EntryState::Failed { .. } => {
                entry.state = EntryState::Pending;
                Ok(entry.body.clone())
            }
            _ => Err(ChatError::NotRetryable(seq)),
        }
    }

    /// Route a message pushed by the transport
    pub fn receive_inbound(
        &mut self,
        sender_id: &str,
        body: &str,
        timestamp: DateTime<Utc>,
    ) -> InboundOutcome {
        if sender_id == self.actor_id {
            return InboundOutcome::SelfEcho;
        }

        if self.active_peer.as_deref() == Some(sender_id) {
            let seq = self.next_local_seq();
            let entry = LogEntry::received(seq, sender_id, &self.actor_id, body, timestamp);
            self.logs
                .entry(sender_id.to_string())
                .or_default()
                .push(entry.clone());
            return InboundOutcome::Appended(entry);
        }

        let unread = self.unread.entry(sender_id.to_string()).or_insert(0);
        *unread += 1;
        InboundOutcome::Counted { unread: *unread }
    }

    /// Raise the typing flag; returns the generation to expire it with and
    /// whether the flag was newly raised
    pub fn typing_started(&mut self, peer_id: &str) -> (u64, bool) {
        self.typing_generation += 1;
        let generation = self.typing_generation;
        let raised = self
            .typing
            .insert(peer_id.to_string(), generation)
            .is_none();
        (generation, raised)
    }

    /// Lower the typing flag; `true` when it was raised
    pub fn typing_stopped(&mut self, peer_id: &str) -> bool {
        self.typing.remove(peer_id).is_some()
    }

    /// Lower the flag only if no typing-start arrived after `generation`
    pub fn expire_typing(&mut self, peer_id: &str, generation: u64) -> bool {
        if self.typing.get(peer_id) == Some(&generation) {
            self.typing.remove(peer_id);
            true
        } else {
            false
        }
    }

    fn next_local_seq(&mut self) -> LocalSeq {
        self.next_seq += 1;
        LocalSeq(self.next_seq)
    }

    fn provisional_mut(&mut self, peer_id: &str, seq: LocalSeq) -> Option<&mut LogEntry> {
        self.logs
            .get_mut(peer_id)?
            .iter_mut()
            .find(|e| e.local_seq() == Some(seq) && e.is_provisional())
    }
}

fn is_echo_of(entry: &LogEntry, message: &Message) -> bool {
    entry.sender_id == message.sender_id
        && entry.body == message.body
        && (entry.created_at - message.created_at).abs() <= Duration::milliseconds(ECHO_WINDOW_MS)
}
