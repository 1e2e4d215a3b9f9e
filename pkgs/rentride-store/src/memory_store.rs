//! In-process Conversation Store
//!
//! [`MemoryBackend`] plays the server: it holds actors, bookings and every
//! message. [`MemoryConversationStore`] is one actor's authenticated view of
//! it and implements [`ConversationStore`] with the same semantics as the
//! HTTP API (server-assigned ids, per-receiver read flags, role-scoped
//! directory).

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::debug;

use crate::conversation_store::ConversationStore;
use crate::error::StoreError;
use crate::models::{Actor, ActorId, Message, Role};

#[derive(Default)]
struct BackendState {
    actors: HashMap<ActorId, Actor>,
    /// (host, customer) pairs with at least one booking
    bookings: HashSet<(ActorId, ActorId)>,
    messages: Vec<Message>,
    next_id: u64,
}

/// Shared in-memory chat backend
#[derive(Clone, Default)]
pub struct MemoryBackend {
    state: Arc<Mutex<BackendState>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_actor(&self, actor: Actor) {
        self.state.lock().actors.insert(actor.id.clone(), actor);
    }

    /// Record that `customer_id` booked a vehicle of `host_id`
    pub fn add_booking(&self, host_id: &str, customer_id: &str) {
        self.state
            .lock()
            .bookings
            .insert((host_id.to_string(), customer_id.to_string()));
    }

    /// Authenticated view of the backend for `actor_id`
    pub fn session(&self, actor_id: &str) -> MemoryConversationStore {
        MemoryConversationStore {
            backend: self.clone(),
            actor_id: actor_id.to_string(),
        }
    }

    /// Every stored message between two actors, oldest first
    pub fn messages_between(&self, a: &str, b: &str) -> Vec<Message> {
        let state = self.state.lock();
        Self::conversation(&state, a, b)
    }

    fn conversation(state: &BackendState, a: &str, b: &str) -> Vec<Message> {
        let mut messages: Vec<Message> = state
            .messages
            .iter()
            .filter(|m| {
                (m.sender_id == a && m.receiver_id == b) || (m.sender_id == b && m.receiver_id == a)
            })
            .cloned()
            .collect();
        messages.sort_by_key(|m| m.created_at);
        messages
    }

    fn has_booking(state: &BackendState, host_id: &str, customer_id: &str) -> bool {
        state
            .bookings
            .contains(&(host_id.to_string(), customer_id.to_string()))
    }
}

/// One actor's view of a [`MemoryBackend`]
#[derive(Clone)]
pub struct MemoryConversationStore {
    backend: MemoryBackend,
    actor_id: ActorId,
}

impl MemoryConversationStore {
    pub fn actor_id(&self) -> &str {
        &self.actor_id
    }
}

#[async_trait]
impl ConversationStore for MemoryConversationStore {
    async fn send_message(&self, receiver_id: &str, body: &str) -> Result<Message, StoreError> {
        if body.trim().is_empty() {
            return Err(StoreError::InvalidInput("message body is empty".to_string()));
        }

        let mut state = self.backend.state.lock();
        if !state.actors.contains_key(receiver_id) {
            return Err(StoreError::NotFound(format!("receiver {receiver_id}")));
        }

        state.next_id += 1;
        let message = Message {
            id: format!("m{}", state.next_id),
            sender_id: self.actor_id.clone(),
            receiver_id: receiver_id.to_string(),
            body: body.to_string(),
            created_at: Utc::now(),
            read: false,
        };
        state.messages.push(message.clone());

        debug!(id = %message.id, from = %self.actor_id, to = %receiver_id, "memory store persisted message");
        Ok(message)
    }

    async fn fetch_conversation(&self, peer_id: &str) -> Result<Vec<Message>, StoreError> {
        let state = self.backend.state.lock();
        Ok(MemoryBackend::conversation(&state, &self.actor_id, peer_id))
    }

    async fn mark_read(&self, peer_id: &str) -> Result<(), StoreError> {
        let mut state = self.backend.state.lock();
        for message in state
            .messages
            .iter_mut()
            .filter(|m| m.sender_id == peer_id && m.receiver_id == self.actor_id)
        {
            message.read = true;
        }
        Ok(())
    }

    async fn unread_count(&self) -> Result<u64, StoreError> {
        let state = self.backend.state.lock();
        Ok(state
            .messages
            .iter()
            .filter(|m| m.receiver_id == self.actor_id && !m.read)
            .count() as u64)
    }

    async fn directory(&self, role: Role) -> Result<Vec<Actor>, StoreError> {
        let state = self.backend.state.lock();
        let caller_role = state
            .actors
            .get(&self.actor_id)
            .map(|a| a.role)
            .ok_or_else(|| StoreError::NotFound(format!("actor {}", self.actor_id)))?;

        let mut actors: Vec<Actor> = state
            .actors
            .values()
            .filter(|candidate| candidate.role == role && candidate.id != self.actor_id)
            .filter(|candidate| match (caller_role, role) {
                (_, Role::Admin) | (Role::Admin, _) => true,
                (Role::Host, Role::Customer) => {
                    MemoryBackend::has_booking(&state, &self.actor_id, &candidate.id)
                }
                (Role::Customer, Role::Host) => {
                    MemoryBackend::has_booking(&state, &candidate.id, &self.actor_id)
                }
                _ => false,
            })
            .cloned()
            .collect();
        actors.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(actors)
    }
}
