//! Conversation Store contract

use async_trait::async_trait;

use crate::error::StoreError;
use crate::models::{Actor, Message, Role};

/// Request/response persistence API for chat, seen from the logged-in actor
///
/// The Store is the durable source of truth: a message exists once
/// `send_message` resolved, whatever happened on the push channel.
#[async_trait]
pub trait ConversationStore: Send + Sync {
    /// `POST messages` - persist a message from the current actor
    async fn send_message(&self, receiver_id: &str, body: &str) -> Result<Message, StoreError>;

    /// `GET conversations/{peer}` - time-ordered history with `peer_id`
    async fn fetch_conversation(&self, peer_id: &str) -> Result<Vec<Message>, StoreError>;

    /// `PUT conversations/{peer}/read` - acknowledge everything `peer_id` sent
    async fn mark_read(&self, peer_id: &str) -> Result<(), StoreError>;

    /// `GET unread/count` - unread messages addressed to the current actor
    async fn unread_count(&self) -> Result<u64, StoreError>;

    /// `GET directory?role=` - actors of `role` reachable by the current actor
    async fn directory(&self, role: Role) -> Result<Vec<Actor>, StoreError>;
}
