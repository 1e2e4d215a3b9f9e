//! RentRide Store - Conversation Store client for chat
//!
//! The persistence side of the chat core, defined by its contract only:
//!
//! - **ConversationStore**: the async trait the chat orchestrator talks to
//! - **HttpConversationStore**: REST implementation over `reqwest`
//! - **MemoryConversationStore**: in-process implementation backed by a
//!   shared [`MemoryBackend`], for demos and tests
//!
//! # Endpoints
//!
//! - `POST messages {receiverId, body}` returns the canonical message
//! - `GET conversations/{peerId}` returns the ordered history
//! - `PUT conversations/{peerId}/read` acknowledges the peer's messages
//! - `GET unread/count` returns `{count}`
//! - `GET directory?role=...` returns reachable actors

pub mod conversation_store;
pub mod error;
pub mod http_store;
pub mod memory_store;
pub mod models;

pub use conversation_store::ConversationStore;
pub use error::StoreError;
pub use http_store::HttpConversationStore;
pub use memory_store::{MemoryBackend, MemoryConversationStore};
pub use models::{Actor, ActorId, Message, NewMessage, Role, UnreadCount};
