//! RentRide Chat - real-time messaging core of the RentRide marketplace
//!
//! Customers, hosts and support admins chat one-to-one. This crate
//! orchestrates a session on top of two collaborators:
//!
//! - **Conversation Store** (`rentride-store`): durable source of truth
//! - **Transport Channel** (`rentride-transport`): best-effort push of
//!   messages and typing presence
//!
//! # Features
//!
//! - **Optimistic sends**: provisional entries, replaced by the canonical
//!   record or marked failed (manual retry only)
//! - **Last request wins**: stale history loads are discarded
//! - **Unread counters**: per peer, reset when the conversation opens
//! - **Typing presence**: debounced on send, expiring on receive
//! - **Contact directory**: role-scoped, with a support fallback
//!
//! # Example
//!
//! ```no_run
//! use rentride_chat::{ChatConfig, ChatSession, Identity};
//! use rentride_store::{Actor, Role};
//!
//! # async fn run() -> Result<(), rentride_chat::ChatError> {
//! let identity = Identity::new(Actor::new("u1", "Uma", Role::Customer), "token");
//! let (session, mut events) = ChatSession::login(identity, ChatConfig::from_env()?)?;
//!
//! let contacts = session.resolve_contacts().await;
//! if let Some(contact) = contacts.entries.first() {
//!     session.select_peer(&contact.actor.id).await?;
//!     session.send_message(&contact.actor.id, "Is the car available on Friday?").await?;
//! }
//!
//! while let Some(event) = events.recv().await {
//!     println!("{event:?}");
//! }
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod directory;
pub mod error;
pub mod events;
pub mod grouping;
pub mod models;
pub mod session;
pub mod state;
pub mod typing;

pub use config::{ChatConfig, ChatConfigUpdates, SendOrdering};
pub use directory::{ContactDirectory, ContactEntry, DirectoryResolver, Relationship};
pub use error::ChatError;
pub use events::ChatEvent;
pub use grouping::{group_by_day, group_by_local_day, DayGroup};
pub use models::{
    ConversationPhase, EntryId, EntryState, Identity, LoadOutcome, LocalSeq, LogEntry,
};
pub use session::ChatSession;
pub use state::{ChatState, ConfirmOutcome, InboundOutcome, LoadTicket};
pub use typing::TypingDebouncer;
