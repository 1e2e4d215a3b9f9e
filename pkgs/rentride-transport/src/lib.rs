//! RentRide Transport - real-time push channel for chat
//!
//! This crate owns the bidirectional, authenticated connection each logged-in
//! actor keeps to the chat push server:
//! - One connection per actor, opened with `authenticate(actorId)`
//! - Typed JSON frames for messages and typing presence
//! - Bounded reconnection with a fixed delay, then a terminal `Failed` state
//! - Best-effort emits that never block the caller
//!
//! The socket itself sits behind the [`Connector`] trait:
//! [`WebSocketConnector`] for real servers, [`memory::memory_pair`] for
//! in-process use.

pub mod channel;
pub mod connector;
pub mod error;
pub mod frames;
pub mod memory;

pub use channel::{ChannelState, MessageHandler, TransportChannel, TransportConfig, TypingHandler};
pub use connector::{Connection, Connector, FrameSink, FrameStream, WebSocketConnector};
pub use error::TransportError;
pub use frames::{ClientFrame, ReceivedMessage, ServerFrame};
pub use memory::{memory_pair, MemoryConnector, MemoryServer, ServerEnd};
