//! Error types for the push channel

use thiserror::Error;

use crate::channel::ChannelState;

/// Errors that can occur while opening or using the push channel
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("Cannot authenticate the push channel without an actor id")]
    AuthenticationMissing,
    #[error("Push channel unavailable ({0})")]
    Unavailable(ChannelState),
    #[error("Connect failed: {0}")]
    ConnectFailed(String),
    #[error("Socket error: {0}")]
    Socket(String),
    #[error("Connection closed")]
    Closed,
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),
    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),
    #[error("Timeout: {0}")]
    Timeout(String),
}
