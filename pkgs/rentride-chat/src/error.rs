use rentride_store::StoreError;
use rentride_transport::{ChannelState, TransportError};
use thiserror::Error;

use crate::models::LocalSeq;

#[derive(Debug, Error)]
pub enum ChatError {
    #[error("Push channel unavailable ({0})")]
    TransportUnavailable(ChannelState),

    #[error("Persistence failure: {0}")]
    PersistenceFailure(#[from] StoreError),

    #[error("Directory lookup failed: {0}")]
    DirectoryFetchFailure(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("No identity for this session")]
    AuthenticationMissing,

    #[error("No message {seq} in conversation with {peer_id}")]
    EntryNotFound { peer_id: String, seq: LocalSeq },

    #[error("Message {0} has not failed, nothing to retry")]
    NotRetryable(LocalSeq),

    #[error("Invalid configuration: {0}")]
    Config(String),
}

impl From<TransportError> for ChatError {
    fn from(err: TransportError) -> Self {
        match err {
            TransportError::AuthenticationMissing => ChatError::AuthenticationMissing,
            TransportError::Unavailable(state) => ChatError::TransportUnavailable(state),
            other => ChatError::Config(other.to_string()),
        }
    }
}
