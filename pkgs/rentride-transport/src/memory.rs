//! In-process connector
//!
//! Pairs a [`MemoryConnector`] with a [`MemoryServer`] so the push channel can
//! run without a network. Each successful connect hands the server a
//! [`ServerEnd`]; dropping it looks like a dropped socket to the client.

use async_trait::async_trait;
use futures::channel::mpsc;
use futures::{SinkExt, StreamExt};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::debug;

use crate::connector::{Connection, Connector};
use crate::error::TransportError;
use crate::frames::{ClientFrame, ServerFrame};

struct MemoryShared {
    offline: AtomicBool,
    attempts: AtomicUsize,
    accepted: mpsc::UnboundedSender<ServerEnd>,
}

/// Client side of an in-process connection pair
#[derive(Clone)]
pub struct MemoryConnector {
    shared: Arc<MemoryShared>,
}

/// Server side of an in-process connection pair
pub struct MemoryServer {
    shared: Arc<MemoryShared>,
    accepted: mpsc::UnboundedReceiver<ServerEnd>,
}

/// One accepted connection, seen from the server
pub struct ServerEnd {
    from_client: mpsc::UnboundedReceiver<String>,
    to_client: mpsc::UnboundedSender<String>,
}

/// Create a connected connector/server pair
pub fn memory_pair() -> (MemoryConnector, MemoryServer) {
    let (accepted_tx, accepted_rx) = mpsc::unbounded();
    let shared = Arc::new(MemoryShared {
        offline: AtomicBool::new(false),
        attempts: AtomicUsize::new(0),
        accepted: accepted_tx,
    });

    (
        MemoryConnector {
            shared: shared.clone(),
        },
        MemoryServer {
            shared,
            accepted: accepted_rx,
        },
    )
}

#[async_trait]
impl Connector for MemoryConnector {
    async fn connect(&self) -> Result<Connection, TransportError> {
        self.shared.attempts.fetch_add(1, Ordering::SeqCst);

        if self.shared.offline.load(Ordering::SeqCst) {
            return Err(TransportError::ConnectFailed(
                "memory server offline".to_string(),
            ));
        }

        let (client_tx, client_rx) = mpsc::unbounded::<String>();
        let (server_tx, server_rx) = mpsc::unbounded::<String>();

        self.shared
            .accepted
            .unbounded_send(ServerEnd {
                from_client: client_rx,
                to_client: server_tx,
            })
            .map_err(|_| TransportError::ConnectFailed("memory server dropped".to_string()))?;

        debug!("memory connection established");

        Ok(Connection {
            sink: Box::pin(client_tx.sink_map_err(|_| TransportError::Closed)),
            stream: Box::pin(server_rx.map(Ok::<String, TransportError>)),
        })
    }
}

impl MemoryServer {
    /// Wait for the next client connection
    pub async fn accept(&mut self) -> Option<ServerEnd> {
        self.accepted.next().await
    }

    /// Refuse (or allow again) new connections
    pub fn set_offline(&self, offline: bool) {
        self.shared.offline.store(offline, Ordering::SeqCst);
    }

    /// Number of connect attempts seen so far, refused ones included
    pub fn connect_attempts(&self) -> usize {
        self.shared.attempts.load(Ordering::SeqCst)
    }
}

impl ServerEnd {
    /// Next frame sent by the client; `None` once the client went away
    pub async fn recv(&mut self) -> Option<ClientFrame> {
        loop {
            let text = self.from_client.next().await?;
            match ClientFrame::decode(&text) {
                Ok(frame) => return Some(frame),
                Err(err) => debug!(error = %err, "server end skipping malformed frame"),
            }
        }
    }

    /// Frames already queued by the client, without waiting
    pub fn drain(&mut self) -> Vec<ClientFrame> {
        let mut frames = Vec::new();
        while let Ok(Some(text)) = self.from_client.try_next() {
            if let Ok(frame) = ClientFrame::decode(&text) {
                frames.push(frame);
            }
        }
        frames
    }

    /// Push a frame to the client
    pub fn push(&self, frame: &ServerFrame) -> Result<(), TransportError> {
        self.push_raw(frame.encode()?)
    }

    /// Push an arbitrary text frame to the client
    pub fn push_raw(&self, text: impl Into<String>) -> Result<(), TransportError> {
        self.to_client
            .unbounded_send(text.into())
            .map_err(|_| TransportError::Closed)
    }
}
