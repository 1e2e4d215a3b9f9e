//! Socket abstraction used by the push channel
//!
//! A [`Connector`] opens one text-frame connection. The channel owns the
//! connection loop and reconnection policy; connectors only know how to dial.

use async_trait::async_trait;
use futures::{future, Sink, SinkExt, Stream, StreamExt};
use std::pin::Pin;
use std::time::Duration;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, instrument};
use url::Url;

use crate::error::TransportError;

/// Outgoing half of a connection
pub type FrameSink = Pin<Box<dyn Sink<String, Error = TransportError> + Send>>;

/// Incoming half of a connection
pub type FrameStream = Pin<Box<dyn Stream<Item = Result<String, TransportError>> + Send>>;

/// An open text-frame connection
pub struct Connection {
    pub sink: FrameSink,
    pub stream: FrameStream,
}

/// Dials the push server
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    async fn connect(&self) -> Result<Connection, TransportError>;
}

/// WebSocket connector backed by tokio-tungstenite
#[derive(Debug, Clone)]
pub struct WebSocketConnector {
    url: Url,
    connect_timeout: Duration,
}

impl WebSocketConnector {
    /// Create a connector for a `ws://` or `wss://` endpoint
    pub fn new(url: &str, connect_timeout: Duration) -> Result<Self, TransportError> {
        let url = Url::parse(url)?;
        match url.scheme() {
            "ws" | "wss" => Ok(Self {
                url,
                connect_timeout,
            }),
            other => Err(TransportError::ConnectFailed(format!(
                "unsupported scheme '{other}' in {url}"
            ))),
        }
    }

    pub fn url(&self) -> &Url {
        &self.url
    }
}

#[async_trait]
impl Connector for WebSocketConnector {
    #[instrument(skip(self), fields(url = %self.url))]
    async fn connect(&self) -> Result<Connection, TransportError> {
        let (ws_stream, response) = tokio::time::timeout(
            self.connect_timeout,
            tokio_tungstenite::connect_async(self.url.as_str()),
        )
        .await
        .map_err(|_| TransportError::Timeout("WebSocket connect timeout".to_string()))?
        .map_err(|e| TransportError::ConnectFailed(format!("WebSocket connect failed: {e}")))?;

        debug!(status = %response.status(), "WebSocket handshake completed");

        let (ws_sink, ws_source) = ws_stream.split();

        let sink = ws_sink
            .sink_map_err(|e| TransportError::Socket(e.to_string()))
            .with(|text: String| future::ready(Ok::<_, TransportError>(Message::Text(text))));

        let stream = ws_source.filter_map(|item| {
            future::ready(match item {
                Ok(Message::Text(text)) => Some(Ok(text)),
                Ok(Message::Binary(data)) => match String::from_utf8(data) {
                    Ok(text) => Some(Ok(text)),
                    Err(_) => {
                        debug!("skipping non UTF-8 binary frame");
                        None
                    }
                },
                // Ping/pong are answered by tungstenite, close is followed by end of stream
                Ok(_) => None,
                Err(e) => Some(Err(TransportError::Socket(e.to_string()))),
            })
        });

        Ok(Connection {
            sink: Box::pin(sink),
            stream: Box::pin(stream),
        })
    }
}
