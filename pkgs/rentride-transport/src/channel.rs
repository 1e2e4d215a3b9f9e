//! Push channel with bounded reconnection
//!
//! One [`TransportChannel`] exists per logged-in actor. It owns a single
//! connection driven by a background task:
//!
//! ```text
//! Disconnected -> Connecting -> Connected -> (drop) Reconnecting -> Connected | Failed
//! ```
//!
//! Reconnection uses a fixed attempt count and a fixed delay. The count only
//! refills after a connection stayed up for `stable_after`, so a server that
//! accepts and drops straight away still exhausts it. Once the channel is
//! `Failed` every emit is dropped, `connect` and `disconnect` leave it failed,
//! and only a new channel (a new session) can recover.
//! Emits never block and never report errors to the caller; message delivery
//! correctness rests on the persistence API, not on this channel.

use futures::{SinkExt, StreamExt};
use parking_lot::{Mutex, RwLock};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use crate::connector::{Connection, Connector, FrameSink};
use crate::error::TransportError;
use crate::frames::{ClientFrame, ReceivedMessage, ServerFrame};

/// Reconnection policy
#[derive(Debug, Clone)]
pub struct TransportConfig {
    /// Reconnect attempts after a drop (or a failed first connect)
    pub reconnect_attempts: u32,
    /// Fixed delay before each reconnect attempt
    pub reconnect_delay: Duration,
    /// A connection must stay up this long before the attempt budget refills
    pub stable_after: Duration,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            reconnect_attempts: 5,
            reconnect_delay: Duration::from_millis(1000),
            stable_after: Duration::from_secs(10),
        }
    }
}

/// Connection state of the push channel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelState {
    Disconnected,
    Connecting,
    Connected,
    Reconnecting,
    Failed,
}

impl fmt::Display for ChannelState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ChannelState::Disconnected => "disconnected",
            ChannelState::Connecting => "connecting",
            ChannelState::Connected => "connected",
            ChannelState::Reconnecting => "reconnecting",
            ChannelState::Failed => "failed",
        };
        f.write_str(name)
    }
}

pub type MessageHandler = Arc<dyn Fn(ReceivedMessage) + Send + Sync>;
pub type TypingHandler = Arc<dyn Fn(String) + Send + Sync>;

#[derive(Default)]
struct InboundHandlers {
    message: Option<MessageHandler>,
    typing_start: Option<TypingHandler>,
    typing_stop: Option<TypingHandler>,
}

struct Driver {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

enum ServeExit {
    Cancelled,
    Dropped(String),
}

struct ChannelInner {
    connector: Arc<dyn Connector>,
    config: TransportConfig,
    state: watch::Sender<ChannelState>,
    handlers: RwLock<InboundHandlers>,
    outbound: Mutex<Option<mpsc::UnboundedSender<ClientFrame>>>,
    driver: Mutex<Option<Driver>>,
}

/// Session-scoped push channel
#[derive(Clone)]
pub struct TransportChannel {
    inner: Arc<ChannelInner>,
}

impl TransportChannel {
    /// Create a disconnected channel
    pub fn new(connector: Arc<dyn Connector>, config: TransportConfig) -> Self {
        let (state, _) = watch::channel(ChannelState::Disconnected);
        Self {
            inner: Arc::new(ChannelInner {
                connector,
                config,
                state,
                handlers: RwLock::new(InboundHandlers::default()),
                outbound: Mutex::new(None),
                driver: Mutex::new(None),
            }),
        }
    }

    /// Current connection state
    pub fn state(&self) -> ChannelState {
        *self.inner.state.borrow()
    }

    /// Watch connection state changes
    pub fn subscribe_state(&self) -> watch::Receiver<ChannelState> {
        self.inner.state.subscribe()
    }

    pub fn config(&self) -> &TransportConfig {
        &self.inner.config
    }

    /// Open the connection for `actor_id`
    ///
    /// Idempotent: does nothing while a connection is being opened, is open or
    /// is being re-established. A `Failed` channel stays failed.
    #[instrument(skip(self))]
    pub fn connect(&self, actor_id: &str) -> Result<(), TransportError> {
        if actor_id.trim().is_empty() {
            warn!("refusing to open push channel without an actor id");
            return Err(TransportError::AuthenticationMissing);
        }

        let mut driver = self.inner.driver.lock();
        match self.state() {
            ChannelState::Disconnected => {}
            ChannelState::Failed => {
                warn!("push channel failed earlier, a new session is required");
                return Ok(());
            }
            state => {
                debug!(%state, "connect ignored, channel already active");
                return Ok(());
            }
        }

        if let Some(stale) = driver.take() {
            stale.cancel.cancel();
        }

        self.inner.set_state(ChannelState::Connecting);
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(run_channel(
            self.inner.clone(),
            actor_id.to_string(),
            cancel.clone(),
        ));
        *driver = Some(Driver { cancel, handle });

        Ok(())
    }

    /// Tear the connection down (logout)
    ///
    /// A `Failed` channel stays `Failed`.
    pub async fn disconnect(&self) {
        let driver = self.inner.driver.lock().take();
        if let Some(driver) = driver {
            driver.cancel.cancel();
            if let Err(err) = driver.handle.await {
                warn!(error = %err, "push channel task ended abnormally");
            }
        }
        self.inner.outbound.lock().take();
        if self.state() == ChannelState::Failed {
            debug!("push channel stays failed after disconnect");
            return;
        }
        self.inner.set_state(ChannelState::Disconnected);
        info!("push channel disconnected");
    }

    /// Register the handler for pushed chat messages, replacing any previous one
    pub fn on_message<F>(&self, handler: F)
    where
        F: Fn(ReceivedMessage) + Send + Sync + 'static,
    {
        self.inner.handlers.write().message = Some(Arc::new(handler));
    }

    /// Register the handler for "peer started typing", replacing any previous one
    pub fn on_typing_start<F>(&self, handler: F)
    where
        F: Fn(String) + Send + Sync + 'static,
    {
        self.inner.handlers.write().typing_start = Some(Arc::new(handler));
    }

    /// Register the handler for "peer stopped typing", replacing any previous one
    pub fn on_typing_stop<F>(&self, handler: F)
    where
        F: Fn(String) + Send + Sync + 'static,
    {
        self.inner.handlers.write().typing_stop = Some(Arc::new(handler));
    }

    pub fn emit_message(&self, sender_id: &str, receiver_id: &str, body: &str) {
        self.emit(ClientFrame::SendMessage {
            sender_id: sender_id.to_string(),
            receiver_id: receiver_id.to_string(),
            body: body.to_string(),
        });
    }

    pub fn emit_typing(&self, sender_id: &str, receiver_id: &str) {
        self.emit(ClientFrame::Typing {
            sender_id: sender_id.to_string(),
            receiver_id: receiver_id.to_string(),
        });
    }

    pub fn emit_stop_typing(&self, sender_id: &str, receiver_id: &str) {
        self.emit(ClientFrame::StopTyping {
            sender_id: sender_id.to_string(),
            receiver_id: receiver_id.to_string(),
        });
    }

    fn emit(&self, frame: ClientFrame) {
        let event = frame.event_name();
        let state = self.state();
        if state != ChannelState::Connected {
            debug!(event, %state, "dropping outbound frame");
            return;
        }

        let outbound = self.inner.outbound.lock();
        match outbound.as_ref() {
            Some(tx) if tx.send(frame).is_ok() => {}
            _ => debug!(event, "dropping outbound frame, connection is closing"),
        }
    }
}

impl ChannelInner {
    fn set_state(&self, state: ChannelState) {
        let previous = self.state.send_replace(state);
        if previous != state {
            debug!(from = %previous, to = %state, "push channel state changed");
        }
    }

    async fn serve(
        &self,
        connection: Connection,
        actor_id: &str,
        cancel: &CancellationToken,
    ) -> ServeExit {
        let Connection {
            mut sink,
            mut stream,
        } = connection;

        let authenticate = ClientFrame::Authenticate {
            actor_id: actor_id.to_string(),
        };
        if let Err(err) = send_frame(&mut sink, &authenticate).await {
            return ServeExit::Dropped(err.to_string());
        }

        let (tx, mut rx) = mpsc::unbounded_channel();
        *self.outbound.lock() = Some(tx);
        self.set_state(ChannelState::Connected);
        info!(actor_id, "push channel connected");

        let exit = loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    let _ = sink.close().await;
                    break ServeExit::Cancelled;
                }
                Some(frame) = rx.recv() => {
                    if let Err(err) = send_frame(&mut sink, &frame).await {
                        break ServeExit::Dropped(err.to_string());
                    }
                }
                incoming = stream.next() => match incoming {
                    Some(Ok(text)) => self.dispatch(&text),
                    Some(Err(err)) => break ServeExit::Dropped(err.to_string()),
                    None => break ServeExit::Dropped("closed by server".to_string()),
                },
            }
        };

        self.outbound.lock().take();
        exit
    }

    fn dispatch(&self, text: &str) {
        let frame = match ServerFrame::decode(text) {
            Ok(frame) => frame,
            Err(err) => {
                warn!(error = %err, "skipping malformed push frame");
                return;
            }
        };

        match frame {
            ServerFrame::ReceiveMessage {
                sender_id,
                body,
                timestamp,
            } => {
                let handler = self.handlers.read().message.clone();
                match handler {
                    Some(handler) => handler(ReceivedMessage {
                        sender_id,
                        body,
                        timestamp,
                    }),
                    None => debug!(%sender_id, "no message handler registered"),
                }
            }
            ServerFrame::UserTyping { sender_id } => {
                let handler = self.handlers.read().typing_start.clone();
                if let Some(handler) = handler {
                    handler(sender_id);
                }
            }
            ServerFrame::UserStopTyping { sender_id } => {
                let handler = self.handlers.read().typing_stop.clone();
                if let Some(handler) = handler {
                    handler(sender_id);
                }
            }
        }
    }
}

async fn send_frame(sink: &mut FrameSink, frame: &ClientFrame) -> Result<(), TransportError> {
    sink.send(frame.encode()?).await
}

async fn run_channel(inner: Arc<ChannelInner>, actor_id: String, cancel: CancellationToken) {
    let mut attempts_used = 0u32;
    let mut first = true;

    loop {
        if !first {
            if attempts_used >= inner.config.reconnect_attempts {
                error!(
                    attempts = attempts_used,
                    "exhausted reconnection attempts, push channel failed"
                );
                inner.outbound.lock().take();
                inner.set_state(ChannelState::Failed);
                return;
            }
            attempts_used += 1;
            inner.set_state(ChannelState::Reconnecting);
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(inner.config.reconnect_delay) => {}
            }
            debug!(attempt = attempts_used, "reconnecting push channel");
        }
        first = false;

        let connected = tokio::select! {
            _ = cancel.cancelled() => break,
            result = inner.connector.connect() => result,
        };

        match connected {
            Ok(connection) => {
                let opened_at = Instant::now();
                let exit = inner.serve(connection, &actor_id, &cancel).await;
                if opened_at.elapsed() >= inner.config.stable_after {
                    attempts_used = 0;
                }
                match exit {
                    ServeExit::Cancelled => break,
                    ServeExit::Dropped(reason) => {
                        warn!(%reason, attempts = attempts_used, "push channel dropped")
                    }
                }
            }
            Err(err) => {
                warn!(attempt = attempts_used, error = %err, "push channel connect failed")
            }
        }
    }

    inner.outbound.lock().take();
    inner.set_state(ChannelState::Disconnected);
}
