//! Chat orchestrator
//!
//! A [`ChatSession`] lives from login to logout. It owns the conversation
//! state, the push channel and the store client, and is the only writer of
//! chat state. UI code reads snapshots through the accessors and follows
//! changes on the [`ChatEvent`] receiver returned by [`ChatSession::start`].
//!
//! Sending is optimistic: a provisional entry is appended at once and later
//! swapped for the canonical record, matched by its [`LocalSeq`].
//!
//! Inbound transport events are queued and applied by a single pump task in
//! arrival order. The state mutex is never held across an `.await`.

use chrono::{TimeZone, Utc};
use parking_lot::Mutex;
use rentride_store::{ActorId, ConversationStore, HttpConversationStore, Message};
use rentride_transport::{ChannelState, ReceivedMessage, TransportChannel, WebSocketConnector};
use std::collections::HashMap;
use std::sync::{Arc, Weak};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, trace, warn};

use crate::config::{ChatConfig, SendOrdering};
use crate::directory::{ContactDirectory, DirectoryResolver};
use crate::error::ChatError;
use crate::events::ChatEvent;
use crate::grouping::{group_by_day, group_by_local_day, DayGroup};
use crate::models::{ConversationPhase, Identity, LoadOutcome, LocalSeq, LogEntry};
use crate::state::{ChatState, ConfirmOutcome, InboundOutcome};
use crate::typing::TypingDebouncer;

enum Inbound {
    Message(ReceivedMessage),
    TypingStarted(ActorId),
    TypingStopped(ActorId),
}

struct SessionInner {
    identity: Identity,
    config: ChatConfig,
    store: Arc<dyn ConversationStore>,
    transport: TransportChannel,
    directory: DirectoryResolver,
    typing: TypingDebouncer,
    state: Mutex<ChatState>,
    events: mpsc::UnboundedSender<ChatEvent>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

/// Session-scoped chat orchestrator
#[derive(Clone)]
pub struct ChatSession {
    inner: Arc<SessionInner>,
}

impl ChatSession {
    /// Start a session against the REST API and WebSocket push channel in `config`
    pub fn login(
        identity: Identity,
        config: ChatConfig,
    ) -> Result<(Self, mpsc::UnboundedReceiver<ChatEvent>), ChatError> {
        ensure_identity(&identity)?;

        let store = HttpConversationStore::new(
            &config.api_base_url,
            identity.token.clone(),
            config.request_timeout(),
        )
        .map_err(|err| ChatError::Config(format!("api_base_url: {err}")))?;
        let connector = WebSocketConnector::new(&config.socket_url, config.connect_timeout())
            .map_err(|err| ChatError::Config(format!("socket_url: {err}")))?;
        let transport = TransportChannel::new(Arc::new(connector), config.transport_config());

        Self::start(identity, config, Arc::new(store), transport)
    }

    /// Start a session with explicit store and transport
    ///
    /// Registers the inbound handlers and opens the push channel. Must be
    /// called from within a tokio runtime.
    #[instrument(skip_all, fields(actor_id = %identity.actor.id, role = %identity.actor.role))]
    pub fn start(
        identity: Identity,
        config: ChatConfig,
        store: Arc<dyn ConversationStore>,
        transport: TransportChannel,
    ) -> Result<(Self, mpsc::UnboundedReceiver<ChatEvent>), ChatError> {
        ensure_identity(&identity)?;

        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();

        let tx = inbound_tx.clone();
        transport.on_message(move |message| {
            let _ = tx.send(Inbound::Message(message));
        });
        let tx = inbound_tx.clone();
        transport.on_typing_start(move |sender_id| {
            let _ = tx.send(Inbound::TypingStarted(sender_id));
        });
        transport.on_typing_stop(move |sender_id| {
            let _ = inbound_tx.send(Inbound::TypingStopped(sender_id));
        });

        let actor_id = identity.actor.id.clone();
        let inner = Arc::new(SessionInner {
            typing: TypingDebouncer::new(transport.clone(), &actor_id, config.typing_debounce()),
            directory: DirectoryResolver::new(store.clone(), &config),
            state: Mutex::new(ChatState::new(actor_id.clone())),
            identity,
            config,
            store,
            transport: transport.clone(),
            events: events_tx.clone(),
            tasks: Mutex::new(Vec::new()),
        });

        let state_rx = transport.subscribe_state();
        transport.connect(&actor_id)?;

        let pump = tokio::spawn(pump_inbound(Arc::downgrade(&inner), inbound_rx));
        let watcher = tokio::spawn(forward_transport_state(state_rx, events_tx));
        inner.tasks.lock().extend([pump, watcher]);

        info!("chat session started");
        Ok((Self { inner }, events_rx))
    }

    /// Log out: stop timers and background tasks, close the push channel
    pub async fn shutdown(&self) {
        self.inner.typing.shutdown();
        let tasks = std::mem::take(&mut *self.inner.tasks.lock());
        for task in tasks {
            task.abort();
        }
        self.inner.transport.disconnect().await;
        info!(actor_id = %self.actor_id(), "chat session ended");
    }

    pub fn identity(&self) -> &Identity {
        &self.inner.identity
    }

    pub fn actor_id(&self) -> &str {
        self.inner.identity.actor_id()
    }

    pub fn config(&self) -> &ChatConfig {
        &self.inner.config
    }

    /// Make `peer_id` the active conversation and load its history
    #[instrument(skip(self), fields(actor_id = %self.actor_id()))]
    pub async fn select_peer(&self, peer_id: &str) -> Result<LoadOutcome, ChatError> {
        let peer_id = require_peer(peer_id)?;

        let previous = self.inner.state.lock().active_peer().map(str::to_string);
        if let Some(previous) = previous.filter(|p| p != peer_id) {
            if self.inner.typing.flush(&previous) {
                debug!(%previous, "flushed typing timer of previous conversation");
            }
        }

        self.load_messages(peer_id).await
    }

    /// Fetch the history of `peer_id`, apply it if still current, then mark it read
    pub async fn load_messages(&self, peer_id: &str) -> Result<LoadOutcome, ChatError> {
        let peer_id = require_peer(peer_id)?;

        let (ticket, had_unread) = {
            let mut state = self.inner.state.lock();
            let had_unread = state.unread(peer_id) > 0;
            (state.begin_load(peer_id), had_unread)
        };
        debug!(%peer_id, token = ticket.token, "loading conversation");
        self.inner.emit(ChatEvent::ConversationLoading {
            peer_id: peer_id.to_string(),
        });
        if had_unread {
            self.inner.emit(ChatEvent::UnreadChanged {
                peer_id: peer_id.to_string(),
                unread: 0,
            });
        }

        let history = match self.inner.store.fetch_conversation(peer_id).await {
            Ok(history) => history,
            Err(err) => {
                if self.inner.state.lock().fail_load(&ticket) {
                    warn!(%peer_id, error = %err, "failed to load conversation");
                    return Err(err.into());
                }
                debug!(%peer_id, error = %err, "superseded load failed");
                return Ok(LoadOutcome::Superseded);
            }
        };

        let messages = history.len();
        if !self.inner.state.lock().apply_history(&ticket, history) {
            debug!(%peer_id, token = ticket.token, "discarding superseded history");
            return Ok(LoadOutcome::Superseded);
        }
        self.inner.emit(ChatEvent::ConversationLoaded {
            peer_id: peer_id.to_string(),
            messages,
        });

        if let Err(err) = self.inner.store.mark_read(peer_id).await {
            warn!(%peer_id, error = %err, "failed to mark conversation read");
        }
        self.inner.state.lock().acknowledge(&ticket);

        Ok(LoadOutcome::Applied { messages })
    }

    /// Send `body` to `peer_id`
    ///
    /// The provisional entry is appended before this returns its first
    /// `.await`. On a store failure it stays in the log as failed and can be
    /// retried with [`ChatSession::retry_message`].
    #[instrument(skip(self, body), fields(actor_id = %self.actor_id()))]
    pub async fn send_message(&self, peer_id: &str, body: &str) -> Result<Message, ChatError> {
        let peer_id = require_peer(peer_id)?;
        let body = body.trim();
        if body.is_empty() {
            return Err(ChatError::InvalidInput("message body is empty".to_string()));
        }

        self.inner.typing.stop(peer_id);

        let (seq, entry) = self
            .inner
            .state
            .lock()
            .push_provisional(peer_id, body, Utc::now());
        debug!(%seq, "appended provisional message");
        self.inner.emit(ChatEvent::EntryAppended {
            peer_id: peer_id.to_string(),
            entry,
        });

        self.persist(peer_id, seq, body, false).await
    }

    /// Re-run persistence for a failed entry
    pub async fn retry_message(&self, peer_id: &str, seq: LocalSeq) -> Result<Message, ChatError> {
        let body = self.inner.state.lock().begin_retry(peer_id, seq)?;
        info!(%peer_id, %seq, "retrying message");
        self.inner.emit(ChatEvent::EntryRetrying {
            peer_id: peer_id.to_string(),
            seq,
        });

        self.persist(peer_id, seq, &body, true).await
    }

    async fn persist(
        &self,
        peer_id: &str,
        seq: LocalSeq,
        body: &str,
        retry: bool,
    ) -> Result<Message, ChatError> {
        let ordering = self.inner.config.send_ordering;
        let sender_id = self.actor_id();

        // A retried message already went out on the first attempt
        if ordering == SendOrdering::TransportFirst && !retry {
            self.inner.transport.emit_message(sender_id, peer_id, body);
        }

        match self.inner.store.send_message(peer_id, body).await {
            Ok(message) => {
                let outcome = self
                    .inner
                    .state
                    .lock()
                    .confirm(peer_id, seq, message.clone());
                debug!(%seq, id = %message.id, ?outcome, "message persisted");
                if outcome != ConfirmOutcome::Missing {
                    self.inner.emit(ChatEvent::EntryConfirmed {
                        peer_id: peer_id.to_string(),
                        seq,
                        message_id: message.id.clone(),
                    });
                }

                if ordering == SendOrdering::PersistenceFirst {
                    self.inner
                        .transport
                        .emit_message(sender_id, peer_id, &message.body);
                }
                Ok(message)
            }
            Err(err) => {
                let reason = err.to_string();
                self.inner.state.lock().mark_failed(peer_id, seq, &reason);
                warn!(%peer_id, %seq, error = %reason, "message was not persisted");
                self.inner.emit(ChatEvent::EntryFailed {
                    peer_id: peer_id.to_string(),
                    seq,
                    reason,
                });
                Err(ChatError::PersistenceFailure(err))
            }
        }
    }

    /// A keystroke in the active conversation's input
    pub fn notify_keystroke(&self) {
        let peer_id = self.inner.state.lock().active_peer().map(str::to_string);
        match peer_id {
            Some(peer_id) => self.inner.typing.keystroke(&peer_id),
            None => trace!("keystroke without an active conversation"),
        }
    }

    /// Contacts available to this session's actor
    pub async fn resolve_contacts(&self) -> ContactDirectory {
        self.inner
            .directory
            .resolve_contacts(&self.inner.identity.actor)
            .await
    }

    /// Unread total as counted by the server
    pub async fn server_unread_total(&self) -> Result<u64, ChatError> {
        Ok(self.inner.store.unread_count().await?)
    }

    /// `Err(TransportUnavailable)` when the push channel is down for good or closed
    pub fn transport_status(&self) -> Result<(), ChatError> {
        match self.inner.transport.state() {
            state @ (ChannelState::Failed | ChannelState::Disconnected) => {
                Err(ChatError::TransportUnavailable(state))
            }
            _ => Ok(()),
        }
    }

    pub fn transport_state(&self) -> ChannelState {
        self.inner.transport.state()
    }

    pub fn active_peer(&self) -> Option<ActorId> {
        self.inner.state.lock().active_peer().map(str::to_string)
    }

    pub fn phase(&self) -> ConversationPhase {
        self.inner.state.lock().phase()
    }

    pub fn log(&self, peer_id: &str) -> Vec<LogEntry> {
        self.inner.state.lock().log(peer_id).to_vec()
    }

    pub fn active_log(&self) -> Vec<LogEntry> {
        let state = self.inner.state.lock();
        match state.active_peer() {
            Some(peer_id) => state.log(peer_id).to_vec(),
            None => Vec::new(),
        }
    }

    pub fn unread_count(&self, peer_id: &str) -> u32 {
        self.inner.state.lock().unread(peer_id)
    }

    /// Non-zero unread counters by peer
    pub fn unread_counts(&self) -> HashMap<ActorId, u32> {
        self.inner.state.lock().unread_counts()
    }

    pub fn total_unread(&self) -> u32 {
        self.inner.state.lock().total_unread()
    }

    pub fn is_typing(&self, peer_id: &str) -> bool {
        self.inner.state.lock().is_typing(peer_id)
    }

    pub fn typing_peers(&self) -> Vec<ActorId> {
        self.inner.state.lock().typing_peers()
    }

    pub fn day_groups<Tz: TimeZone>(&self, peer_id: &str, tz: &Tz) -> Vec<DayGroup> {
        group_by_day(self.inner.state.lock().log(peer_id), tz)
    }

    pub fn local_day_groups(&self, peer_id: &str) -> Vec<DayGroup> {
        group_by_local_day(self.inner.state.lock().log(peer_id))
    }
}

impl SessionInner {
    fn emit(&self, event: ChatEvent) {
        if self.events.send(event).is_err() {
            trace!("chat event receiver dropped");
        }
    }

    fn handle_inbound(self: &Arc<Self>, event: Inbound) {
        match event {
            Inbound::Message(message) => self.handle_message(message),
            Inbound::TypingStarted(sender_id) => self.handle_typing_started(sender_id),
            Inbound::TypingStopped(sender_id) => {
                if self.state.lock().typing_stopped(&sender_id) {
                    self.emit(ChatEvent::TypingChanged {
                        peer_id: sender_id,
                        typing: false,
                    });
                }
            }
        }
    }

    fn handle_message(&self, message: ReceivedMessage) {
        let ReceivedMessage {
            sender_id,
            body,
            timestamp,
        } = message;

        let outcome = self
            .state
            .lock()
            .receive_inbound(&sender_id, &body, timestamp);
        match outcome {
            InboundOutcome::SelfEcho => trace!("dropping echo of own message"),
            InboundOutcome::Appended(entry) => {
                debug!(peer_id = %sender_id, "message for active conversation");
                self.emit(ChatEvent::EntryAppended {
                    peer_id: sender_id.clone(),
                    entry,
                });

                let store = self.store.clone();
                tokio::spawn(async move {
                    if let Err(err) = store.mark_read(&sender_id).await {
                        warn!(peer_id = %sender_id, error = %err, "failed to mark message read");
                    }
                });
            }
            InboundOutcome::Counted { unread } => {
                debug!(peer_id = %sender_id, unread, "message for inactive conversation");
                self.emit(ChatEvent::UnreadChanged {
                    peer_id: sender_id,
                    unread,
                });
            }
        }
    }

    fn handle_typing_started(self: &Arc<Self>, sender_id: ActorId) {
        if sender_id == self.identity.actor.id {
            return;
        }

        let (generation, raised) = self.state.lock().typing_started(&sender_id);
        if raised {
            self.emit(ChatEvent::TypingChanged {
                peer_id: sender_id.clone(),
                typing: true,
            });
        }

        let session = Arc::downgrade(self);
        let expiry = self.config.typing_expiry();
        tokio::spawn(async move {
            tokio::time::sleep(expiry).await;
            let Some(inner) = session.upgrade() else {
                return;
            };
            if inner.state.lock().expire_typing(&sender_id, generation) {
                debug!(peer_id = %sender_id, "typing indicator expired");
                inner.emit(ChatEvent::TypingChanged {
                    peer_id: sender_id,
                    typing: false,
                });
            }
        });
    }
}

impl Drop for SessionInner {
    fn drop(&mut self) {
        for task in self.tasks.get_mut().drain(..) {
            task.abort();
        }
    }
}

async fn pump_inbound(session: Weak<SessionInner>, mut inbound: mpsc::UnboundedReceiver<Inbound>) {
    while let Some(event) = inbound.recv().await {
        let Some(inner) = session.upgrade() else {
            break;
        };
        inner.handle_inbound(event);
    }
}

async fn forward_transport_state(
    mut state_rx: watch::Receiver<ChannelState>,
    events: mpsc::UnboundedSender<ChatEvent>,
) {
    while state_rx.changed().await.is_ok() {
        let state = *state_rx.borrow_and_update();
        if events.send(ChatEvent::TransportStateChanged { state }).is_err() {
            break;
        }
    }
}

fn ensure_identity(identity: &Identity) -> Result<(), ChatError> {
    if identity.actor.id.trim().is_empty() || identity.token.trim().is_empty() {
        warn!("no authenticated identity, chat stays offline");
        return Err(ChatError::AuthenticationMissing);
    }
    Ok(())
}

fn require_peer(peer_id: &str) -> Result<&str, ChatError> {
    let peer_id = peer_id.trim();
    if peer_id.is_empty() {
        return Err(ChatError::InvalidInput("no conversation selected".to_string()));
    }
    Ok(peer_id)
}
