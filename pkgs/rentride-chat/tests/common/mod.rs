//! Shared fixtures for chat session tests
#![allow(dead_code)]

use async_trait::async_trait;
use rentride_chat::{ChatConfig, ChatEvent, ChatSession, Identity};
use rentride_store::{
    Actor, ConversationStore, MemoryBackend, MemoryConversationStore, Message, Role, StoreError,
};
use rentride_transport::{
    memory_pair, ChannelState, ClientFrame, MemoryServer, ServerEnd, TransportChannel,
};
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};

/// Customer u1 booked host h1; u2 booked nobody; a1 is support
pub fn marketplace() -> MemoryBackend {
    let backend = MemoryBackend::new();
    backend.add_actor(Actor::new("u1", "Uma", Role::Customer));
    backend.add_actor(Actor::new("u2", "Udo", Role::Customer));
    backend.add_actor(Actor::new("h1", "Hana", Role::Host));
    backend.add_actor(Actor::new("a1", "Ada", Role::Admin));
    backend.add_booking("h1", "u1");
    backend
}

pub fn actor(backend_id: &str) -> Actor {
    match backend_id {
        "u1" => Actor::new("u1", "Uma", Role::Customer),
        "u2" => Actor::new("u2", "Udo", Role::Customer),
        "h1" => Actor::new("h1", "Hana", Role::Host),
        "a1" => Actor::new("a1", "Ada", Role::Admin),
        other => panic!("Unknown test actor {other}"),
    }
}

pub fn test_config() -> ChatConfig {
    ChatConfig {
        reconnect_attempts: 3,
        reconnect_delay_ms: 500,
        ..ChatConfig::default()
    }
}

/// Memory store with hooks to delay or fail individual calls
pub struct ScriptedStore {
    inner: MemoryConversationStore,
    fail_sends: AtomicBool,
    fail_fetches: AtomicBool,
    fetch_gates: Mutex<HashMap<String, VecDeque<oneshot::Receiver<()>>>>,
    send_gates: Mutex<VecDeque<oneshot::Receiver<()>>>,
    failing_roles: Mutex<HashSet<Role>>,
    calls: Mutex<Vec<String>>,
}

impl ScriptedStore {
    pub fn new(inner: MemoryConversationStore) -> Self {
        Self {
            inner,
            fail_sends: AtomicBool::new(false),
            fail_fetches: AtomicBool::new(false),
            fetch_gates: Mutex::new(HashMap::new()),
            send_gates: Mutex::new(VecDeque::new()),
            failing_roles: Mutex::new(HashSet::new()),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// The next history fetch for `peer_id` waits until the returned sender fires
    pub fn hold_next_fetch(&self, peer_id: &str) -> oneshot::Sender<()> {
        let (tx, rx) = oneshot::channel();
        self.fetch_gates
            .lock()
            .unwrap()
            .entry(peer_id.to_string())
            .or_default()
            .push_back(rx);
        tx
    }

    /// The next send waits until the returned sender fires
    pub fn hold_next_send(&self) -> oneshot::Sender<()> {
        let (tx, rx) = oneshot::channel();
        self.send_gates.lock().unwrap().push_back(rx);
        tx
    }

    pub fn set_fail_sends(&self, fail: bool) {
        self.fail_sends.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_fetches(&self, fail: bool) {
        self.fail_fetches.store(fail, Ordering::SeqCst);
    }

    pub fn fail_directory(&self, role: Role) {
        self.failing_roles.lock().unwrap().insert(role);
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn count_calls(&self, prefix: &str) -> usize {
        self.calls().iter().filter(|c| c.starts_with(prefix)).count()
    }

    fn record(&self, call: String) {
        self.calls.lock().unwrap().push(call);
    }
}

#[async_trait]
impl ConversationStore for ScriptedStore {
    async fn send_message(&self, receiver_id: &str, body: &str) -> Result<Message, StoreError> {
        self.record(format!("send {receiver_id} {body}"));
        let gate = self.send_gates.lock().unwrap().pop_front();
        if let Some(gate) = gate {
            let _ = gate.await;
        }
        if self.fail_sends.load(Ordering::SeqCst) {
            return Err(StoreError::Status {
                status: 503,
                message: "store unavailable".to_string(),
            });
        }
        self.inner.send_message(receiver_id, body).await
    }

    async fn fetch_conversation(&self, peer_id: &str) -> Result<Vec<Message>, StoreError> {
        self.record(format!("fetch {peer_id}"));
        let gate = self
            .fetch_gates
            .lock()
            .unwrap()
            .get_mut(peer_id)
            .and_then(|gates| gates.pop_front());
        if let Some(gate) = gate {
            let _ = gate.await;
        }
        if self.fail_fetches.load(Ordering::SeqCst) {
            return Err(StoreError::Status {
                status: 500,
                message: "history unavailable".to_string(),
            });
        }
        self.inner.fetch_conversation(peer_id).await
    }

    async fn mark_read(&self, peer_id: &str) -> Result<(), StoreError> {
        self.record(format!("read {peer_id}"));
        self.inner.mark_read(peer_id).await
    }

    async fn unread_count(&self) -> Result<u64, StoreError> {
        self.inner.unread_count().await
    }

    async fn directory(&self, role: Role) -> Result<Vec<Actor>, StoreError> {
        self.record(format!("directory {role}"));
        let failing = self.failing_roles.lock().unwrap().contains(&role);
        if failing {
            return Err(StoreError::Status {
                status: 502,
                message: "directory offline".to_string(),
            });
        }
        self.inner.directory(role).await
    }
}

pub struct Harness {
    pub store: Arc<ScriptedStore>,
    pub server: MemoryServer,
    pub session: ChatSession,
    pub events: mpsc::UnboundedReceiver<ChatEvent>,
}

/// Start a session for `actor_id` over the memory store and memory transport
pub fn start_session(backend: &MemoryBackend, actor_id: &str, config: ChatConfig) -> Harness {
    let store = Arc::new(ScriptedStore::new(backend.session(actor_id)));
    let (connector, server) = memory_pair();
    let transport = TransportChannel::new(Arc::new(connector), config.transport_config());
    let identity = Identity::new(actor(actor_id), format!("token-{actor_id}"));

    let (session, events) =
        ChatSession::start(identity, config, store.clone(), transport).expect("session start");

    Harness {
        store,
        server,
        session,
        events,
    }
}

/// Accept the session's push connection and wait until it is usable
pub async fn accept_connected(harness: &mut Harness) -> ServerEnd {
    let mut end = harness.server.accept().await.expect("No connection accepted");
    let first = end.recv().await.expect("No frame received");
    assert_eq!(
        first,
        ClientFrame::Authenticate {
            actor_id: harness.session.actor_id().to_string()
        }
    );
    wait_until(|| harness.session.transport_state() == ChannelState::Connected).await;
    end
}

/// Poll `condition` every few milliseconds, failing after 30 seconds
pub async fn wait_until<F: Fn() -> bool>(condition: F) {
    tokio::time::timeout(Duration::from_secs(30), async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("Timed out waiting for condition");
}

/// Next frame sent by the client
pub async fn next_frame(end: &mut ServerEnd) -> ClientFrame {
    tokio::time::timeout(Duration::from_secs(30), end.recv())
        .await
        .expect("Timed out waiting for a frame")
        .expect("Client went away")
}

/// Events published so far
pub fn drain_events(events: &mut mpsc::UnboundedReceiver<ChatEvent>) -> Vec<ChatEvent> {
    let mut drained = Vec::new();
    while let Ok(event) = events.try_recv() {
        drained.push(event);
    }
    drained
}
