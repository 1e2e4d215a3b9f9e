//! Outgoing typing presence
//!
//! Every keystroke sends `typing` and re-arms one timer per peer; when the
//! timer runs out it sends `stop-typing`. Re-arming aborts the previous timer
//! task, and a generation number guards against a timer that already woke up.

use parking_lot::Mutex;
use rentride_store::ActorId;
use rentride_transport::TransportChannel;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::trace;

struct PendingStop {
    generation: u64,
    handle: JoinHandle<()>,
}

#[derive(Default)]
struct Timers {
    next_generation: u64,
    pending: HashMap<ActorId, PendingStop>,
}

pub struct TypingDebouncer {
    transport: TransportChannel,
    sender_id: ActorId,
    quiet_period: Duration,
    timers: Arc<Mutex<Timers>>,
}

impl TypingDebouncer {
    pub fn new(transport: TransportChannel, sender_id: &str, quiet_period: Duration) -> Self {
        Self {
            transport,
            sender_id: sender_id.to_string(),
            quiet_period,
            timers: Arc::new(Mutex::new(Timers::default())),
        }
    }

    /// A keystroke in the conversation with `peer_id`
    pub fn keystroke(&self, peer_id: &str) {
        self.transport.emit_typing(&self.sender_id, peer_id);

        let mut timers = self.timers.lock();
        timers.next_generation += 1;
        let generation = timers.next_generation;

        if let Some(previous) = timers.pending.remove(peer_id) {
            previous.handle.abort();
        }

        let handle = tokio::spawn(stop_after_quiet_period(
            self.timers.clone(),
            self.transport.clone(),
            self.sender_id.clone(),
            peer_id.to_string(),
            generation,
            self.quiet_period,
        ));
        timers
            .pending
            .insert(peer_id.to_string(), PendingStop { generation, handle });
    }

    /// Send `stop-typing` now and drop any pending timer for `peer_id`
    pub fn stop(&self, peer_id: &str) {
        self.cancel(peer_id);
        self.transport.emit_stop_typing(&self.sender_id, peer_id);
    }

    /// Send `stop-typing` only if a timer for `peer_id` is still pending
    pub fn flush(&self, peer_id: &str) -> bool {
        if self.cancel(peer_id) {
            self.transport.emit_stop_typing(&self.sender_id, peer_id);
            true
        } else {
            false
        }
    }

    pub fn is_pending(&self, peer_id: &str) -> bool {
        self.timers.lock().pending.contains_key(peer_id)
    }

    /// Abort every timer without sending anything
    pub fn shutdown(&self) {
        let mut timers = self.timers.lock();
        for (_, pending) in timers.pending.drain() {
            pending.handle.abort();
        }
    }

    fn cancel(&self, peer_id: &str) -> bool {
        match self.timers.lock().pending.remove(peer_id) {
            Some(pending) => {
                pending.handle.abort();
                true
            }
            None => false,
        }
    }
}

impl Drop for TypingDebouncer {
    fn drop(&mut self) {
        self.shutdown();
    }
}

async fn stop_after_quiet_period(
    timers: Arc<Mutex<Timers>>,
    transport: TransportChannel,
    sender_id: ActorId,
    peer_id: ActorId,
    generation: u64,
    quiet_period: Duration,
) {
    tokio::time::sleep(quiet_period).await;

    {
        let mut timers = timers.lock();
        match timers.pending.get(&peer_id) {
            Some(pending) if pending.generation == generation => {
                timers.pending.remove(&peer_id);
            }
            _ => return,
        }
    }

    trace!(%peer_id, "typing quiet period elapsed");
    transport.emit_stop_typing(&sender_id, &peer_id);
}
