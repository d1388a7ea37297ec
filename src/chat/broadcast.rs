// src/chat/broadcast.rs
// Per-session fan-out to live WebSocket subscribers. Delivery is best-effort:
// a subscriber whose channel is gone is dropped on the next publish.

use std::collections::HashMap;
use std::sync::Mutex;

use serde::Serialize;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tracing::debug;
use uuid::Uuid;

use super::{ConflictResolution, Message};

/// Events pushed to session subscribers, tagged for the wire.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SessionEvent {
    Message { data: Message },
    ConflictResolution { data: ConflictResolution },
}

struct Subscriber {
    id: Uuid,
    tx: UnboundedSender<SessionEvent>,
}

#[derive(Default)]
pub struct SessionChannels {
    sessions: Mutex<HashMap<Uuid, Vec<Subscriber>>>,
}

impl SessionChannels {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a subscriber on a session. The returned id deregisters it.
    pub fn subscribe(&self, session_id: Uuid) -> (Uuid, UnboundedReceiver<SessionEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let id = Uuid::new_v4();
        self.sessions
            .lock()
            .unwrap()
            .entry(session_id)
            .or_default()
            .push(Subscriber { id, tx });
        debug!("Subscriber {} joined session {}", id, session_id);
        (id, rx)
    }

    /// Removes one subscriber. Idempotent; an empty session entry is removed
    /// entirely so the map does not accumulate dead sessions.
    pub fn unsubscribe(&self, session_id: Uuid, subscriber_id: Uuid) {
        let mut sessions = self.sessions.lock().unwrap();
        if let Some(subscribers) = sessions.get_mut(&session_id) {
            subscribers.retain(|s| s.id != subscriber_id);
            if subscribers.is_empty() {
                sessions.remove(&session_id);
            }
        }
    }

    /// Delivers an event to every live subscriber of the session. Subscribers
    /// whose receiving half is gone are pruned here.
    pub fn publish(&self, session_id: Uuid, event: SessionEvent) {
        let mut sessions = self.sessions.lock().unwrap();
        if let Some(subscribers) = sessions.get_mut(&session_id) {
            subscribers.retain(|s| s.tx.send(event.clone()).is_ok());
            if subscribers.is_empty() {
                sessions.remove(&session_id);
            }
        }
    }

    #[cfg(test)]
    fn subscriber_count(&self, session_id: Uuid) -> usize {
        self.sessions
            .lock()
            .unwrap()
            .get(&session_id)
            .map(|s| s.len())
            .unwrap_or(0)
    }
}
