// src/chat/mod.rs
// Chat records and their stores: persisted messages, scored alternatives,
// and conflict resolutions. The submodules hold the per-turn machinery.

pub mod broadcast;
pub mod invoke;
pub mod resolver;
pub mod turn;

use std::collections::HashMap;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SenderKind {
    User,
    Agent,
}

/// A persisted session message, user-authored or agent-authored. Agent
/// messages carry the agent id plus metadata (agent_name, latency_ms).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub id: Uuid,
    pub session_id: Uuid,
    pub sender: SenderKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_id: Option<Uuid>,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,
    pub created_at: DateTime<Utc>,
}

/// One candidate from a resolved conflict, with its evaluation score.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoredAlternative {
    pub message_id: Uuid,
    pub agent_id: Uuid,
    pub score: f32,
}

/// Outcome record of one conflict-resolution pass: the winning message and
/// every alternative that competed, including the winner itself.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConflictResolution {
    pub id: Uuid,
    pub session_id: Uuid,
    pub winner_message_id: Uuid,
    pub winner_agent_id: Uuid,
    pub winner_score: f32,
    pub alternatives: Vec<ScoredAlternative>,
    pub rationale: String,
    pub created_at: DateTime<Utc>,
}

/// Persistence boundary for session messages.
pub trait MessageStore: Send + Sync {
    /// Appends a message, assigning its id and timestamp.
    fn append(
        &self,
        session_id: Uuid,
        sender: SenderKind,
        agent_id: Option<Uuid>,
        content: String,
        metadata: Option<Value>,
    ) -> Message;
    /// A stable slice of session history ordered by creation time.
    fn range(&self, session_id: Uuid, skip: usize, limit: usize) -> Vec<Message>;
    /// The trailing `limit` messages in chronological order.
    fn recent(&self, session_id: Uuid, limit: usize) -> Vec<Message>;
}

/// Persistence boundary for conflict-resolution records.
pub trait ResolutionStore: Send + Sync {
    fn append(&self, resolution: ConflictResolution);
    fn range(&self, session_id: Uuid, skip: usize, limit: usize) -> Vec<ConflictResolution>;
}

#[derive(Default)]
pub struct InMemoryMessageStore {
    messages: Mutex<HashMap<Uuid, Vec<Message>>>,
}

impl InMemoryMessageStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl MessageStore for InMemoryMessageStore {
    fn append(
        &self,
        session_id: Uuid,
        sender: SenderKind,
        agent_id: Option<Uuid>,
        content: String,
        metadata: Option<Value>,
    ) -> Message {
        let message = Message {
            id: Uuid::new_v4(),
            session_id,
            sender,
            agent_id,
            content,
            metadata,
            created_at: Utc::now(),
        };
        self.messages
            .lock()
            .unwrap()
            .entry(session_id)
            .or_default()
            .push(message.clone());
        message
    }

    fn range(&self, session_id: Uuid, skip: usize, limit: usize) -> Vec<Message> {
        let messages = self.messages.lock().unwrap();
        let Some(list) = messages.get(&session_id) else {
            return Vec::new();
        };
        // Insertion order already matches created_at; a stable sort keeps
        // same-timestamp neighbours in place.
        let mut ordered = list.clone();
        ordered.sort_by_key(|m| m.created_at);
        ordered.into_iter().skip(skip).take(limit).collect()
    }

    fn recent(&self, session_id: Uuid, limit: usize) -> Vec<Message> {
        let messages = self.messages.lock().unwrap();
        let Some(list) = messages.get(&session_id) else {
            return Vec::new();
        };
        let start = list.len().saturating_sub(limit);
        list[start..].to_vec()
    }
}

#[derive(Default)]
pub struct InMemoryResolutionStore {
    resolutions: Mutex<HashMap<Uuid, Vec<ConflictResolution>>>,
}

impl InMemoryResolutionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ResolutionStore for InMemoryResolutionStore {
    fn append(&self, resolution: ConflictResolution) {
        self.resolutions
            .lock()
            .unwrap()
            .entry(resolution.session_id)
            .or_default()
            .push(resolution);
    }

    fn range(&self, session_id: Uuid, skip: usize, limit: usize) -> Vec<ConflictResolution> {
        self.resolutions
            .lock()
            .unwrap()
            .get(&session_id)
            .map(|list| list.iter().skip(skip).take(limit).cloned().collect())
            .unwrap_or_default()
    }
}
