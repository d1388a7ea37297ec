// src/session/mod.rs
// Sandbox sessions and agent placements. A session is the unit of
// conversation and broadcast; placements pin agent configs onto a session
// canvas with a position and optional generation overrides.

use std::collections::HashMap;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub id: Uuid,
    pub user_id: Uuid,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewSession {
    pub name: String,
    #[serde(default)]
    pub description: String,
}

/// One agent placed in a session. Overrides shadow the agent config's
/// generation parameters for this placement only.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionAgent {
    pub id: Uuid,
    pub session_id: Uuid,
    pub agent_id: Uuid,
    pub position_x: f32,
    pub position_y: f32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub overrides: Option<Value>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewPlacement {
    pub agent_id: Uuid,
    #[serde(default)]
    pub position_x: f32,
    #[serde(default)]
    pub position_y: f32,
    #[serde(default)]
    pub overrides: Option<Value>,
}

/// Persistence boundary for sessions and placements.
pub trait SessionStore: Send + Sync {
    fn create(&self, user_id: Uuid, new: NewSession) -> Session;
    fn get(&self, id: Uuid) -> Option<Session>;
    fn list(&self, user_id: Uuid) -> Vec<Session>;
    /// Deletes an owned session and all of its placements.
    fn delete(&self, id: Uuid, user_id: Uuid) -> bool;

    fn add_agent(&self, session_id: Uuid, new: NewPlacement) -> SessionAgent;
    /// Placements for a session, in insertion order.
    fn agents(&self, session_id: Uuid) -> Vec<SessionAgent>;
    fn remove_agent(&self, session_id: Uuid, placement_id: Uuid) -> bool;
    fn set_position(&self, session_id: Uuid, placement_id: Uuid, x: f32, y: f32) -> Option<SessionAgent>;
}

#[derive(Default)]
struct Inner {
    sessions: HashMap<Uuid, Session>,
    // Keyed by session id; Vec keeps placement insertion order.
    placements: HashMap<Uuid, Vec<SessionAgent>>,
}

#[derive(Default)]
pub struct InMemorySessionStore {
    inner: Mutex<Inner>,
}

impl InMemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SessionStore for InMemorySessionStore {
    fn create(&self, user_id: Uuid, new: NewSession) -> Session {
        let session = Session {
            id: Uuid::new_v4(),
            user_id,
            name: new.name,
            description: new.description,
            created_at: Utc::now(),
        };
        let mut inner = self.inner.lock().unwrap();
        inner.sessions.insert(session.id, session.clone());
        inner.placements.insert(session.id, Vec::new());
        session
    }

    fn get(&self, id: Uuid) -> Option<Session> {
        self.inner.lock().unwrap().sessions.get(&id).cloned()
    }

    fn list(&self, user_id: Uuid) -> Vec<Session> {
        let inner = self.inner.lock().unwrap();
        let mut sessions: Vec<Session> = inner
            .sessions
            .values()
            .filter(|s| s.user_id == user_id)
            .cloned()
            .collect();
        sessions.sort_by_key(|s| s.created_at);
        sessions
    }

    fn delete(&self, id: Uuid, user_id: Uuid) -> bool {
        let mut inner = self.inner.lock().unwrap();
        match inner.sessions.get(&id) {
            Some(s) if s.user_id == user_id => {
                inner.sessions.remove(&id);
                inner.placements.remove(&id);
                true
            }
            _ => false,
        }
    }

    fn add_agent(&self, session_id: Uuid, new: NewPlacement) -> SessionAgent {
        let placement = SessionAgent {
            id: Uuid::new_v4(),
            session_id,
            agent_id: new.agent_id,
            position_x: new.position_x,
            position_y: new.position_y,
            overrides: new.overrides,
        };
        self.inner
            .lock()
            .unwrap()
            .placements
            .entry(session_id)
            .or_default()
            .push(placement.clone());
        placement
    }

    fn agents(&self, session_id: Uuid) -> Vec<SessionAgent> {
        self.inner
            .lock()
            .unwrap()
            .placements
            .get(&session_id)
            .cloned()
            .unwrap_or_default()
    }

    fn remove_agent(&self, session_id: Uuid, placement_id: Uuid) -> bool {
        let mut inner = self.inner.lock().unwrap();
        match inner.placements.get_mut(&session_id) {
            Some(list) => {
                let before = list.len();
                list.retain(|p| p.id != placement_id);
                list.len() != before
            }
            None => false,
        }
    }

    fn set_position(&self, session_id: Uuid, placement_id: Uuid, x: f32, y: f32) -> Option<SessionAgent> {
        let mut inner = self.inner.lock().unwrap();
        let placement = inner
            .placements
            .get_mut(&session_id)?
            .iter_mut()
            .find(|p| p.id == placement_id)?;
        placement.position_x = x;
        placement.position_y = y;
        Some(placement.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn place(agent_id: Uuid) -> NewPlacement {
        NewPlacement {
            agent_id,
            position_x: 0.0,
            position_y: 0.0,
            overrides: None,
        }
    }

    #[test]
    fn delete_cascades_to_placements() {
        let store = InMemorySessionStore::new();
        let user = Uuid::new_v4();
        let session = store.create(user, NewSession { name: "s".into(), description: String::new() });
        store.add_agent(session.id, place(Uuid::new_v4()));
        store.add_agent(session.id, place(Uuid::new_v4()));

        assert!(store.delete(session.id, user));
        assert!(store.get(session.id).is_none());
        assert!(store.agents(session.id).is_empty());
    }

    #[test]
    fn delete_requires_ownership() {
        let store = InMemorySessionStore::new();
        let session = store.create(Uuid::new_v4(), NewSession { name: "s".into(), description: String::new() });
        assert!(!store.delete(session.id, Uuid::new_v4()));
        assert!(store.get(session.id).is_some());
    }

    #[test]
    fn placements_keep_insertion_order() {
        let store = InMemorySessionStore::new();
        let session = store.create(Uuid::new_v4(), NewSession { name: "s".into(), description: String::new() });
        let a = store.add_agent(session.id, place(Uuid::new_v4()));
        let b = store.add_agent(session.id, place(Uuid::new_v4()));

        let agents = store.agents(session.id);
        assert_eq!(agents.len(), 2);
        assert_eq!(agents[0].id, a.id);
        assert_eq!(agents[1].id, b.id);
    }

    #[test]
    fn position_updates_apply_in_place() {
        let store = InMemorySessionStore::new();
        let session = store.create(Uuid::new_v4(), NewSession { name: "s".into(), description: String::new() });
        let placement = store.add_agent(session.id, place(Uuid::new_v4()));

        let moved = store
            .set_position(session.id, placement.id, 120.0, -40.0)
            .expect("placement exists");
        assert_eq!(moved.position_x, 120.0);
        assert_eq!(moved.position_y, -40.0);
        assert_eq!(store.agents(session.id)[0].position_x, 120.0);
    }

    #[test]
    fn remove_agent_is_idempotent() {
        let store = InMemorySessionStore::new();
        let session = store.create(Uuid::new_v4(), NewSession { name: "s".into(), description: String::new() });
        let placement = store.add_agent(session.id, place(Uuid::new_v4()));

        assert!(store.remove_agent(session.id, placement.id));
        assert!(!store.remove_agent(session.id, placement.id));
    }
}
