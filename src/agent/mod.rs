// src/agent/mod.rs
// Agent configurations and the store that owns them. An agent is a named
// persona bound to one provider/model pair; placements in sessions refer to
// these by id.

use std::collections::HashMap;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// A configured agent persona.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    pub id: Uuid,
    pub user_id: Uuid,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub system_prompt: String,
    /// Provider id, matched case-insensitively at invocation time.
    pub provider: String,
    /// Model override; the provider default applies when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    pub temperature: f32,
    pub max_tokens: u32,
    /// Provider-specific generation options, merged into request bodies.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub options: Option<Value>,
    /// Public agents are visible (and placeable) for every user.
    #[serde(default)]
    pub public: bool,
    pub created_at: DateTime<Utc>,
}

/// Creation/update payload. Missing fields take the documented defaults.
#[derive(Debug, Clone, Deserialize)]
pub struct NewAgent {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub system_prompt: String,
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default)]
    pub options: Option<Value>,
    #[serde(default)]
    pub public: bool,
}

fn default_temperature() -> f32 {
    0.7
}

fn default_max_tokens() -> u32 {
    1000
}

/// Persistence boundary for agent configurations.
pub trait AgentStore: Send + Sync {
    fn create(&self, user_id: Uuid, new: NewAgent) -> AgentConfig;
    fn get(&self, id: Uuid) -> Option<AgentConfig>;
    fn list_owned(&self, user_id: Uuid) -> Vec<AgentConfig>;
    fn list_public(&self) -> Vec<AgentConfig>;
    /// Updates an agent the user owns. Returns None when absent or not owned.
    fn update(&self, id: Uuid, user_id: Uuid, new: NewAgent) -> Option<AgentConfig>;
    /// Deletes an agent the user owns. False when absent or not owned.
    fn delete(&self, id: Uuid, user_id: Uuid) -> bool;
    /// Copies a visible agent into the user's own collection as a private
    /// agent. None when the source is absent or not visible to the user.
    fn duplicate(&self, id: Uuid, user_id: Uuid) -> Option<AgentConfig>;

    /// An agent is visible to a user when they own it or it is public.
    fn visible_to(&self, id: Uuid, user_id: Uuid) -> Option<AgentConfig> {
        self.get(id)
            .filter(|a| a.user_id == user_id || a.public)
    }
}

#[derive(Default)]
pub struct InMemoryAgentStore {
    agents: Mutex<HashMap<Uuid, AgentConfig>>,
}

impl InMemoryAgentStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl AgentStore for InMemoryAgentStore {
    fn create(&self, user_id: Uuid, new: NewAgent) -> AgentConfig {
        let agent = AgentConfig {
            id: Uuid::new_v4(),
            user_id,
            name: new.name,
            description: new.description,
            system_prompt: new.system_prompt,
            provider: new.provider,
            model: new.model,
            temperature: new.temperature,
            max_tokens: new.max_tokens,
            options: new.options,
            public: new.public,
            created_at: Utc::now(),
        };
        self.agents.lock().unwrap().insert(agent.id, agent.clone());
        agent
    }

    fn get(&self, id: Uuid) -> Option<AgentConfig> {
        self.agents.lock().unwrap().get(&id).cloned()
    }

    fn list_owned(&self, user_id: Uuid) -> Vec<AgentConfig> {
        let mut owned: Vec<AgentConfig> = self
            .agents
            .lock()
            .unwrap()
            .values()
            .filter(|a| a.user_id == user_id)
            .cloned()
            .collect();
        owned.sort_by_key(|a| a.created_at);
        owned
    }

    fn list_public(&self) -> Vec<AgentConfig> {
        let mut public: Vec<AgentConfig> = self
            .agents
            .lock()
            .unwrap()
            .values()
            .filter(|a| a.public)
            .cloned()
            .collect();
        public.sort_by_key(|a| a.created_at);
        public
    }

    fn update(&self, id: Uuid, user_id: Uuid, new: NewAgent) -> Option<AgentConfig> {
        let mut agents = self.agents.lock().unwrap();
        let agent = agents.get_mut(&id).filter(|a| a.user_id == user_id)?;
        agent.name = new.name;
        agent.description = new.description;
        agent.system_prompt = new.system_prompt;
        agent.provider = new.provider;
        agent.model = new.model;
        agent.temperature = new.temperature;
        agent.max_tokens = new.max_tokens;
        agent.options = new.options;
        agent.public = new.public;
        Some(agent.clone())
    }

    fn delete(&self, id: Uuid, user_id: Uuid) -> bool {
        let mut agents = self.agents.lock().unwrap();
        match agents.get(&id) {
            Some(a) if a.user_id == user_id => {
                agents.remove(&id);
                true
            }
            _ => false,
        }
    }

    fn duplicate(&self, id: Uuid, user_id: Uuid) -> Option<AgentConfig> {
        let source = self.visible_to(id, user_id)?;
        let copy = AgentConfig {
            id: Uuid::new_v4(),
            user_id,
            name: format!("{} (copy)", source.name),
            public: false,
            created_at: Utc::now(),
            ..source
        };
        self.agents.lock().unwrap().insert(copy.id, copy.clone());
        Some(copy)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(name: &str, public: bool) -> NewAgent {
        NewAgent {
            name: name.into(),
            description: String::new(),
            system_prompt: "You are helpful.".into(),
            provider: "gemini".into(),
            model: None,
            temperature: 0.7,
            max_tokens: 1000,
            options: None,
            public,
        }
    }

    #[test]
    fn owner_sees_private_agent_others_do_not() {
        let store = InMemoryAgentStore::new();
        let owner = Uuid::new_v4();
        let stranger = Uuid::new_v4();
        let agent = store.create(owner, sample("private", false));

        assert!(store.visible_to(agent.id, owner).is_some());
        assert!(store.visible_to(agent.id, stranger).is_none());
    }

    #[test]
    fn public_agents_are_visible_to_everyone() {
        let store = InMemoryAgentStore::new();
        let owner = Uuid::new_v4();
        let stranger = Uuid::new_v4();
        let agent = store.create(owner, sample("shared", true));

        assert!(store.visible_to(agent.id, stranger).is_some());
        assert_eq!(store.list_public().len(), 1);
    }

    #[test]
    fn duplicate_produces_a_private_copy_owned_by_the_caller() {
        let store = InMemoryAgentStore::new();
        let owner = Uuid::new_v4();
        let copier = Uuid::new_v4();
        let agent = store.create(owner, sample("shared", true));

        let copy = store.duplicate(agent.id, copier).expect("visible source");
        assert_eq!(copy.user_id, copier);
        assert!(!copy.public);
        assert_ne!(copy.id, agent.id);
        assert_eq!(copy.system_prompt, agent.system_prompt);
    }

    #[test]
    fn duplicate_of_invisible_agent_fails() {
        let store = InMemoryAgentStore::new();
        let owner = Uuid::new_v4();
        let stranger = Uuid::new_v4();
        let agent = store.create(owner, sample("private", false));

        assert!(store.duplicate(agent.id, stranger).is_none());
    }

    #[test]
    fn update_and_delete_require_ownership() {
        let store = InMemoryAgentStore::new();
        let owner = Uuid::new_v4();
        let stranger = Uuid::new_v4();
        let agent = store.create(owner, sample("mine", false));

        assert!(store.update(agent.id, stranger, sample("stolen", false)).is_none());
        assert!(!store.delete(agent.id, stranger));
        assert!(store.update(agent.id, owner, sample("renamed", false)).is_some());
        assert!(store.delete(agent.id, owner));
        assert!(store.get(agent.id).is_none());
    }
}
