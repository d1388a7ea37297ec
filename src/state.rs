// src/state.rs
// Shared application state handed to every handler. Cheap to clone; all
// fields are Arcs over the real stores and services.

use std::sync::Arc;
use std::time::Duration;

use crate::agent::{AgentStore, InMemoryAgentStore};
use crate::auth::TokenStore;
use crate::chat::broadcast::SessionChannels;
use crate::chat::invoke::InvocationEngine;
use crate::chat::resolver::ConflictResolver;
use crate::chat::turn::TurnOrchestrator;
use crate::chat::{InMemoryMessageStore, InMemoryResolutionStore, MessageStore, ResolutionStore};
use crate::config::CONFIG;
use crate::provider::{ProviderRegistry, ResolveProvider};
use crate::session::{InMemorySessionStore, SessionStore};

#[derive(Clone)]
pub struct AppState {
    pub agents: Arc<dyn AgentStore>,
    pub sessions: Arc<dyn SessionStore>,
    pub messages: Arc<dyn MessageStore>,
    pub resolutions: Arc<dyn ResolutionStore>,
    pub registry: Arc<ProviderRegistry>,
    pub channels: Arc<SessionChannels>,
    pub tokens: Arc<TokenStore>,
    pub orchestrator: Arc<TurnOrchestrator>,
}

impl AppState {
    /// Wires the full service graph from CONFIG.
    pub fn assemble() -> Self {
        let registry = Arc::new(ProviderRegistry::new());
        let resolver: Arc<dyn ResolveProvider> = registry.clone();
        Self::with_resolver(resolver, registry)
    }

    /// Assembly with an injected provider resolver, the seam tests use to
    /// substitute scripted providers.
    pub fn with_resolver(
        resolver: Arc<dyn ResolveProvider>,
        registry: Arc<ProviderRegistry>,
    ) -> Self {
        let agents: Arc<dyn AgentStore> = Arc::new(InMemoryAgentStore::new());
        let sessions: Arc<dyn SessionStore> = Arc::new(InMemorySessionStore::new());
        let messages: Arc<dyn MessageStore> = Arc::new(InMemoryMessageStore::new());
        let resolutions: Arc<dyn ResolutionStore> = Arc::new(InMemoryResolutionStore::new());
        let channels = Arc::new(SessionChannels::new());

        let engine = InvocationEngine::new(
            resolver.clone(),
            CONFIG.max_concurrent_generations,
            Duration::from_secs(CONFIG.invocation_timeout_secs),
        );
        let conflict = ConflictResolver::new(
            resolver,
            CONFIG.scoring_provider.clone(),
            CONFIG.scoring_model.clone(),
            CONFIG.max_concurrent_scoring,
            Duration::from_secs(CONFIG.scoring_timeout_secs),
        );
        let orchestrator = Arc::new(TurnOrchestrator::new(
            sessions.clone(),
            agents.clone(),
            messages.clone(),
            resolutions.clone(),
            engine,
            conflict,
            channels.clone(),
            CONFIG.history_limit,
        ));

        Self {
            agents,
            sessions,
            messages,
            resolutions,
            registry,
            channels,
            tokens: Arc::new(TokenStore::new()),
            orchestrator,
        }
    }
}
