// src/chat/invoke.rs
// Concurrent fan-out of one user turn to every agent placed in the session.
// Each invocation runs under its own deadline and records its own outcome;
// one agent failing never disturbs the others.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::future::join_all;
use tokio::sync::Semaphore;
use tokio::time::timeout;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::agent::AgentConfig;
use crate::chat::{Message, SenderKind};
use crate::error::ProviderError;
use crate::provider::{ChatTurn, GenerationParams, ResolveProvider};
use crate::session::SessionAgent;

/// Outcome of one agent invocation. `arrival` is the completion rank among
/// this turn's invocations, used as the deterministic tie-breaker downstream.
pub struct GenerationResult {
    pub agent_id: Uuid,
    pub agent_name: String,
    pub outcome: Result<String, ProviderError>,
    pub latency: Duration,
    pub arrival: usize,
}

pub struct InvocationEngine {
    resolver: Arc<dyn ResolveProvider>,
    limit: Arc<Semaphore>,
    deadline: Duration,
}

impl InvocationEngine {
    pub fn new(resolver: Arc<dyn ResolveProvider>, max_concurrent: usize, deadline: Duration) -> Self {
        Self {
            resolver,
            limit: Arc::new(Semaphore::new(max_concurrent)),
            deadline,
        }
    }

    /// Invokes every placed agent concurrently against the shared history.
    /// Results come back in placement order; arrival ranks record completion
    /// order. The deadline covers queueing behind the concurrency limit.
    pub async fn invoke_all(
        &self,
        agents: &[(AgentConfig, SessionAgent)],
        history: &[Message],
    ) -> Vec<GenerationResult> {
        let arrivals = Arc::new(AtomicUsize::new(0));

        let futures = agents.iter().map(|(agent, placement)| {
            let resolver = Arc::clone(&self.resolver);
            let limit = Arc::clone(&self.limit);
            let arrivals = Arc::clone(&arrivals);
            let turns = agent_history(agent, history);
            let params = effective_params(agent, placement);
            let agent = agent.clone();

            async move {
                let started = Instant::now();
                let outcome = timeout(self.deadline, async {
                    let _permit = limit
                        .acquire()
                        .await
                        .map_err(|_| ProviderError::Timeout)?;
                    let provider = resolver.resolve(
                        &agent.provider,
                        None,
                        agent.model.clone(),
                    )?;
                    provider.generate_chat_response(&turns, &params).await
                })
                .await
                .unwrap_or(Err(ProviderError::Timeout));

                let latency = started.elapsed();
                let arrival = arrivals.fetch_add(1, Ordering::SeqCst);

                match &outcome {
                    Ok(_) => debug!(
                        "Agent '{}' responded in {}ms (arrival {})",
                        agent.name,
                        latency.as_millis(),
                        arrival
                    ),
                    Err(err) => warn!("Agent '{}' failed: {}", agent.name, err),
                }

                GenerationResult {
                    agent_id: agent.id,
                    agent_name: agent.name,
                    outcome,
                    latency,
                    arrival,
                }
            }
        });

        join_all(futures).await
    }
}

/// Builds the history from one agent's point of view: its own system prompt
/// leads, its own past messages read as assistant turns, and everything else
/// (the user and the other agents) reads as user turns. Other agents' lines
/// are labeled so the model can tell the speakers apart.
fn agent_history(agent: &AgentConfig, history: &[Message]) -> Vec<ChatTurn> {
    let mut turns = Vec::with_capacity(history.len() + 1);
    turns.push(ChatTurn::system(agent.system_prompt.clone()));

    for message in history {
        match message.sender {
            SenderKind::User => turns.push(ChatTurn::user(message.content.clone())),
            SenderKind::Agent if message.agent_id == Some(agent.id) => {
                turns.push(ChatTurn::assistant(message.content.clone()));
            }
            SenderKind::Agent => {
                let speaker = message
                    .metadata
                    .as_ref()
                    .and_then(|m| m["agent_name"].as_str())
                    .unwrap_or("Another agent");
                turns.push(ChatTurn::user(format!("[{}]: {}", speaker, message.content)));
            }
        }
    }

    turns
}

/// Merges the agent config's generation settings with the placement's
/// overrides. `temperature` and `max_tokens` override the scalars; every
/// other override key lands in the provider options, shadowing the agent's
/// own option of the same name.
fn effective_params(agent: &AgentConfig, placement: &SessionAgent) -> GenerationParams {
    let mut params = GenerationParams {
        temperature: agent.temperature,
        max_tokens: agent.max_tokens,
        options: serde_json::Map::new(),
    };

    if let Some(options) = agent.options.as_ref().and_then(|v| v.as_object()) {
        params.options = options.clone();
    }

    if let Some(overrides) = placement.overrides.as_ref().and_then(|v| v.as_object()) {
        for (key, value) in overrides {
            match key.as_str() {
                "temperature" => {
                    if let Some(t) = value.as_f64() {
                        params.temperature = t as f32;
                    }
                }
                "max_tokens" => {
                    if let Some(n) = value.as_u64() {
                        params.max_tokens = n as u32;
                    }
                }
                _ => {
                    params.options.insert(key.clone(), value.clone());
                }
            }
        }
    }

    params
}
