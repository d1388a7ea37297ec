// src/chat/turn.rs
// Turn orchestrator: the single pipeline a user message flows through.
// Persist, broadcast, fan out to the placed agents, persist and broadcast
// the replies, then resolve if more than one agent answered.

use std::sync::Arc;

use serde_json::{json, Value};
use tracing::{debug, info};
use uuid::Uuid;

use crate::agent::{AgentConfig, AgentStore};
use crate::chat::broadcast::{SessionChannels, SessionEvent};
use crate::chat::invoke::InvocationEngine;
use crate::chat::resolver::{Candidate, ConflictResolver};
use crate::chat::{ConflictResolution, Message, MessageStore, ResolutionStore, ScoredAlternative, SenderKind};
use crate::error::TurnError;
use crate::session::{SessionAgent, SessionStore};

/// Pipeline stages, in order. Failed is terminal from any stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnState {
    Received,
    Persisted,
    Dispatched,
    Collected,
    Resolved,
    Broadcast,
    Done,
    Failed,
}

/// Everything one turn produced.
pub struct TurnOutcome {
    pub user_message: Message,
    pub agent_messages: Vec<Message>,
    pub resolution: Option<ConflictResolution>,
}

pub struct TurnOrchestrator {
    sessions: Arc<dyn SessionStore>,
    agents: Arc<dyn AgentStore>,
    messages: Arc<dyn MessageStore>,
    resolutions: Arc<dyn ResolutionStore>,
    engine: InvocationEngine,
    resolver: ConflictResolver,
    channels: Arc<SessionChannels>,
    history_limit: usize,
}

impl TurnOrchestrator {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        sessions: Arc<dyn SessionStore>,
        agents: Arc<dyn AgentStore>,
        messages: Arc<dyn MessageStore>,
        resolutions: Arc<dyn ResolutionStore>,
        engine: InvocationEngine,
        resolver: ConflictResolver,
        channels: Arc<SessionChannels>,
        history_limit: usize,
    ) -> Self {
        Self {
            sessions,
            agents,
            messages,
            resolutions,
            engine,
            resolver,
            channels,
            history_limit,
        }
    }

    /// Runs one full turn. The user message is persisted before any agent
    /// runs, so even a turn where every agent fails loses no input.
    pub async fn run_turn(
        &self,
        user_id: Uuid,
        session_id: Uuid,
        content: String,
        metadata: Option<Value>,
    ) -> Result<TurnOutcome, TurnError> {
        let mut state = TurnState::Received;
        debug!("Turn {:?} for session {}", state, session_id);

        let session = self.sessions.get(session_id).ok_or(TurnError::SessionNotFound)?;
        if session.user_id != user_id {
            return Err(TurnError::NotOwned);
        }

        let user_message =
            self.messages
                .append(session_id, SenderKind::User, None, content, metadata);
        self.channels.publish(
            session_id,
            SessionEvent::Message { data: user_message.clone() },
        );
        state = TurnState::Persisted;
        debug!("Turn {:?}", state);

        let roster = self.roster(session_id, user_id);
        if roster.is_empty() {
            debug!("Session {} has no invocable agents; turn ends after the user message", session_id);
            return Ok(TurnOutcome {
                user_message,
                agent_messages: Vec::new(),
                resolution: None,
            });
        }

        state = TurnState::Dispatched;
        debug!("Turn {:?}: {} agents", state, roster.len());

        let history = self.messages.recent(session_id, self.history_limit);
        let results = self.engine.invoke_all(&roster, &history).await;

        let attempted = results.len();
        state = TurnState::Collected;
        debug!("Turn {:?}: {} results", state, attempted);

        let mut agent_messages = Vec::new();
        let mut candidates = Vec::new();
        for result in results {
            let text = match result.outcome {
                Ok(text) => text,
                Err(_) => continue,
            };
            let message = self.messages.append(
                session_id,
                SenderKind::Agent,
                Some(result.agent_id),
                text.clone(),
                Some(json!({
                    "agent_name": result.agent_name,
                    "latency_ms": result.latency.as_millis() as u64,
                })),
            );
            self.channels.publish(
                session_id,
                SessionEvent::Message { data: message.clone() },
            );
            candidates.push(Candidate {
                message_id: message.id,
                agent_id: result.agent_id,
                agent_name: result.agent_name,
                text,
                arrival: result.arrival,
            });
            agent_messages.push(message);
        }

        if agent_messages.is_empty() {
            debug!("Turn {:?}: every agent failed", TurnState::Failed);
            return Err(TurnError::AllAgentsFailed(attempted));
        }

        let resolution = match self.resolver.resolve(candidates).await {
            Some(outcome) => {
                let record = ConflictResolution {
                    id: Uuid::new_v4(),
                    session_id,
                    winner_message_id: outcome.winner.candidate.message_id,
                    winner_agent_id: outcome.winner.candidate.agent_id,
                    winner_score: outcome.winner.score,
                    alternatives: outcome
                        .alternatives
                        .iter()
                        .map(|alt| ScoredAlternative {
                            message_id: alt.candidate.message_id,
                            agent_id: alt.candidate.agent_id,
                            score: alt.score,
                        })
                        .collect(),
                    rationale: outcome.rationale,
                    created_at: chrono::Utc::now(),
                };
                self.resolutions.append(record.clone());
                self.channels.publish(
                    session_id,
                    SessionEvent::ConflictResolution { data: record.clone() },
                );
                Some(record)
            }
            None => None,
        };
        state = TurnState::Resolved;
        debug!("Turn {:?}", state);

        state = TurnState::Done;
        info!(
            "Turn {:?}: {} replies, resolution: {}",
            state,
            agent_messages.len(),
            resolution.is_some()
        );

        Ok(TurnOutcome {
            user_message,
            agent_messages,
            resolution,
        })
    }

    /// Verifies ownership of a session without running a turn.
    pub fn authorize(&self, user_id: Uuid, session_id: Uuid) -> Result<(), TurnError> {
        let session = self.sessions.get(session_id).ok_or(TurnError::SessionNotFound)?;
        if session.user_id != user_id {
            return Err(TurnError::NotOwned);
        }
        Ok(())
    }

    /// Resolves placements to invocable agent configs. Placements whose
    /// agent was deleted or is no longer visible to the user are skipped.
    fn roster(&self, session_id: Uuid, user_id: Uuid) -> Vec<(AgentConfig, SessionAgent)> {
        self.sessions
            .agents(session_id)
            .into_iter()
            .filter_map(|placement| {
                self.agents
                    .visible_to(placement.agent_id, user_id)
                    .map(|config| (config, placement))
            })
            .collect()
    }
}
