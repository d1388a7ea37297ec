// tests/turn_flow.rs
// End-to-end turn processing against scripted providers: fan-out, failure
// isolation, conflict resolution, and broadcast, with no network involved.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;
use uuid::Uuid;

use colloquy::agent::{AgentStore, InMemoryAgentStore, NewAgent};
use colloquy::chat::broadcast::SessionChannels;
use colloquy::chat::invoke::InvocationEngine;
use colloquy::chat::resolver::ConflictResolver;
use colloquy::chat::turn::TurnOrchestrator;
use colloquy::chat::{
    InMemoryMessageStore, InMemoryResolutionStore, MessageStore, ResolutionStore, SenderKind,
};
use colloquy::error::{ProviderError, TurnError};
use colloquy::provider::{
    ChatTurn, GenerationParams, ModelInfo, ModelProvider, ResolveProvider,
};
use colloquy::session::{InMemorySessionStore, NewPlacement, NewSession, SessionStore};

/// Replies with a fixed line in chat; scores by substring lookup when used
/// as the scoring backend.
struct Scripted {
    reply: Result<String, ProviderError>,
    scores: Vec<(&'static str, &'static str)>,
}

impl Scripted {
    fn replying(reply: &str) -> Arc<Self> {
        Arc::new(Self { reply: Ok(reply.into()), scores: vec![] })
    }

    fn failing(err: ProviderError) -> Arc<Self> {
        Arc::new(Self { reply: Err(err), scores: vec![] })
    }

    fn scoring(scores: Vec<(&'static str, &'static str)>) -> Arc<Self> {
        Arc::new(Self { reply: Ok(String::new()), scores })
    }
}

#[async_trait]
impl ModelProvider for Scripted {
    fn info(&self) -> ModelInfo {
        ModelInfo {
            name: "scripted".into(),
            provider: "test".into(),
            description: String::new(),
            is_default: false,
            capabilities: vec![],
            max_tokens: 0,
            supports_system_message: true,
        }
    }

    async fn generate_text(
        &self,
        prompt: &str,
        _system: Option<&str>,
        _params: &GenerationParams,
    ) -> Result<String, ProviderError> {
        for (needle, reply) in &self.scores {
            if prompt.contains(needle) {
                return Ok((*reply).to_string());
            }
        }
        Ok("0.5".into())
    }

    async fn generate_chat_response(
        &self,
        _history: &[ChatTurn],
        _params: &GenerationParams,
    ) -> Result<String, ProviderError> {
        self.reply.clone()
    }
}

#[derive(Default)]
struct StubResolver {
    providers: HashMap<String, Arc<dyn ModelProvider>>,
}

impl StubResolver {
    fn with(mut self, id: &str, provider: Arc<dyn ModelProvider>) -> Self {
        self.providers.insert(id.to_string(), provider);
        self
    }
}

impl ResolveProvider for StubResolver {
    fn resolve(
        &self,
        provider: &str,
        _api_key: Option<String>,
        _model: Option<String>,
    ) -> Result<Arc<dyn ModelProvider>, ProviderError> {
        self.providers
            .get(&provider.to_lowercase())
            .cloned()
            .ok_or_else(|| ProviderError::UnsupportedProvider(provider.to_string()))
    }
}

struct Harness {
    agents: Arc<dyn AgentStore>,
    sessions: Arc<dyn SessionStore>,
    messages: Arc<dyn MessageStore>,
    resolutions: Arc<dyn ResolutionStore>,
    channels: Arc<SessionChannels>,
    orchestrator: TurnOrchestrator,
    user_id: Uuid,
    session_id: Uuid,
}

fn harness(resolver: StubResolver) -> Harness {
    let resolver: Arc<dyn ResolveProvider> = Arc::new(resolver);
    let agents: Arc<dyn AgentStore> = Arc::new(InMemoryAgentStore::new());
    let sessions: Arc<dyn SessionStore> = Arc::new(InMemorySessionStore::new());
    let messages: Arc<dyn MessageStore> = Arc::new(InMemoryMessageStore::new());
    let resolutions: Arc<dyn ResolutionStore> = Arc::new(InMemoryResolutionStore::new());
    let channels = Arc::new(SessionChannels::new());

    let engine = InvocationEngine::new(resolver.clone(), 4, Duration::from_secs(5));
    let conflict = ConflictResolver::new(resolver, "score".into(), None, 2, Duration::from_secs(5));
    let orchestrator = TurnOrchestrator::new(
        sessions.clone(),
        agents.clone(),
        messages.clone(),
        resolutions.clone(),
        engine,
        conflict,
        channels.clone(),
        50,
    );

    let user_id = Uuid::new_v4();
    let session = sessions.create(
        user_id,
        NewSession { name: "sandbox".into(), description: String::new() },
    );
    let session_id = session.id;

    Harness {
        agents,
        sessions,
        messages,
        resolutions,
        channels,
        orchestrator,
        user_id,
        session_id,
    }
}

impl Harness {
    fn place_agent(&self, name: &str, provider: &str) -> Uuid {
        let agent = self.agents.create(
            self.user_id,
            NewAgent {
                name: name.into(),
                description: String::new(),
                system_prompt: "Answer briefly.".into(),
                provider: provider.into(),
                model: None,
                temperature: 0.7,
                max_tokens: 256,
                options: None,
                public: false,
            },
        );
        self.sessions.add_agent(
            self.session_id,
            NewPlacement {
                agent_id: agent.id,
                position_x: 0.0,
                position_y: 0.0,
                overrides: None,
            },
        );
        agent.id
    }
}

#[tokio::test]
async fn single_agent_turn_produces_no_resolution() {
    let h = harness(StubResolver::default().with("alpha", Scripted::replying("only answer")));
    h.place_agent("Solo", "alpha");

    let outcome = h
        .orchestrator
        .run_turn(h.user_id, h.session_id, "hello".into(), None)
        .await
        .expect("turn succeeds");

    assert_eq!(outcome.agent_messages.len(), 1);
    assert!(outcome.resolution.is_none());
    assert!(h.resolutions.range(h.session_id, 0, 10).is_empty());
}

#[tokio::test]
async fn two_agents_conflict_and_the_higher_score_wins() {
    let resolver = StubResolver::default()
        .with("alpha", Scripted::replying("alpha answer"))
        .with("beta", Scripted::replying("beta answer"))
        .with(
            "score",
            Scripted::scoring(vec![("alpha answer", "0.6"), ("beta answer", "0.8")]),
        );
    let h = harness(resolver);
    h.place_agent("A", "alpha");
    let beta_id = h.place_agent("B", "beta");

    let outcome = h
        .orchestrator
        .run_turn(h.user_id, h.session_id, "decide".into(), None)
        .await
        .expect("turn succeeds");

    let resolution = outcome.resolution.expect("two candidates conflict");
    assert_eq!(resolution.winner_agent_id, beta_id);
    assert!((resolution.winner_score - 0.8).abs() < f32::EPSILON);
    assert_eq!(resolution.alternatives.len(), 2);
    assert!(resolution
        .alternatives
        .iter()
        .all(|alt| alt.score <= resolution.winner_score));
    assert_eq!(h.resolutions.range(h.session_id, 0, 10).len(), 1);
}

#[tokio::test]
async fn out_of_range_scores_are_clamped() {
    let resolver = StubResolver::default()
        .with("alpha", Scripted::replying("alpha answer"))
        .with("beta", Scripted::replying("beta answer"))
        .with(
            "score",
            Scripted::scoring(vec![("alpha answer", "1.7"), ("beta answer", "0.4")]),
        );
    let h = harness(resolver);
    h.place_agent("A", "alpha");
    h.place_agent("B", "beta");

    let outcome = h
        .orchestrator
        .run_turn(h.user_id, h.session_id, "decide".into(), None)
        .await
        .unwrap();

    let resolution = outcome.resolution.unwrap();
    assert_eq!(resolution.winner_score, 1.0);
    assert!(resolution.alternatives.iter().all(|a| (0.0..=1.0).contains(&a.score)));
}

#[tokio::test]
async fn unparsable_scorer_replies_fall_back_to_neutral() {
    let resolver = StubResolver::default()
        .with("alpha", Scripted::replying("alpha answer"))
        .with("beta", Scripted::replying("beta answer"))
        .with(
            "score",
            Scripted::scoring(vec![("alpha answer", "no idea"), ("beta answer", "none")]),
        );
    let h = harness(resolver);
    h.place_agent("A", "alpha");
    h.place_agent("B", "beta");

    let outcome = h
        .orchestrator
        .run_turn(h.user_id, h.session_id, "decide".into(), None)
        .await
        .unwrap();

    let resolution = outcome.resolution.unwrap();
    assert!(resolution.alternatives.iter().all(|a| a.score == 0.5));
    // Neutral tie: the earliest arrival wins, and some winner always exists.
    assert_eq!(resolution.winner_score, 0.5);
}

#[tokio::test]
async fn one_failing_agent_does_not_disturb_the_others() {
    let resolver = StubResolver::default()
        .with("alpha", Scripted::replying("alpha answer"))
        .with("broken", Scripted::failing(ProviderError::Timeout))
        .with("beta", Scripted::replying("beta answer"))
        .with("score", Scripted::scoring(vec![]));
    let h = harness(resolver);
    h.place_agent("A", "alpha");
    h.place_agent("Broken", "broken");
    h.place_agent("B", "beta");

    let outcome = h
        .orchestrator
        .run_turn(h.user_id, h.session_id, "go".into(), None)
        .await
        .expect("two of three succeed");

    assert_eq!(outcome.agent_messages.len(), 2);
    assert!(outcome.resolution.is_some());
}

#[tokio::test]
async fn all_agents_failing_keeps_the_user_message() {
    let resolver = StubResolver::default()
        .with("broken", Scripted::failing(ProviderError::Timeout));
    let h = harness(resolver);
    h.place_agent("B1", "broken");
    h.place_agent("B2", "broken");

    let err = h
        .orchestrator
        .run_turn(h.user_id, h.session_id, "anyone?".into(), None)
        .await
        .err()
        .expect("every agent failed");

    assert!(matches!(err, TurnError::AllAgentsFailed(2)));
    let history = h.messages.range(h.session_id, 0, 10);
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].sender, SenderKind::User);
    assert_eq!(history[0].content, "anyone?");
}

#[tokio::test]
async fn unresolvable_provider_counts_as_a_failed_agent() {
    let resolver = StubResolver::default().with("alpha", Scripted::replying("fine"));
    let h = harness(resolver);
    h.place_agent("Good", "alpha");
    h.place_agent("Ghost", "no-such-provider");

    let outcome = h
        .orchestrator
        .run_turn(h.user_id, h.session_id, "hi".into(), None)
        .await
        .expect("one agent still succeeds");

    assert_eq!(outcome.agent_messages.len(), 1);
    assert!(outcome.resolution.is_none());
}

#[tokio::test]
async fn turns_require_session_ownership() {
    let h = harness(StubResolver::default());
    let stranger = Uuid::new_v4();

    let err = h
        .orchestrator
        .run_turn(stranger, h.session_id, "hi".into(), None)
        .await
        .err()
        .unwrap();
    assert!(matches!(err, TurnError::NotOwned));

    let err = h
        .orchestrator
        .run_turn(h.user_id, Uuid::new_v4(), "hi".into(), None)
        .await
        .err()
        .unwrap();
    assert!(matches!(err, TurnError::SessionNotFound));
}

#[tokio::test]
async fn subscribers_see_the_whole_turn_in_order() {
    let resolver = StubResolver::default()
        .with("alpha", Scripted::replying("alpha answer"))
        .with("beta", Scripted::replying("beta answer"))
        .with("score", Scripted::scoring(vec![("alpha answer", "0.9")]));
    let h = harness(resolver);
    h.place_agent("A", "alpha");
    h.place_agent("B", "beta");

    let (subscriber_id, mut rx) = h.channels.subscribe(h.session_id);

    h.orchestrator
        .run_turn(h.user_id, h.session_id, "hello".into(), None)
        .await
        .unwrap();

    let mut kinds = Vec::new();
    while let Ok(event) = rx.try_recv() {
        let value = serde_json::to_value(&event).unwrap();
        kinds.push(value["type"].as_str().unwrap().to_string());
    }

    // User message first, one frame per agent reply, resolution last.
    assert_eq!(kinds.len(), 4);
    assert_eq!(kinds[0], "message");
    assert_eq!(kinds[3], "conflict_resolution");
    assert_eq!(kinds.iter().filter(|k| *k == "message").count(), 3);

    h.channels.unsubscribe(h.session_id, subscriber_id);
}

#[tokio::test]
async fn agent_replies_carry_name_and_latency_metadata() {
    let resolver = StubResolver::default().with("alpha", Scripted::replying("hi there"));
    let h = harness(resolver);
    h.place_agent("Greeter", "alpha");

    let outcome = h
        .orchestrator
        .run_turn(h.user_id, h.session_id, "hello".into(), json!({"client": "test"}).into())
        .await
        .unwrap();

    let reply = &outcome.agent_messages[0];
    assert_eq!(reply.sender, SenderKind::Agent);
    let metadata = reply.metadata.as_ref().unwrap();
    assert_eq!(metadata["agent_name"], "Greeter");
    assert!(metadata["latency_ms"].is_u64());
    assert_eq!(outcome.user_message.metadata.as_ref().unwrap()["client"], "test");
}

#[tokio::test]
async fn turn_without_agents_just_records_the_message() {
    let h = harness(StubResolver::default());

    let outcome = h
        .orchestrator
        .run_turn(h.user_id, h.session_id, "talking to myself".into(), None)
        .await
        .expect("empty roster is not an error");

    assert!(outcome.agent_messages.is_empty());
    assert!(outcome.resolution.is_none());
    assert_eq!(h.messages.range(h.session_id, 0, 10).len(), 1);
}
