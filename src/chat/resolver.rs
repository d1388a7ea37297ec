// src/chat/resolver.rs
// Conflict resolution over concurrent agent replies. Every candidate is
// scored against the combined conflict by a designated scoring model, and
// the highest score wins. Scoring is advisory end to end: any failure in
// the scoring path degrades to the neutral 0.5, never to a lost turn.

use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use tokio::sync::Semaphore;
use tokio::time::timeout;
use tracing::{info, warn};
use uuid::Uuid;

use crate::provider::{ModelProvider, ResolveProvider};

const RATIONALE: &str = "Selected based on relevance and accuracy";

/// One agent reply competing in a conflict.
#[derive(Debug, Clone)]
pub struct Candidate {
    pub message_id: Uuid,
    pub agent_id: Uuid,
    pub agent_name: String,
    pub text: String,
    /// Completion rank from the invocation engine; ties break toward the
    /// earliest arrival.
    pub arrival: usize,
}

#[derive(Debug, Clone)]
pub struct ScoredCandidate {
    pub candidate: Candidate,
    pub score: f32,
}

/// Result of one resolution pass. `alternatives` holds every competitor in
/// arrival order, the winner included.
#[derive(Debug, Clone)]
pub struct ConflictOutcome {
    pub winner: ScoredCandidate,
    pub alternatives: Vec<ScoredCandidate>,
    pub rationale: String,
}

pub struct ConflictResolver {
    resolver: Arc<dyn ResolveProvider>,
    scoring_provider: String,
    scoring_model: Option<String>,
    limit: Arc<Semaphore>,
    deadline: Duration,
}

impl ConflictResolver {
    pub fn new(
        resolver: Arc<dyn ResolveProvider>,
        scoring_provider: String,
        scoring_model: Option<String>,
        max_concurrent: usize,
        deadline: Duration,
    ) -> Self {
        Self {
            resolver,
            scoring_provider,
            scoring_model,
            limit: Arc::new(Semaphore::new(max_concurrent)),
            deadline,
        }
    }

    /// Scores the candidates and picks a winner. Fewer than two candidates
    /// is no conflict at all and yields None.
    pub async fn resolve(&self, candidates: Vec<Candidate>) -> Option<ConflictOutcome> {
        if candidates.len() < 2 {
            return None;
        }

        let conflict_text = conflict_text(&candidates);
        let scored = match self.scorer() {
            Some(scorer) => self.score_all(scorer, &candidates, &conflict_text).await,
            // No scoring backend reachable. Neutral scores keep the turn
            // moving; the arrival tie-breaker decides.
            None => candidates.iter().map(|_| 0.5).collect(),
        };

        let mut alternatives: Vec<ScoredCandidate> = candidates
            .into_iter()
            .zip(scored)
            .map(|(candidate, score)| ScoredCandidate { candidate, score })
            .collect();
        alternatives.sort_by(|a, b| a.candidate.arrival.cmp(&b.candidate.arrival));

        // Strictly-greater comparison over the arrival-sorted list: equal
        // scores leave the earlier arrival in place.
        let winner = alternatives
            .iter()
            .fold(None::<&ScoredCandidate>, |best, entry| match best {
                Some(b) if entry.score <= b.score => best,
                _ => Some(entry),
            })?
            .clone();

        info!(
            "Conflict resolved: '{}' wins with score {:.2} over {} alternatives",
            winner.candidate.agent_name,
            winner.score,
            alternatives.len() - 1
        );

        Some(ConflictOutcome {
            winner,
            alternatives,
            rationale: RATIONALE.to_string(),
        })
    }

    fn scorer(&self) -> Option<Arc<dyn ModelProvider>> {
        match self.resolver.resolve(
            &self.scoring_provider,
            None,
            self.scoring_model.clone(),
        ) {
            Ok(provider) => Some(provider),
            Err(err) => {
                warn!(
                    "Scoring provider '{}' unavailable, using neutral scores: {}",
                    self.scoring_provider, err
                );
                None
            }
        }
    }

    async fn score_all(
        &self,
        scorer: Arc<dyn ModelProvider>,
        candidates: &[Candidate],
        conflict_text: &str,
    ) -> Vec<f32> {
        let futures = candidates.iter().map(|candidate| {
            let scorer = Arc::clone(&scorer);
            let limit = Arc::clone(&self.limit);
            async move {
                let attempt = timeout(self.deadline, async {
                    let _permit = limit.acquire().await.ok()?;
                    Some(
                        scorer
                            .score_conflict_resolution(conflict_text, &candidate.text)
                            .await,
                    )
                })
                .await;
                match attempt {
                    Ok(Some(score)) => score,
                    _ => {
                        warn!(
                            "Scoring timed out for candidate from '{}', using neutral score",
                            candidate.agent_name
                        );
                        0.5
                    }
                }
            }
        });

        join_all(futures).await
    }
}

/// The conflict as presented to the scorer: every proposal, attributed.
fn conflict_text(candidates: &[Candidate]) -> String {
    candidates
        .iter()
        .map(|c| format!("Agent {} proposes:\n{}", c.agent_name, c.text))
        .collect::<Vec<_>>()
        .join("\n\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ProviderError;
    use crate::provider::{ChatTurn, GenerationParams, ModelInfo};
    use async_trait::async_trait;

    struct ScriptedScorer {
        // Score keyed by a substring of the candidate text.
        scores: Vec<(&'static str, f32)>,
    }

    #[async_trait]
    impl ModelProvider for ScriptedScorer {
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
            for (needle, score) in &self.scores {
                if prompt.contains(needle) {
                    return Ok(format!("{score}"));
                }
            }
            Ok("0.5".into())
        }

        async fn generate_chat_response(
            &self,
            _history: &[ChatTurn],
            _params: &GenerationParams,
        ) -> Result<String, ProviderError> {
            unreachable!("scoring only uses generate_text")
        }
    }

    struct StubResolver {
        scorer: Option<Arc<dyn ModelProvider>>,
    }

    impl ResolveProvider for StubResolver {
        fn resolve(
            &self,
            provider: &str,
            _api_key: Option<String>,
            _model: Option<String>,
        ) -> Result<Arc<dyn ModelProvider>, ProviderError> {
            self.scorer
                .clone()
                .ok_or_else(|| ProviderError::UnsupportedProvider(provider.to_string()))
        }
    }

    fn resolver(scorer: Option<Arc<dyn ModelProvider>>) -> ConflictResolver {
        ConflictResolver::new(
            Arc::new(StubResolver { scorer }),
            "test".into(),
            None,
            2,
            Duration::from_secs(5),
        )
    }

    fn candidate(name: &str, text: &str, arrival: usize) -> Candidate {
        Candidate {
            message_id: Uuid::new_v4(),
            agent_id: Uuid::new_v4(),
            agent_name: name.into(),
            text: text.into(),
            arrival,
        }
    }

    #[tokio::test]
    async fn single_candidate_is_no_conflict() {
        let resolver = resolver(None);
        let outcome = resolver.resolve(vec![candidate("a", "only", 0)]).await;
        assert!(outcome.is_none());
    }

    #[tokio::test]
    async fn higher_score_wins() {
        let scorer = Arc::new(ScriptedScorer {
            scores: vec![("alpha answer", 0.6), ("beta answer", 0.8)],
        });
        let resolver = resolver(Some(scorer));
        let outcome = resolver
            .resolve(vec![
                candidate("A", "alpha answer", 0),
                candidate("B", "beta answer", 1),
            ])
            .await
            .expect("two candidates conflict");

        assert_eq!(outcome.winner.candidate.agent_name, "B");
        assert_eq!(outcome.winner.score, 0.8);
        assert_eq!(outcome.alternatives.len(), 2);
        assert_eq!(outcome.rationale, RATIONALE);
        // The winner's score is never below any alternative's.
        assert!(outcome
            .alternatives
            .iter()
            .all(|alt| alt.score <= outcome.winner.score));
    }

    #[tokio::test]
    async fn tie_breaks_toward_earliest_arrival() {
        let scorer = Arc::new(ScriptedScorer { scores: vec![] });
        let resolver = resolver(Some(scorer));
        let outcome = resolver
            .resolve(vec![
                candidate("late", "first text", 1),
                candidate("early", "second text", 0),
            ])
            .await
            .expect("conflict");

        assert_eq!(outcome.winner.candidate.agent_name, "early");
        assert_eq!(outcome.winner.score, 0.5);
    }

    #[tokio::test]
    async fn unreachable_scorer_degrades_to_neutral_scores() {
        let resolver = resolver(None);
        let outcome = resolver
            .resolve(vec![
                candidate("early", "x", 0),
                candidate("late", "y", 1),
            ])
            .await
            .expect("conflict");

        assert!(outcome.alternatives.iter().all(|alt| alt.score == 0.5));
        assert_eq!(outcome.winner.candidate.agent_name, "early");
    }

    #[test]
    fn conflict_text_attributes_every_proposal() {
        let text = conflict_text(&[
            candidate("A", "do this", 0),
            candidate("B", "do that", 1),
        ]);
        assert!(text.contains("Agent A proposes:\ndo this"));
        assert!(text.contains("Agent B proposes:\ndo that"));
    }
}
