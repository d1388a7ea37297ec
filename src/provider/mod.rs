// src/provider/mod.rs
// ModelProvider trait and type definitions for multi-vendor support.
// All vendor-specific request/response shaping lives behind this boundary;
// the invocation engine and conflict resolver stay provider-agnostic.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ProviderError;

pub mod claude;
pub mod gemini;
pub mod huggingface;
pub mod openai_compat;
pub mod registry;

pub use registry::{ProviderRegistry, ResolveProvider};

pub const DEFAULT_TIMEOUT_SECS: u64 = 60;

/// One turn of a conversation, vendor-neutral.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatTurn {
    pub role: ChatRole,
    pub content: String,
}

impl ChatTurn {
    pub fn system(content: impl Into<String>) -> Self {
        Self { role: ChatRole::System, content: content.into() }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self { role: ChatRole::User, content: content.into() }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self { role: ChatRole::Assistant, content: content.into() }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    System,
    User,
    Assistant,
}

impl ChatRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChatRole::System => "system",
            ChatRole::User => "user",
            ChatRole::Assistant => "assistant",
        }
    }
}

/// Sampling parameters for a single generation call. `options` carries
/// provider-specific keys merged verbatim into the vendor request body.
#[derive(Debug, Clone)]
pub struct GenerationParams {
    pub temperature: f32,
    pub max_tokens: u32,
    pub options: serde_json::Map<String, Value>,
}

impl Default for GenerationParams {
    fn default() -> Self {
        Self {
            temperature: 0.7,
            max_tokens: 1000,
            options: serde_json::Map::new(),
        }
    }
}

/// Static metadata about a configured model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelInfo {
    pub name: String,
    pub provider: String,
    pub description: String,
    pub is_default: bool,
    pub capabilities: Vec<String>,
    pub max_tokens: u32,
    pub supports_system_message: bool,
}

/// Fixed evaluation prompt for conflict scoring. Low-randomness sampling and
/// a short output budget; the reply is expected to be a bare number.
fn scoring_prompt(conflict_text: &str, resolution_text: &str) -> String {
    format!(
        "You are evaluating the quality of a conflict resolution between AI agents.\n\
         \n\
         Conflict:\n{conflict_text}\n\
         \n\
         Proposed Resolution:\n{resolution_text}\n\
         \n\
         Please evaluate the resolution on a scale from 0.0 to 1.0, where:\n\
         - 0.0 means the resolution completely fails to address the conflict\n\
         - 1.0 means the resolution perfectly addresses the conflict\n\
         \n\
         Return only a single number between 0.0 and 1.0."
    )
}

/// First decimal number found in a scorer reply, if any.
pub(crate) fn parse_score(reply: &str) -> Option<f32> {
    let start = reply.find(|c: char| c.is_ascii_digit())?;
    let rest = &reply[start..];
    let end = rest
        .find(|c: char| !c.is_ascii_digit() && c != '.')
        .unwrap_or(rest.len());
    rest[..end].trim_end_matches('.').parse::<f32>().ok()
}

/// Uniform capability interface over heterogeneous text-generation backends.
#[async_trait]
pub trait ModelProvider: Send + Sync {
    /// Static metadata: name, vendor, capabilities, context window.
    fn info(&self) -> ModelInfo;

    /// Single-turn completion.
    async fn generate_text(
        &self,
        prompt: &str,
        system_message: Option<&str>,
        params: &GenerationParams,
    ) -> Result<String, ProviderError>;

    /// Multi-turn completion over an ordered history. Vendors without a
    /// dedicated system role fold system content into the first turn with a
    /// label, never dropping it.
    async fn generate_chat_response(
        &self,
        history: &[ChatTurn],
        params: &GenerationParams,
    ) -> Result<String, ProviderError>;

    /// Score a candidate resolution against a conflict description.
    ///
    /// Scoring is advisory: a backend failure or an unparsable reply yields
    /// the neutral fallback 0.5 instead of an error. The result is always
    /// clamped to [0.0, 1.0].
    async fn score_conflict_resolution(&self, conflict_text: &str, resolution_text: &str) -> f32 {
        let params = GenerationParams {
            temperature: 0.1,
            max_tokens: 16,
            options: serde_json::Map::new(),
        };
        let prompt = scoring_prompt(conflict_text, resolution_text);
        match self.generate_text(&prompt, None, &params).await {
            Ok(reply) => parse_score(&reply).unwrap_or(0.5).clamp(0.0, 1.0),
            Err(err) => {
                tracing::warn!("Conflict scoring call failed, using neutral score: {}", err);
                0.5
            }
        }
    }
}

/// Folds any system turns into a labeled prefix on the first user turn, for
/// vendors without a system role. Deterministic: prepend-and-label.
pub(crate) fn fold_system_turns(history: &[ChatTurn]) -> Vec<ChatTurn> {
    let system: Vec<&str> = history
        .iter()
        .filter(|t| t.role == ChatRole::System)
        .map(|t| t.content.as_str())
        .collect();
    let mut folded: Vec<ChatTurn> = history
        .iter()
        .filter(|t| t.role != ChatRole::System)
        .cloned()
        .collect();
    if !system.is_empty() {
        let label = format!("[System Instruction] {}", system.join("\n"));
        match folded.iter_mut().find(|t| t.role == ChatRole::User) {
            Some(first_user) => {
                first_user.content = format!("{}\n\n{}", label, first_user.content);
            }
            None => folded.insert(0, ChatTurn::user(label)),
        }
    }
    folded
}

/// Maps reqwest transport failures onto the provider taxonomy.
pub(crate) fn transport_error(err: reqwest::Error) -> ProviderError {
    if err.is_timeout() {
        ProviderError::Timeout
    } else {
        ProviderError::Request {
            status: err.status().map(|s| s.as_u16()).unwrap_or(0),
            message: err.to_string(),
        }
    }
}

/// Maps a non-2xx backend response onto the provider taxonomy.
pub(crate) fn status_error(status: reqwest::StatusCode, body: String) -> ProviderError {
    use reqwest::StatusCode;
    if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
        ProviderError::Auth(body)
    } else {
        ProviderError::Request { status: status.as_u16(), message: body }
    }
}

/// Environment credential lookup; empty values count as absent.
pub(crate) fn env_key(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_bare_number() {
        assert_eq!(parse_score("0.8"), Some(0.8));
        assert_eq!(parse_score("  0.35\n"), Some(0.35));
    }

    #[test]
    fn parses_first_number_in_prose() {
        assert_eq!(parse_score("I would rate this 0.7 out of 1.0"), Some(0.7));
        assert_eq!(parse_score("Score: 1"), Some(1.0));
    }

    #[test]
    fn rejects_replies_without_numbers() {
        assert_eq!(parse_score("no idea"), None);
        assert_eq!(parse_score(""), None);
    }

    #[test]
    fn trailing_period_is_not_part_of_the_number() {
        assert_eq!(parse_score("The score is 0.9."), Some(0.9));
    }

    #[test]
    fn folds_system_into_first_user_turn() {
        let history = vec![
            ChatTurn::system("Be terse."),
            ChatTurn::user("hello"),
            ChatTurn::assistant("hi"),
        ];
        let folded = fold_system_turns(&history);
        assert_eq!(folded.len(), 2);
        assert!(folded[0].content.starts_with("[System Instruction] Be terse."));
        assert!(folded[0].content.ends_with("hello"));
    }

    #[test]
    fn fold_without_user_turn_prepends_one() {
        let history = vec![ChatTurn::system("Be terse.")];
        let folded = fold_system_turns(&history);
        assert_eq!(folded.len(), 1);
        assert_eq!(folded[0].role, ChatRole::User);
    }
}
