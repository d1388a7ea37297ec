// src/error.rs
// Typed error taxonomy for provider calls and turn processing.
// Provider errors are per-invocation and never fatal to a turn: the
// invocation engine converts them into GenerationResult failures.

use thiserror::Error;

/// Errors from a single provider backend call or adapter construction.
#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    /// Credentials absent or rejected by the backend.
    #[error("provider auth error: {0}")]
    Auth(String),

    /// Malformed request or non-2xx response from the backend.
    #[error("provider request error ({status}): {message}")]
    Request { status: u16, message: String },

    /// Backend did not respond within the caller's deadline.
    #[error("provider timed out")]
    Timeout,

    /// Provider id is not in the supported enumeration. Configuration-time,
    /// fatal to agent setup.
    #[error("unsupported AI model provider: {0}")]
    UnsupportedProvider(String),
}

/// Turn-fatal errors reported to the caller. Everything else is absorbed
/// with a documented fallback.
#[derive(Debug, Clone, Error)]
pub enum TurnError {
    #[error("session not found")]
    SessionNotFound,

    #[error("session not owned by the requesting user")]
    NotOwned,

    /// Zero successful candidates. The user message stays persisted so no
    /// input is silently lost.
    #[error("all {0} agent invocations failed")]
    AllAgentsFailed(usize),
}
