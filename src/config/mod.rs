// src/config/mod.rs
// All tunables load from the environment (with .env support) through one
// comment-tolerant helper; nothing is hardcoded at call sites.

use once_cell::sync::Lazy;
use std::str::FromStr;

#[derive(Debug, Clone)]
pub struct Config {
    // ── Server
    pub host: String,
    pub port: u16,
    pub log_level: String,

    // ── Turn processing
    /// Deadline for one agent invocation, including queueing time.
    pub invocation_timeout_secs: u64,
    /// Deadline for one conflict-scoring call.
    pub scoring_timeout_secs: u64,
    /// Upper bound on simultaneous in-flight generation calls.
    pub max_concurrent_generations: usize,
    /// Upper bound on simultaneous in-flight scoring calls.
    pub max_concurrent_scoring: usize,
    /// How many trailing session messages feed each agent's context.
    pub history_limit: usize,

    // ── Conflict scoring
    pub scoring_provider: String,
    pub scoring_model: Option<String>,

    // ── API defaults
    pub page_default_limit: usize,
    pub page_max_limit: usize,
}

// Tolerates values with trailing comments and whitespace, falling back to
// the default when the variable is missing or unparsable.
fn env_var_or<T>(key: &str, default: T) -> T
where
    T: FromStr,
{
    match std::env::var(key) {
        Ok(val) => {
            let clean_val = val.split('#').next().unwrap_or("").trim();
            match clean_val.parse::<T>() {
                Ok(parsed) => parsed,
                Err(_) => {
                    eprintln!("Config: {} = '{}' (parse failed, using default)", key, val);
                    default
                }
            }
        }
        Err(_) => default,
    }
}

impl Config {
    pub fn from_env() -> Self {
        if dotenvy::dotenv().is_err() {
            eprintln!("Warning: .env file not found. Using environment variables and defaults.");
        }

        let scoring_model = std::env::var("COLLOQUY_SCORING_MODEL")
            .ok()
            .filter(|v| !v.trim().is_empty());

        Self {
            host: env_var_or("COLLOQUY_HOST", "0.0.0.0".to_string()),
            port: env_var_or("COLLOQUY_PORT", 8000),
            log_level: env_var_or("COLLOQUY_LOG_LEVEL", "info".to_string()),
            invocation_timeout_secs: env_var_or("COLLOQUY_INVOCATION_TIMEOUT", 60),
            scoring_timeout_secs: env_var_or("COLLOQUY_SCORING_TIMEOUT", 20),
            max_concurrent_generations: env_var_or("COLLOQUY_MAX_CONCURRENT_GENERATIONS", 4),
            max_concurrent_scoring: env_var_or("COLLOQUY_MAX_CONCURRENT_SCORING", 2),
            history_limit: env_var_or("COLLOQUY_HISTORY_LIMIT", 50),
            scoring_provider: env_var_or("COLLOQUY_SCORING_PROVIDER", "gemini".to_string()),
            scoring_model,
            page_default_limit: env_var_or("COLLOQUY_PAGE_DEFAULT_LIMIT", 100),
            page_max_limit: env_var_or("COLLOQUY_PAGE_MAX_LIMIT", 500),
        }
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

pub static CONFIG: Lazy<Config> = Lazy::new(Config::from_env);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn env_var_or_strips_comments() {
        std::env::set_var("COLLOQUY_TEST_COMMENTED", "42  # inline note");
        assert_eq!(env_var_or("COLLOQUY_TEST_COMMENTED", 0u64), 42);
        std::env::remove_var("COLLOQUY_TEST_COMMENTED");
    }

    #[test]
    fn env_var_or_falls_back_on_garbage() {
        std::env::set_var("COLLOQUY_TEST_GARBAGE", "not-a-number");
        assert_eq!(env_var_or("COLLOQUY_TEST_GARBAGE", 7usize), 7);
        std::env::remove_var("COLLOQUY_TEST_GARBAGE");
    }
}
