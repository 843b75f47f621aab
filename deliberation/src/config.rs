//! Engine configuration.
//!
//! Defaults come from the environment; an optional TOML file overrides them
//! field by field, and the CLI overrides both.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::errors::{DeliberationError, DeliberationResult};
use crate::voices::VoicePool;

pub const MAX_ROUNDS: u32 = 10;

fn env_or(key: &str, fallback: &str) -> String {
    std::env::var(key)
        .ok()
        .filter(|v| !v.trim().is_empty())
        .unwrap_or_else(|| fallback.to_string())
}

fn env_parse<T: std::str::FromStr>(key: &str, fallback: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(fallback)
}

/// OpenAI-compatible generation endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationConfig {
    pub api_key: String,
    pub base_url: String,
    pub model: String,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            api_key: env_or("OPENAI_API_KEY", ""),
            base_url: env_or("OPENAI_BASE_URL", "https://api.openai.com/v1"),
            model: env_or("OPENAI_MODEL", "gpt-4o-mini"),
        }
    }
}

/// Web lookup service and its cache.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LookupConfig {
    /// Lookup is skipped when no key is configured.
    pub api_key: Option<String>,
    pub max_results: u32,
    pub cache_capacity: usize,
    pub cache_ttl_secs: u64,
}

impl Default for LookupConfig {
    fn default() -> Self {
        Self {
            api_key: std::env::var("TAVILY_API_KEY")
                .ok()
                .filter(|k| !k.trim().is_empty()),
            max_results: 5,
            cache_capacity: 128,
            cache_ttl_secs: 3600,
        }
    }
}

impl LookupConfig {
    pub fn is_enabled(&self) -> bool {
        self.api_key.is_some()
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }
}

/// Top-level configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeliberationConfig {
    pub generation: GenerationConfig,
    pub lookup: LookupConfig,
    pub total_rounds: u32,
    pub turn_max_tokens: u32,
    pub turn_temperature: f32,
    pub summary_max_tokens: u32,
    pub verdict_max_tokens: u32,
    /// Wall-clock ceiling for one session, enforced by the transport.
    pub session_budget_secs: u64,
    /// Voice ids assigned round-robin; built-in voices when empty.
    pub voice_ids: Vec<String>,
    pub bind_addr: String,
}

impl Default for DeliberationConfig {
    fn default() -> Self {
        Self {
            generation: GenerationConfig::default(),
            lookup: LookupConfig::default(),
            total_rounds: env_parse("DELIBERATION_ROUNDS", 3),
            turn_max_tokens: 220,
            turn_temperature: 1.0,
            summary_max_tokens: 800,
            verdict_max_tokens: 600,
            session_budget_secs: env_parse("DELIBERATION_BUDGET_SECS", 300),
            voice_ids: VoicePool::from_list(&env_or("DELIBERATION_VOICE_IDS", ""))
                .configured()
                .to_vec(),
            bind_addr: env_or("DELIBERATION_BIND", "127.0.0.1:3000"),
        }
    }
}

impl DeliberationConfig {
    /// Parse TOML; missing fields keep their defaults.
    pub fn from_toml_str(raw: &str) -> DeliberationResult<Self> {
        toml::from_str(raw)
            .map_err(|e| DeliberationError::Validation(format!("invalid config file: {e}")))
    }

    /// Load from an optional TOML file and validate.
    pub fn load(path: Option<&Path>) -> DeliberationResult<Self> {
        let config = match path {
            Some(path) => {
                let raw = std::fs::read_to_string(path).map_err(|e| {
                    DeliberationError::Validation(format!(
                        "cannot read config {}: {e}",
                        path.display()
                    ))
                })?;
                Self::from_toml_str(&raw)?
            }
            None => Self::default(),
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> DeliberationResult<()> {
        let invalid =
            |msg: String| -> DeliberationResult<()> { Err(DeliberationError::Validation(msg)) };
        if self.total_rounds == 0 || self.total_rounds > MAX_ROUNDS {
            return invalid(format!(
                "total_rounds must be between 1 and {MAX_ROUNDS}, got {}",
                self.total_rounds
            ));
        }
        if self.turn_max_tokens == 0 || self.summary_max_tokens == 0 || self.verdict_max_tokens == 0
        {
            return invalid("token limits must be positive".to_string());
        }
        if !(0.0..=2.0).contains(&self.turn_temperature) {
            return invalid(format!(
                "turn_temperature must be within 0.0..=2.0, got {}",
                self.turn_temperature
            ));
        }
        if self.session_budget_secs == 0 {
            return invalid("session_budget_secs must be positive".to_string());
        }
        if self.generation.base_url.trim().is_empty() || self.generation.model.trim().is_empty() {
            return invalid("generation base_url and model are required".to_string());
        }
        Ok(())
    }

    pub fn session_budget(&self) -> Duration {
        Duration::from_secs(self.session_budget_secs)
    }

    pub fn voice_pool(&self) -> VoicePool {
        VoicePool::new(self.voice_ids.iter().cloned())
    }
}
