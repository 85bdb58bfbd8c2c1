// src/config/ai.rs
use serde::{Deserialize, Serialize};
use std::{env, fs, path::Path};

pub const DEFAULT_AI_CONFIG_PATH: &str = "config/ai.json";
pub const ENV_AI_SCORER_API_KEY: &str = "AI_SCORER_API_KEY";

fn default_timeout_ms() -> u64 {
    3_000
}
fn default_failure_budget() -> u32 {
    3
}
fn default_cooldown_secs() -> i64 {
    300
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AiConfig {
    pub enabled: bool,
    /// Free-form provider label used in logs ("groq", "http", ...).
    #[serde(default)]
    pub provider: String,
    /// Re-scoring endpoint (POST, JSON).
    #[serde(default)]
    pub endpoint: String,
    /// "ENV" means: read from AI_SCORER_API_KEY.
    #[serde(default)]
    pub api_key: String,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    /// Consecutive failures tolerated before the scorer is skipped for `cooldown_secs`.
    #[serde(default = "default_failure_budget")]
    pub failure_budget: u32,
    #[serde(default = "default_cooldown_secs")]
    pub cooldown_secs: i64,
}

impl Default for AiConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            provider: String::new(),
            endpoint: String::new(),
            api_key: String::new(),
            timeout_ms: default_timeout_ms(),
            failure_budget: default_failure_budget(),
            cooldown_secs: default_cooldown_secs(),
        }
    }
}

impl AiConfig {
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let data = fs::read_to_string(path)?;
        let mut cfg: AiConfig = serde_json::from_str(&data)?;

        cfg.provider = cfg.provider.trim().to_lowercase();

        if cfg.api_key.trim().eq_ignore_ascii_case("env") {
            cfg.api_key = env::var(ENV_AI_SCORER_API_KEY)
                .map_err(|_| anyhow::anyhow!("Missing {ENV_AI_SCORER_API_KEY} env var"))?;
        }

        if cfg.enabled && cfg.endpoint.trim().is_empty() {
            anyhow::bail!("AI scorer enabled but no endpoint configured");
        }
        if cfg.timeout_ms == 0 {
            cfg.timeout_ms = default_timeout_ms();
        }
        cfg.failure_budget = cfg.failure_budget.max(1);
        cfg.cooldown_secs = cfg.cooldown_secs.max(0);

        Ok(cfg)
    }

    /// Load `config/ai.json`. Any read/parse problem yields a disabled config.
    pub fn load_default() -> Self {
        match Self::load_from_file(DEFAULT_AI_CONFIG_PATH) {
            Ok(cfg) => cfg,
            Err(e) => {
                tracing::debug!(target: "scoring", error = %e, "AI config unavailable; scorer disabled");
                Self::default()
            }
        }
    }
}
