// src/config/engine.rs
use anyhow::{anyhow, Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

pub const ENV_ENGINE_CONFIG_PATH: &str = "ENGINE_CONFIG_PATH";
pub const DEFAULT_ENGINE_CONFIG_PATH: &str = "config/engine.toml";
pub const ENV_FEEDBACK_BASE_URL: &str = "ML_API_BASE_URL";

fn default_max_parallel() -> usize {
    4
}
fn default_connector_timeout_ms() -> u64 {
    8_000
}
fn default_crawl_deadline_ms() -> u64 {
    20_000
}
fn default_auto_interval_ms() -> i64 {
    60_000
}
fn default_session_idle_ttl_ms() -> u64 {
    30 * 60_000
}
fn default_curated_floor() -> f32 {
    40.0
}
fn default_feedback_capacity() -> usize {
    256
}
fn default_feedback_base_url() -> String {
    "http://localhost:8000".to_string()
}
fn default_catalog_path() -> PathBuf {
    PathBuf::from("config/catalog.json")
}

/// Rule scorer weights. Normalized by their sum, so only ratios matter.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(default)]
pub struct RuleWeights {
    /// Profile tags found in the opportunity's tags.
    pub tag_overlap: f32,
    /// Profile tags found in the title.
    pub title_match: f32,
    /// Department / role found in title, tags or type.
    pub role_match: f32,
    /// Profile tags found in the company name.
    pub company_match: f32,
}

impl Default for RuleWeights {
    fn default() -> Self {
        Self {
            tag_overlap: 0.55,
            title_match: 0.25,
            role_match: 0.15,
            company_match: 0.05,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectorKind {
    Rss,
    Json,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ConnectorCfg {
    pub kind: ConnectorKind,
    pub name: String,
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct EngineConfig {
    #[serde(default = "default_max_parallel")]
    pub max_parallel: usize,
    #[serde(default = "default_connector_timeout_ms")]
    pub connector_timeout_ms: u64,
    #[serde(default = "default_crawl_deadline_ms")]
    pub crawl_deadline_ms: u64,
    #[serde(default = "default_auto_interval_ms")]
    pub auto_trigger_min_interval_ms: i64,
    /// Sessions untouched for this long are ended by the idle sweep. 0 disables it.
    #[serde(default = "default_session_idle_ttl_ms")]
    pub session_idle_ttl_ms: u64,
    #[serde(default = "default_curated_floor")]
    pub curated_score_floor: f32,
    #[serde(default = "default_feedback_capacity")]
    pub feedback_queue_capacity: usize,
    #[serde(default = "default_feedback_base_url")]
    pub feedback_base_url: String,
    #[serde(default = "default_catalog_path")]
    pub catalog_path: PathBuf,
    #[serde(default)]
    pub weights: RuleWeights,
    #[serde(default)]
    pub connectors: Vec<ConnectorCfg>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_parallel: default_max_parallel(),
            connector_timeout_ms: default_connector_timeout_ms(),
            crawl_deadline_ms: default_crawl_deadline_ms(),
            auto_trigger_min_interval_ms: default_auto_interval_ms(),
            session_idle_ttl_ms: default_session_idle_ttl_ms(),
            curated_score_floor: default_curated_floor(),
            feedback_queue_capacity: default_feedback_capacity(),
            feedback_base_url: default_feedback_base_url(),
            catalog_path: default_catalog_path(),
            weights: RuleWeights::default(),
            connectors: Vec::new(),
        }
    }
}

impl EngineConfig {
    pub fn load_from(path: &Path) -> Result<Self> {
        let s = fs::read_to_string(path)
            .with_context(|| format!("reading engine config from {}", path.display()))?;
        let mut cfg: EngineConfig =
            toml::from_str(&s).with_context(|| format!("parsing {}", path.display()))?;
        cfg.sanitize();
        Ok(cfg)
    }

    /// 1) $ENGINE_CONFIG_PATH  2) config/engine.toml  3) built-in defaults.
    /// `ML_API_BASE_URL` overrides the feedback endpoint in every case.
    pub fn load_default() -> Result<Self> {
        let mut cfg = if let Ok(p) = std::env::var(ENV_ENGINE_CONFIG_PATH) {
            let pb = PathBuf::from(p);
            if !pb.exists() {
                return Err(anyhow!("ENGINE_CONFIG_PATH points to non-existent path"));
            }
            Self::load_from(&pb)?
        } else {
            let p = PathBuf::from(DEFAULT_ENGINE_CONFIG_PATH);
            if p.exists() {
                Self::load_from(&p)?
            } else {
                Self::default()
            }
        };
        if let Ok(url) = std::env::var(ENV_FEEDBACK_BASE_URL) {
            if !url.trim().is_empty() {
                cfg.feedback_base_url = url.trim().to_string();
            }
        }
        Ok(cfg)
    }

    fn sanitize(&mut self) {
        self.max_parallel = self.max_parallel.max(1);
        self.feedback_queue_capacity = self.feedback_queue_capacity.max(1);
        self.auto_trigger_min_interval_ms = self.auto_trigger_min_interval_ms.max(0);
        if !(0.0..=100.0).contains(&self.curated_score_floor) {
            self.curated_score_floor = default_curated_floor();
        }
        let w = &mut self.weights;
        for x in [
            &mut w.tag_overlap,
            &mut w.title_match,
            &mut w.role_match,
            &mut w.company_match,
        ] {
            if !x.is_finite() || *x < 0.0 {
                *x = 0.0;
            }
        }
        self.connectors.retain(|c| !c.url.trim().is_empty());
    }
}
