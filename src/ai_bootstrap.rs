// src/ai_bootstrap.rs
use crate::analyze::ai_adapter::{build_scorer_from_config, DynAiScorer, ScoreRequest};
use crate::config::ai::AiConfig;
use crate::model::{MatchMethod, Opportunity, Profile};
use tracing::{info, warn};

pub struct AiRuntime {
    pub cfg: AiConfig,
    pub scorer: DynAiScorer,
}

impl AiRuntime {
    pub fn from_path(path: &str) -> anyhow::Result<Self> {
        let cfg = AiConfig::load_from_file(path)?;
        // Safe diagnostics: only provider + enabled + key length
        info!(
            "AI scorer cfg loaded: provider={}, enabled={}, key_len={}",
            cfg.provider,
            cfg.enabled,
            cfg.api_key.len()
        );
        let scorer = build_scorer_from_config(&cfg);
        Ok(Self { cfg, scorer })
    }

    /// Default config location; a missing/invalid file means a disabled scorer.
    pub fn from_default() -> Self {
        let cfg = AiConfig::load_default();
        let scorer = build_scorer_from_config(&cfg);
        Self { cfg, scorer }
    }

    /// Score one synthetic candidate and log the outcome. Never fails.
    pub async fn smoke_check(&self) {
        if !self.scorer.enabled() {
            warn!("AI smoke_check skipped: scorer is disabled");
            return;
        }
        let profile = Profile {
            email: "smoke@localhost".into(),
            skills: vec!["backend".into(), "rust".into()],
            ..Default::default()
        };
        let sample = Opportunity {
            id: "smoke-1".into(),
            title: "Backend Engineering Intern".into(),
            company: "Smoke Labs".into(),
            kind: "internship".into(),
            tags: ["backend".to_string(), "rust".to_string()].into_iter().collect(),
            source_url: "#".into(),
            match_score: 50.0,
            match_method: MatchMethod::Rule,
            discovered_at: chrono::Utc::now(),
            source: None,
        };
        let req = ScoreRequest::new(&profile, &[&sample]);
        match self.scorer.score(&req).await {
            Ok(scores) => info!("AI smoke_check => {:?}", scores),
            Err(e) => warn!(error = %e, "AI smoke_check failed"),
        }
    }
}
