//! AI adapter: remote re-scoring behind a narrow contract, plus a guard that
//! enforces the call timeout and a consecutive-failure budget.
//!
//! Wire shape (POST, JSON):
//! request  `{"profile": {...}, "candidates": [{"id", "title", "company", "type", "tags", "rule_score"}]}`
//! response `{"scores": [{"id": "...", "score": 0..100}]}`

use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::{Deserialize, Serialize};

use crate::config::ai::AiConfig;
use crate::error::ScoringError;
use crate::model::{Opportunity, Profile};

// ------------------------------------------------------------
// Public surface
// ------------------------------------------------------------

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ProfileView {
    pub role: String,
    pub department: String,
    pub tags: Vec<String>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Candidate {
    pub id: String,
    pub title: String,
    pub company: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub tags: Vec<String>,
    pub rule_score: f32,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ScoreRequest {
    pub profile: ProfileView,
    pub candidates: Vec<Candidate>,
}

impl ScoreRequest {
    pub fn new(profile: &Profile, candidates: &[&Opportunity]) -> Self {
        Self {
            profile: ProfileView {
                role: profile.role.clone(),
                department: profile.department.clone(),
                tags: profile.tags().into_iter().collect(),
            },
            candidates: candidates
                .iter()
                .map(|o| Candidate {
                    id: o.id.clone(),
                    title: o.title.clone(),
                    company: o.company.clone(),
                    kind: o.kind.clone(),
                    tags: o.tags.iter().cloned().collect(),
                    rule_score: o.match_score,
                })
                .collect(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AiScore {
    pub id: String,
    pub score: f32,
}

pub type ScoreFuture<'a> =
    Pin<Box<dyn Future<Output = Result<Vec<AiScore>, ScoringError>> + Send + 'a>>;

/// Trait object used by the ranking pass.
pub trait AiScorer: Send + Sync {
    fn score<'a>(&'a self, req: &'a ScoreRequest) -> ScoreFuture<'a>;
    /// Provider name for diagnostics.
    fn provider_name(&self) -> &'static str;
    /// `false` skips the boost step entirely (no call, no fallback accounting).
    fn enabled(&self) -> bool {
        true
    }
}

pub type DynAiScorer = Arc<dyn AiScorer>;

/// Factory: build a scorer according to config and environment variables.
///
/// * If `AI_TEST_MODE=mock`, returns a deterministic mock scorer.
/// * Else if `config.enabled==false`, returns a disabled scorer.
/// * Else the HTTP scorer wrapped in the timeout/failure-budget guard.
pub fn build_scorer_from_config(config: &AiConfig) -> DynAiScorer {
    if std::env::var("AI_TEST_MODE")
        .map(|v| v == "mock")
        .unwrap_or(false)
    {
        return Arc::new(GuardedScorer::new(MockScorer { boost: 10.0 }, config));
    }

    if !config.enabled {
        return Arc::new(DisabledScorer);
    }

    Arc::new(GuardedScorer::new(HttpScorer::new(config), config))
}

// ------------------------------------------------------------
// Concrete scorers
// ------------------------------------------------------------

/// Always skipped; used when AI scoring is disabled.
pub struct DisabledScorer;

impl AiScorer for DisabledScorer {
    fn score<'a>(&'a self, _req: &'a ScoreRequest) -> ScoreFuture<'a> {
        Box::pin(async { Err(ScoringError::Unavailable("disabled".into())) })
    }
    fn provider_name(&self) -> &'static str {
        "disabled"
    }
    fn enabled(&self) -> bool {
        false
    }
}

/// Deterministic scorer for tests/local runs: rule score plus a fixed boost.
#[derive(Clone)]
pub struct MockScorer {
    pub boost: f32,
}

impl AiScorer for MockScorer {
    fn score<'a>(&'a self, req: &'a ScoreRequest) -> ScoreFuture<'a> {
        let out = req
            .candidates
            .iter()
            .map(|c| AiScore {
                id: c.id.clone(),
                score: (c.rule_score + self.boost).clamp(0.0, 100.0),
            })
            .collect();
        Box::pin(async move { Ok(out) })
    }
    fn provider_name(&self) -> &'static str {
        "mock"
    }
}

/// Remote scorer over HTTP.
pub struct HttpScorer {
    http: reqwest::Client,
    endpoint: String,
    api_key: String,
}

impl HttpScorer {
    pub fn new(config: &AiConfig) -> Self {
        let http = reqwest::Client::builder()
            .user_agent("opportunity-engine/0.1")
            .connect_timeout(Duration::from_secs(2))
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()
            .unwrap_or_default();
        Self {
            http,
            endpoint: config.endpoint.clone(),
            api_key: config.api_key.clone(),
        }
    }
}

#[derive(Deserialize)]
struct ScoreResponse {
    scores: Vec<AiScore>,
}

impl AiScorer for HttpScorer {
    fn score<'a>(&'a self, req: &'a ScoreRequest) -> ScoreFuture<'a> {
        Box::pin(async move {
            let mut call = self.http.post(&self.endpoint).json(req);
            if !self.api_key.is_empty() {
                call = call.bearer_auth(&self.api_key);
            }
            let resp = call.send().await.map_err(|e| {
                if e.is_timeout() {
                    ScoringError::Timeout
                } else {
                    ScoringError::Unavailable(e.to_string())
                }
            })?;
            if !resp.status().is_success() {
                return Err(ScoringError::Unavailable(format!(
                    "status {}",
                    resp.status()
                )));
            }
            let body: ScoreResponse = resp
                .json()
                .await
                .map_err(|e| ScoringError::Malformed(e.to_string()))?;
            Ok(body.scores)
        })
    }
    fn provider_name(&self) -> &'static str {
        "http"
    }
}

// ------------------------------------------------------------
// Guard wrapper (timeout + failure budget)
// ------------------------------------------------------------

#[derive(Debug, Default)]
struct Budget {
    consecutive_failures: u32,
    open_until: Option<DateTime<Utc>>,
}

/// After `failure_budget` consecutive failures the inner scorer is not called
/// for `cooldown`; calls fail fast with `BudgetExhausted` meanwhile.
pub struct GuardedScorer<S: AiScorer> {
    inner: S,
    timeout: Duration,
    failure_budget: u32,
    cooldown: ChronoDuration,
    budget: Mutex<Budget>,
}

impl<S: AiScorer> GuardedScorer<S> {
    pub fn new(inner: S, config: &AiConfig) -> Self {
        Self {
            inner,
            timeout: Duration::from_millis(config.timeout_ms.max(1)),
            failure_budget: config.failure_budget.max(1),
            cooldown: ChronoDuration::seconds(config.cooldown_secs.max(0)),
            budget: Mutex::new(Budget::default()),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Budget> {
        match self.budget.lock() {
            Ok(g) => g,
            Err(poison) => poison.into_inner(),
        }
    }

    fn check_open(&self, now: DateTime<Utc>) -> Result<(), ScoringError> {
        let mut g = self.lock();
        match g.open_until {
            Some(until) if now < until => Err(ScoringError::BudgetExhausted(
                (until - now).num_seconds(),
            )),
            Some(_) => {
                g.open_until = None;
                Ok(())
            }
            None => Ok(()),
        }
    }

    fn record(&self, ok: bool, now: DateTime<Utc>) {
        let mut g = self.lock();
        if ok {
            g.consecutive_failures = 0;
            return;
        }
        g.consecutive_failures = g.consecutive_failures.saturating_add(1);
        if g.consecutive_failures >= self.failure_budget {
            g.consecutive_failures = 0;
            g.open_until = Some(now + self.cooldown);
            tracing::warn!(
                target: "scoring",
                provider = self.inner.provider_name(),
                cooldown_secs = self.cooldown.num_seconds(),
                "AI scorer failure budget exhausted"
            );
        }
    }

    async fn score_impl(&self, req: &ScoreRequest) -> Result<Vec<AiScore>, ScoringError> {
        self.check_open(Utc::now())?;
        let res = match tokio::time::timeout(self.timeout, self.inner.score(req)).await {
            Ok(r) => r,
            Err(_) => Err(ScoringError::Timeout),
        };
        self.record(res.is_ok(), Utc::now());
        res
    }
}

impl<S: AiScorer> AiScorer for GuardedScorer<S> {
    fn score<'a>(&'a self, req: &'a ScoreRequest) -> ScoreFuture<'a> {
        Box::pin(self.score_impl(req))
    }
    fn provider_name(&self) -> &'static str {
        self.inner.provider_name()
    }
    fn enabled(&self) -> bool {
        self.inner.enabled()
    }
}
