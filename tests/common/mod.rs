// tests/common/mod.rs
//
// Shared fixtures for the integration tests: in-memory connectors with call
// counters, a profile, a small curated catalog and engine builders.
#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use opportunity_engine::ai_adapter::{AiScorer, DisabledScorer, DynAiScorer, ScoreFuture, ScoreRequest};
use opportunity_engine::catalog::{CuratedEntry, StaticCatalog};
use opportunity_engine::config::engine::EngineConfig;
use opportunity_engine::error::{ConnectorError, ScoringError};
use opportunity_engine::ingest::types::{Connector, DynConnector, RawListing};
use opportunity_engine::{Engine, Profile};

pub enum Behavior {
    Return(Vec<RawListing>),
    Fail(fn() -> ConnectorError),
    Panic(&'static str),
}

/// Connector answering from memory after an optional (tokio) delay.
pub struct StubConnector {
    name: String,
    delay: Duration,
    behavior: Behavior,
    pub calls: Arc<AtomicUsize>,
}

impl StubConnector {
    pub fn ok(name: &str, listings: Vec<RawListing>) -> Self {
        Self {
            name: name.to_string(),
            delay: Duration::ZERO,
            behavior: Behavior::Return(listings),
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn failing(name: &str, err: fn() -> ConnectorError) -> Self {
        Self {
            name: name.to_string(),
            delay: Duration::ZERO,
            behavior: Behavior::Fail(err),
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Connector whose fetch panics instead of returning.
    pub fn panicking(name: &str, msg: &'static str) -> Self {
        Self {
            name: name.to_string(),
            delay: Duration::ZERO,
            behavior: Behavior::Panic(msg),
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn counter(&self) -> Arc<AtomicUsize> {
        self.calls.clone()
    }
}

#[async_trait]
impl Connector for StubConnector {
    async fn fetch(
        &self,
        _profile: &Profile,
        _budget: Duration,
    ) -> Result<Vec<RawListing>, ConnectorError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        match &self.behavior {
            Behavior::Return(v) => Ok(v.clone()),
            Behavior::Fail(f) => Err(f()),
            Behavior::Panic(msg) => panic!("{msg}"),
        }
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// Scorer that is enabled but never answers successfully.
pub struct DownScorer;

impl AiScorer for DownScorer {
    fn score<'a>(&'a self, _req: &'a ScoreRequest) -> ScoreFuture<'a> {
        Box::pin(async { Err(ScoringError::Unavailable("forced failure".into())) })
    }
    fn provider_name(&self) -> &'static str {
        "down"
    }
}

pub fn listing(source: &str, title: &str, company: &str, tags: &[&str], url: Option<&str>) -> RawListing {
    RawListing {
        source: source.to_string(),
        title: title.to_string(),
        company: company.to_string(),
        kind: Some("internship".to_string()),
        tags: tags.iter().map(|t| t.to_string()).collect(),
        url: url.map(str::to_string),
        posted_at: None,
    }
}

pub fn profile() -> Profile {
    Profile {
        email: "student@kec.edu".into(),
        role: "student".into(),
        department: "CSE".into(),
        skills: vec!["backend".into(), "go".into()],
        interests: Vec::new(),
    }
}

pub fn curated_frontend() -> CuratedEntry {
    CuratedEntry {
        id: "cur-fe".into(),
        title: "Frontend Intern".into(),
        company: "KEC Placement Cell".into(),
        kind: "internship".into(),
        tags: vec!["frontend".into()],
        source_url: Some("#".into()),
        added_at: None,
    }
}

pub fn catalog() -> StaticCatalog {
    StaticCatalog::new(vec![curated_frontend()])
}

pub fn config() -> EngineConfig {
    EngineConfig {
        connector_timeout_ms: 1_000,
        crawl_deadline_ms: 5_000,
        ..EngineConfig::default()
    }
}

pub fn engine_with(connectors: Vec<DynConnector>, scorer: DynAiScorer) -> Engine {
    Engine::new(&config(), connectors, scorer)
}

pub fn engine(connectors: Vec<DynConnector>) -> Engine {
    engine_with(connectors, Arc::new(DisabledScorer))
}
