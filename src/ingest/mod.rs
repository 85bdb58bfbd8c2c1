// src/ingest/mod.rs
//! Crawl orchestration: bounded fan-out over the registered connectors.

pub mod providers;
pub mod types;

use chrono::Utc;
use futures::stream::{self, StreamExt};
use futures::FutureExt;
use metrics::{counter, describe_counter, describe_histogram, histogram};
use once_cell::sync::OnceCell;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

use crate::config::engine::{ConnectorCfg, ConnectorKind, EngineConfig};
use crate::error::ConnectorError;
use crate::ingest::providers::{json_board::JsonBoardConnector, rss_feed::RssFeedConnector};
use crate::ingest::types::{DynConnector, RawListing};
use crate::model::{CrawlError, CrawlMeta, CrawlStatus, Profile};

/// One-time metrics registration (so series show up on /metrics).
pub(crate) fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!("crawl_runs_total", "Crawl runs started.");
        describe_counter!(
            "crawl_connector_errors_total",
            "Connector failures by kind."
        );
        describe_counter!("crawl_listings_total", "Raw listings returned by connectors.");
        describe_histogram!("crawl_duration_ms", "Crawl wall time in milliseconds.");
        describe_counter!(
            "dedup_merged_total",
            "Crawled listings folded into an existing record."
        );
    });
}

#[derive(Clone, Copy, Debug)]
pub struct CrawlSettings {
    pub max_parallel: usize,
    pub connector_timeout: Duration,
    pub deadline: Duration,
}

impl CrawlSettings {
    pub fn from_config(cfg: &EngineConfig) -> Self {
        Self {
            max_parallel: cfg.max_parallel.max(1),
            connector_timeout: Duration::from_millis(cfg.connector_timeout_ms),
            deadline: Duration::from_millis(cfg.crawl_deadline_ms),
        }
    }
}

impl Default for CrawlSettings {
    fn default() -> Self {
        Self::from_config(&EngineConfig::default())
    }
}

#[derive(Debug)]
pub struct CrawlOutcome {
    /// Successful batches, in connector registration order.
    pub batches: Vec<Vec<RawListing>>,
    pub meta: CrawlMeta,
}

/// Run every connector, at most `max_parallel` at once.
///
/// Each connector gets `connector_timeout` from the moment it starts, capped
/// by the overall deadline; a connector still queued when the deadline passes
/// is recorded as a timeout without being called. Returns once every
/// connector has settled.
pub async fn run_crawl(
    connectors: &[DynConnector],
    profile: &Profile,
    settings: &CrawlSettings,
) -> CrawlOutcome {
    ensure_metrics_described();
    counter!("crawl_runs_total").increment(1);

    let started_at = Utc::now();
    let t0 = Instant::now();
    let deadline = t0 + settings.deadline;

    // Owned per-task inputs: this future runs inside a spawned task.
    let profile = Arc::new(profile.clone());
    let per_connector = settings.connector_timeout;
    let tasks: Vec<_> = connectors
        .to_vec()
        .into_iter()
        .enumerate()
        .map(|(idx, connector)| {
            let profile = Arc::clone(&profile);
            async move {
                let now = Instant::now();
                let until = (now + per_connector).min(deadline);
                if until <= now {
                    return (idx, Err(ConnectorError::Timeout(0)));
                }
                let budget = until - now;
                // A panicking connector fails alone; the others still settle.
                let guarded = AssertUnwindSafe(connector.fetch(&profile, budget)).catch_unwind();
                let res = match tokio::time::timeout_at(until, guarded).await {
                    Ok(Ok(r)) => r,
                    Ok(Err(payload)) => Err(ConnectorError::Unreachable(format!(
                        "connector panicked: {}",
                        panic_message(payload.as_ref())
                    ))),
                    Err(_) => Err(ConnectorError::Timeout(budget.as_millis() as u64)),
                };
                (idx, res)
            }
        })
        .collect();
    let mut settled: Vec<(usize, Result<Vec<RawListing>, ConnectorError>)> =
        stream::iter(tasks)
            .buffer_unordered(settings.max_parallel.max(1))
            .collect()
            .await;

    // Completion order is timing-dependent; downstream merge must not be.
    settled.sort_by_key(|(idx, _)| *idx);

    let mut batches = Vec::with_capacity(settled.len());
    let mut errors = Vec::new();
    for (idx, res) in settled {
        let name = connectors[idx].name().to_string();
        match res {
            Ok(listings) => {
                counter!("crawl_listings_total").increment(listings.len() as u64);
                tracing::debug!(target: "ingest", provider = %name, count = listings.len(), "connector ok");
                batches.push(listings);
            }
            Err(e) => {
                let kind = e.kind();
                tracing::warn!(target: "ingest", error = %e, provider = %name, "connector failed");
                counter!("crawl_connector_errors_total", "kind" => kind.as_str()).increment(1);
                errors.push(CrawlError {
                    source: name,
                    kind,
                    message: e.to_string(),
                });
            }
        }
    }

    let attempted = connectors.len();
    let failed = errors.len();
    let duration_ms = t0.elapsed().as_millis() as u64;
    histogram!("crawl_duration_ms").record(duration_ms as f64);

    let meta = CrawlMeta {
        started_at,
        duration_ms,
        sources_attempted: attempted,
        sources_succeeded: attempted - failed,
        sources_failed: failed,
        errors,
        status: CrawlStatus::from_counts(attempted, failed),
        ai_boosted: 0,
    };

    tracing::info!(
        target: "ingest",
        attempted,
        failed,
        status = ?meta.status,
        duration_ms,
        "crawl settled"
    );

    CrawlOutcome { batches, meta }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Search string sent to sources: skills first, then interests, then role.
pub fn search_query(profile: &Profile) -> String {
    let mut parts: Vec<String> = Vec::new();
    for t in profile.skills.iter().chain(profile.interests.iter()) {
        let t = t.trim();
        if !t.is_empty() && !parts.iter().any(|p| p.eq_ignore_ascii_case(t)) {
            parts.push(t.to_string());
        }
        if parts.len() == 3 {
            break;
        }
    }
    if parts.is_empty() && !profile.department.trim().is_empty() {
        parts.push(profile.department.trim().to_string());
    }
    parts.push("internship".to_string());
    parts.join(" ")
}

/// Assemble the connector registry from config, preserving its order.
pub fn build_connectors(cfgs: &[ConnectorCfg]) -> Vec<DynConnector> {
    cfgs.iter()
        .map(|c| -> DynConnector {
            match c.kind {
                ConnectorKind::Rss => Arc::new(RssFeedConnector::from_url(&c.name, &c.url)),
                ConnectorKind::Json => Arc::new(JsonBoardConnector::from_url(&c.name, &c.url)),
            }
        })
        .collect()
}
