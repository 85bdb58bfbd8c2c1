//! Prometheus exposition for the engine.
//!
//! Counters are emitted where things happen (ingest, canon, scoring,
//! feedback, throttle). This module installs the recorder, publishes the
//! configured limits as gauges and samples the live session count on scrape.

use std::sync::Arc;

use axum::{extract::State, routing::get, Router};
use metrics::gauge;
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};

use crate::config::engine::EngineConfig;
use crate::session::SessionRegistry;

/// Crawl wall time buckets, in milliseconds. The top bucket sits past the
/// default crawl deadline.
const CRAWL_DURATION_BUCKETS_MS: &[f64] = &[
    100.0, 250.0, 500.0, 1_000.0, 2_500.0, 5_000.0, 10_000.0, 20_000.0, 30_000.0,
];

pub struct Metrics {
    handle: PrometheusHandle,
}

#[derive(Clone)]
struct ScrapeState {
    handle: PrometheusHandle,
    sessions: Arc<SessionRegistry>,
}

impl Metrics {
    /// Install the global recorder and publish the configured limits.
    /// Fails if a recorder is already installed in this process.
    pub fn init(cfg: &EngineConfig, connectors: usize) -> anyhow::Result<Self> {
        let handle = PrometheusBuilder::new()
            .set_buckets_for_metric(
                Matcher::Full("crawl_duration_ms".to_string()),
                CRAWL_DURATION_BUCKETS_MS,
            )
            .map_err(|e| anyhow::anyhow!("prometheus: crawl buckets: {e}"))?
            .install_recorder()
            .map_err(|e| anyhow::anyhow!("prometheus: install recorder: {e}"))?;

        gauge!("engine_connectors_registered").set(connectors as f64);
        gauge!("throttle_auto_min_interval_ms").set(cfg.auto_trigger_min_interval_ms as f64);
        gauge!("crawl_deadline_ms").set(cfg.crawl_deadline_ms as f64);
        gauge!("session_idle_ttl_ms").set(cfg.session_idle_ttl_ms as f64);

        Ok(Self { handle })
    }

    /// `/metrics` route. `sessions_active` is sampled from `sessions` on
    /// every scrape.
    pub fn router(&self, sessions: Arc<SessionRegistry>) -> Router {
        Router::new()
            .route("/metrics", get(scrape))
            .with_state(ScrapeState {
                handle: self.handle.clone(),
                sessions,
            })
    }
}

async fn scrape(State(st): State<ScrapeState>) -> String {
    gauge!("sessions_active").set(st.sessions.len() as f64);
    st.handle.render()
}
