// src/lib.rs
// Public library surface for integration tests and the binaries.

pub mod api;
pub mod canon;
pub mod catalog;
pub mod config;
pub mod engine;
pub mod error;
pub mod model;
pub mod session;
pub mod throttle;

// Scoring pipeline (rules, AI adapter, ranking)
pub mod analyze;

// Connectors and the crawl fan-out
pub mod ingest;

// Interaction feedback to the recommendation service
pub mod feedback;

pub mod ai_bootstrap;
pub mod metrics;

// ---- Re-exports for stable public API ----
pub use analyze::ai_adapter;
pub use crate::api::{router, AppState};
pub use crate::engine::Engine;
pub use crate::model::{Discovery, Opportunity, Profile, Served, Trigger};

use tracing::info;

/// Call this from the Shuttle entrypoint (after tracing init) to perform a one-off
/// smoke test of the configured AI scorer. It won't panic on failure; it just logs the result.
///
/// ```ignore
/// if let Err(e) = opportunity_engine::run_ai_smoke_check().await {
///     tracing::warn!(error=?e, "AI smoke check didn't run");
/// }
/// ```
pub async fn run_ai_smoke_check() -> anyhow::Result<()> {
    // Path is relative to the runtime working dir (repo root in `cargo shuttle run`)
    let ai = ai_bootstrap::AiRuntime::from_path("config/ai.json")?;
    ai.smoke_check().await;
    info!("AI smoke check finished");
    Ok(())
}
