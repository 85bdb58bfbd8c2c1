//! Opportunity engine service, binary entrypoint.
//! Boots the Axum HTTP server with discovery, session and feedback routes
//! plus the Prometheus `/metrics` endpoint.

use opportunity_engine::config::engine::EngineConfig;
use opportunity_engine::metrics::Metrics;
use opportunity_engine::{router, AppState};
use shuttle_axum::ShuttleAxum;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Default filter: every engine target at info, canon merges only when
/// something was dropped, everything else at warn.
const DEFAULT_LOG_FILTER: &str =
    "engine=info,ingest=info,session=info,scoring=info,feedback=info,canon=warn,warn";

/// Engine log output, picked by `ENGINE_LOG_FORMAT`.
#[derive(Clone, Copy, PartialEq, Eq)]
enum LogFormat {
    Compact,
    Json,
}

impl LogFormat {
    fn from_env() -> Option<Self> {
        match std::env::var("ENGINE_LOG_FORMAT")
            .unwrap_or_default()
            .trim()
            .to_ascii_lowercase()
            .as_str()
        {
            "json" => Some(Self::Json),
            "compact" => Some(Self::Compact),
            _ => None,
        }
    }
}

fn is_dev_env() -> bool {
    cfg!(debug_assertions)
        || matches!(
            std::env::var("SHUTTLE_ENV")
                .unwrap_or_default()
                .to_ascii_lowercase()
                .as_str(),
            "local" | "development" | "dev"
        )
}

/// Install the tracing subscriber, if asked to.
///   - `ENGINE_LOG_FORMAT=json|compact` turns logging on in any environment
///   - `ENGINE_DEV_LOG=1` turns compact logging on in dev environments
///     (debug build OR SHUTTLE_ENV in {local, development, dev})
///
/// `RUST_LOG` overrides the default filter.
fn init_tracing() {
    let dev_flag = std::env::var("ENGINE_DEV_LOG")
        .ok()
        .is_some_and(|v| v == "1");

    let format = match LogFormat::from_env() {
        Some(f) => f,
        None if dev_flag && is_dev_env() => LogFormat::Compact,
        None => return,
    };

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));

    match format {
        LogFormat::Compact => tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().compact())
            .init(),
        LogFormat::Json => tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json().flatten_event(true).with_current_span(false))
            .init(),
    }
}

#[shuttle_runtime::main]
async fn axum() -> ShuttleAxum {
    // Load .env in local/dev; no-op in prod environments.
    let _ = dotenvy::dotenv();

    init_tracing();

    // Opt-in startup check of the AI scorer; never blocks boot.
    if std::env::var("AI_SMOKE_CHECK").is_ok_and(|v| v == "1") {
        tokio::spawn(async {
            if let Err(e) = opportunity_engine::run_ai_smoke_check().await {
                tracing::warn!(error = ?e, "AI smoke check didn't run");
            }
        });
    }

    let cfg = EngineConfig::load_default().map_err(shuttle_runtime::Error::Custom)?;
    let state = AppState::from_config(&cfg);

    let metrics = Metrics::init(&cfg, state.engine.connector_count())
        .map_err(shuttle_runtime::Error::Custom)?;

    let sessions = state.sessions.clone();
    let app = router(state).merge(metrics.router(sessions));
    Ok(app.into())
}
