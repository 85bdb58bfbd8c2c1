use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use tower_http::cors::CorsLayer;

use crate::ai_bootstrap::AiRuntime;
use crate::catalog::{DynCatalog, JsonFileCatalog};
use crate::config::engine::EngineConfig;
use crate::engine::Engine;
use crate::feedback::{FeedbackCollector, HttpFeedbackSink};
use crate::ingest::build_connectors;
use crate::model::{FeedbackAction, Profile, Trigger};
use crate::session::{spawn_idle_sweeper, SessionRegistry};

#[derive(Clone)]
pub struct AppState {
    pub engine: Engine,
    pub sessions: Arc<SessionRegistry>,
    pub catalog: DynCatalog,
    pub feedback: Arc<FeedbackCollector>,
}

impl AppState {
    pub fn new(engine: Engine, catalog: DynCatalog, feedback: FeedbackCollector) -> Self {
        Self {
            sessions: Arc::new(engine.new_registry()),
            engine,
            catalog,
            feedback: Arc::new(feedback),
        }
    }

    /// Wire everything from config files. Must run inside a Tokio runtime
    /// (the feedback worker and the idle-session sweep are spawned here).
    pub fn from_config(cfg: &EngineConfig) -> Self {
        let ai = AiRuntime::from_default();
        let engine = Engine::new(cfg, build_connectors(&cfg.connectors), ai.scorer);
        let catalog: DynCatalog = Arc::new(JsonFileCatalog::new(&cfg.catalog_path));
        let sink = Arc::new(HttpFeedbackSink::new(&cfg.feedback_base_url));
        let feedback = FeedbackCollector::spawn(sink, cfg.feedback_queue_capacity);
        let state = Self::new(engine, catalog, feedback);
        spawn_idle_sweeper(
            Arc::clone(&state.sessions),
            Duration::from_millis(cfg.session_idle_ttl_ms),
        );
        state
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(|| async { "OK" }))
        .route("/discover", post(discover))
        .route("/session/end", post(end_session))
        .route("/feedback", post(record_feedback))
        .layer(CorsLayer::very_permissive())
        .with_state(state)
}

#[derive(serde::Deserialize)]
struct DiscoverReq {
    profile: Profile,
    #[serde(default)]
    trigger: Trigger,
}

#[derive(serde::Deserialize)]
struct EndSessionReq {
    email: String,
}

#[derive(serde::Serialize)]
struct EndSessionResp {
    ended: bool,
}

#[derive(serde::Deserialize)]
struct FeedbackReq {
    email: String,
    opportunity_id: String,
    action: FeedbackAction,
}

async fn discover(State(state): State<AppState>, Json(body): Json<DiscoverReq>) -> Response {
    if body.profile.email.trim().is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            Json(serde_json::json!({ "error": "profile.email is required" })),
        )
            .into_response();
    }
    let session = state.sessions.start(&body.profile.email);
    match state
        .engine
        .discover(&session, &body.profile, state.catalog.as_ref(), body.trigger)
        .await
    {
        Ok(d) => Json(d).into_response(),
        Err(e) => {
            tracing::error!(target: "engine", error = %e, "discover failed");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(serde_json::json!({ "error": e.to_string() })),
            )
                .into_response()
        }
    }
}

async fn end_session(
    State(state): State<AppState>,
    Json(body): Json<EndSessionReq>,
) -> Json<EndSessionResp> {
    Json(EndSessionResp {
        ended: state.sessions.end(&body.email),
    })
}

async fn record_feedback(State(state): State<AppState>, Json(body): Json<FeedbackReq>) -> StatusCode {
    state
        .feedback
        .record(&body.email, &body.opportunity_id, body.action);
    StatusCode::ACCEPTED
}
