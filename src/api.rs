//! Thin HTTP test/admin surface over [`Engine`] (`SPEC_FULL.md` §10.5).
//!
//! This is transport only: it owns no evaluation logic, mirroring the
//! teacher's `AppState`/`create_router` split between wiring and handlers.

use crate::config::EngineConfig;
use crate::evaluator::{Engine, EngineOptions, EngineStats};
use crate::types::{ConversationTuple, EvaluationContext, EvaluationResult, Rule};
use axum::{
    extract::{Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use metrics_exporter_prometheus::PrometheusHandle;
use serde::Deserialize;
use std::sync::Arc;
use tower_http::cors::CorsLayer;

#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<Engine>,
    pub prometheus: Option<PrometheusHandle>,
}

impl AppState {
    pub fn new(engine: Arc<Engine>, prometheus: Option<PrometheusHandle>) -> Self {
        Self { engine, prometheus }
    }
}

/// Builds the router with a freshly constructed engine (no collaborators,
/// no Prometheus handle). Callers that need either should build their own
/// [`AppState`] and pass it to [`router`].
pub fn app() -> Router {
    let state = AppState::new(Arc::new(Engine::new(EngineOptions::default())), None);
    router(state)
}

/// Builds the router with a Prometheus recorder installed and `/metrics`
/// wired up, for the binary entrypoint.
pub fn app_with_metrics(config: EngineConfig) -> Router {
    let prometheus = crate::metrics::install_recorder();
    let options = EngineOptions {
        config: Some(config),
        ..EngineOptions::default()
    };
    let state = AppState::new(Arc::new(Engine::new(options)), Some(prometheus));
    router(state)
}

pub fn router(state: AppState) -> Router {
    let mut r = Router::new()
        .route("/health", get(health))
        .route("/v1/evaluate", post(evaluate))
        .route("/v1/rules", post(load_rules))
        .route("/v1/stats", get(stats))
        .route("/debug/state", get(debug_state));

    if state.prometheus.is_some() {
        r = r.route("/metrics", get(metrics_handler));
    }

    r.layer(CorsLayer::permissive()).with_state(state)
}

async fn health() -> &'static str {
    "ok"
}

async fn evaluate(
    State(state): State<AppState>,
    Json(ctx): Json<EvaluationContext>,
) -> Json<Vec<EvaluationResult>> {
    Json(state.engine.evaluate(ctx).await)
}

async fn load_rules(
    State(state): State<AppState>,
    Json(rules): Json<Vec<Rule>>,
) -> (StatusCode, Json<EngineStats>) {
    state.engine.load_rules(rules);
    (StatusCode::OK, Json(state.engine.stats()))
}

async fn stats(State(state): State<AppState>) -> Json<EngineStats> {
    Json(state.engine.stats())
}

#[derive(Debug, Deserialize)]
struct DebugStateQuery {
    token: String,
    conversation: String,
    account: Option<String>,
}

async fn debug_state(
    State(state): State<AppState>,
    Query(q): Query<DebugStateQuery>,
) -> Json<Option<crate::types::ConversationState>> {
    let tuple = ConversationTuple::new(q.token, q.conversation, q.account);
    Json(state.engine.debug_state(&tuple))
}

async fn metrics_handler(State(state): State<AppState>) -> String {
    state
        .prometheus
        .as_ref()
        .map(|h| h.render())
        .unwrap_or_default()
}
