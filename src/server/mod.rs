//! HTTP server
//!
//! Read API over the corpus store plus the WebSocket control channel that
//! drives the analysis workflows.

pub mod ws;

use crate::bus::EventBus;
use crate::citations::CitationVerifier;
use crate::cli::ServeArgs;
use crate::config::Config;
use crate::context::ContextBuilder;
use crate::gate::RequestGate;
use crate::legal::LegalCorpus;
use crate::provider::anthropic::AnthropicProvider;
use crate::provider::Provider;
use crate::runner::StreamingRunner;
use crate::store::insights::InsightQuery;
use crate::store::Store;
use crate::telemetry::TokenAccountant;
use crate::tool::{self, ToolRegistry};
use crate::workflow::WorkflowEngine;
use anyhow::{Context, Result};
use axum::{
    extract::{Path, Query, State, WebSocketUpgrade},
    http::StatusCode,
    response::{IntoResponse, Json},
    routing::get,
    Router,
};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Shared state for all handlers.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<Store>,
    pub engine: Arc<WorkflowEngine>,
    pub bus: Arc<EventBus>,
    pub gate: Arc<RequestGate>,
    pub accountant: Arc<TokenAccountant>,
}

/// Wire the core together from configuration. The provider is swappable so
/// tests drive the same engine with a scripted model. A distinct
/// `search_provider` routes the grounded case-law calls through a separate
/// key when one is configured.
pub fn build_state(store: Arc<Store>, provider: Arc<dyn Provider>, model: &str) -> AppState {
    let search_provider = Arc::clone(&provider);
    build_state_with_search(store, provider, search_provider, model)
}

pub fn build_state_with_search(
    store: Arc<Store>,
    provider: Arc<dyn Provider>,
    search_provider: Arc<dyn Provider>,
    model: &str,
) -> AppState {
    let legal = LegalCorpus::load();
    let context = Arc::new(ContextBuilder::new(Arc::clone(&store), Arc::clone(&legal)));
    let bus = Arc::new(EventBus::new());
    let gate = Arc::new(RequestGate::new());
    let accountant = Arc::new(TokenAccountant::new());
    let verifier = Arc::new(CitationVerifier::new(
        Arc::clone(&search_provider),
        Arc::clone(&legal),
        model,
    ));

    let mut registry = ToolRegistry::new();
    registry.register(Arc::new(tool::case::GetCaseTool::new(Arc::clone(&store))));
    registry.register(Arc::new(tool::case::GetCaseContextTool::new(Arc::clone(&context))));
    registry.register(Arc::new(tool::legal::GetLegalContextTool::new(Arc::clone(&context))));
    registry.register(Arc::new(tool::findings::GetAlertsTool::new(Arc::clone(&store))));
    registry.register(Arc::new(tool::findings::GetConnectionsTool::new(Arc::clone(&store))));
    registry.register(Arc::new(tool::findings::GetPriorAnalysesTool::new(Arc::clone(&store))));
    registry.register(Arc::new(tool::caselaw::SearchCaseLawTool::new(
        Arc::clone(&search_provider),
        model,
    )));
    registry.register(Arc::new(tool::caselaw::VerifyCitationsTool::new(Arc::clone(&verifier))));
    registry.register(Arc::new(tool::caselaw::SearchPrecedentsTool::new(
        search_provider,
        model,
    )));
    let registry = Arc::new(registry);

    let runner = Arc::new(StreamingRunner::new(
        provider,
        Arc::clone(&bus),
        Arc::clone(&accountant),
        model,
    ));

    let engine = Arc::new(WorkflowEngine::new(
        Arc::clone(&store),
        legal,
        context,
        registry,
        runner,
        verifier,
        Arc::clone(&bus),
        Arc::clone(&gate),
        Arc::clone(&accountant),
    ));

    AppState {
        store,
        engine,
        bus,
        gate,
        accountant,
    }
}

/// Start the server. Exit is clean on shutdown; a failed bind or a missing
/// database path surfaces as a startup error.
pub async fn serve(args: ServeArgs, config: Config) -> Result<()> {
    let store = match &args.db {
        Some(path) if path.to_string_lossy() != ":memory:" => Arc::new(Store::open(path)?),
        _ => Arc::new(Store::open_in_memory()?),
    };

    let api_key = config
        .api_key
        .clone()
        .context("ANTHROPIC_API_KEY is required to start the server")?;
    let provider: Arc<dyn Provider> = Arc::new(AnthropicProvider::new(api_key)?);
    let search_provider: Arc<dyn Provider> = match &config.search_api_key {
        Some(key) => Arc::new(AnthropicProvider::new(key.clone())?),
        None => Arc::clone(&provider),
    };
    let state = build_state_with_search(store, provider, search_provider, &config.model);

    let app = router(state);
    let addr = format!("{}:{}", args.hostname, args.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    tracing::info!("Case Nexus listening on http://{addr}");

    axum::serve(listener, app).await?;
    Ok(())
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/ws", get(ws_upgrade))
        .route("/api/stats", get(api_stats))
        .route("/api/cases", get(api_cases))
        .route("/api/case/{case_number}", get(api_case))
        .route("/api/evidence/{case_number}", get(api_evidence))
        .route("/api/alerts", get(api_alerts))
        .route("/api/connections", get(api_connections))
        .route("/api/analysis-log", get(api_analysis_log))
        .with_state(state)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
}

async fn health() -> &'static str {
    "ok"
}

async fn ws_upgrade(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| ws::handle_connection(socket, state))
}

async fn api_stats(State(state): State<AppState>) -> Result<Json<serde_json::Value>, ApiError> {
    let counts = state.store.case_counts()?;
    let alerts = state.store.alerts()?;
    let connections = state.store.connections()?;
    let critical = alerts
        .iter()
        .filter(|a| a.severity == crate::store::AlertSeverity::Critical)
        .count();
    Ok(Json(json!({
        "cases": counts,
        "alert_count": alerts.len(),
        "critical_alerts": critical,
        "connection_count": connections.len(),
        "tokens": state.accountant.snapshot(),
    })))
}

async fn api_cases(State(state): State<AppState>) -> Result<Json<serde_json::Value>, ApiError> {
    Ok(Json(json!(state.store.all_cases()?)))
}

async fn api_case(
    State(state): State<AppState>,
    Path(case_number): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    match state.store.get_case(&case_number)? {
        Some(case) => Ok(Json(json!(case))),
        None => Err(ApiError::NotFound),
    }
}

async fn api_evidence(
    State(state): State<AppState>,
    Path(case_number): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    Ok(Json(json!(state.store.evidence(&case_number)?)))
}

async fn api_alerts(State(state): State<AppState>) -> Result<Json<serde_json::Value>, ApiError> {
    Ok(Json(json!(state.store.alerts()?)))
}

async fn api_connections(
    State(state): State<AppState>,
) -> Result<Json<serde_json::Value>, ApiError> {
    Ok(Json(json!(state.store.connections()?)))
}

#[derive(Deserialize)]
struct AnalysisLogQuery {
    scope: Option<String>,
    #[serde(rename = "type")]
    analysis_type: Option<String>,
    limit: Option<usize>,
}

async fn api_analysis_log(
    State(state): State<AppState>,
    Query(query): Query<AnalysisLogQuery>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let insights = state.store.list_insights(&InsightQuery {
        scope: query.scope,
        analysis_type: query.analysis_type,
        limit: Some(query.limit.unwrap_or(50)),
    })?;
    Ok(Json(json!(insights)))
}

/// Read-API error mapping.
pub enum ApiError {
    NotFound,
    Internal(anyhow::Error),
}

impl From<anyhow::Error> for ApiError {
    fn from(e: anyhow::Error) -> Self {
        ApiError::Internal(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        match self {
            ApiError::NotFound => {
                (StatusCode::NOT_FOUND, Json(json!({"error": "not found"}))).into_response()
            }
            ApiError::Internal(e) => {
                tracing::error!(error = %e, "read API failure");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(json!({"error": e.to_string()})),
                )
                    .into_response()
            }
        }
    }
}
