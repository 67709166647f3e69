use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Json,
    routing::get,
    Router,
};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use thiserror::Error;
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::database::{Database, SessionSummary};
use crate::error::DatabaseError;
use crate::models::{FlowCalculator, Graph, LabelFlow};
use crate::traversal::{SkippedAddress, TraversalState, TraversalStats};

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),
    #[error("Server error: {0}")]
    Server(String),
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub database_status: String,
    pub session_count: u64,
}

#[derive(Debug, Serialize)]
pub struct SessionsResponse {
    pub sessions: Vec<SessionSummary>,
    pub total_count: usize,
}

/// Session summary plus what the traversal left out; the graph has its own endpoint
#[derive(Debug, Serialize)]
pub struct SessionDetailResponse {
    #[serde(flatten)]
    pub summary: SessionSummary,
    pub state: TraversalState,
    pub stopped: bool,
    pub skipped: Vec<SkippedAddress>,
    pub pending: Vec<String>,
    pub stats: TraversalStats,
    pub label_groups: BTreeMap<String, Vec<String>>,
}

#[derive(Debug, Serialize)]
pub struct FlowsResponse {
    pub session_id: i64,
    pub flows: Vec<LabelFlow>,
    pub net_flows: BTreeMap<String, f64>,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
}

type ApiResult<T> = Result<Json<T>, (StatusCode, Json<ErrorResponse>)>;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub database: Arc<Database>,
}

/// Routes with CORS and request tracing applied
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(get_health))
        .route("/sessions", get(list_sessions))
        .route("/sessions/:id", get(get_session))
        .route("/sessions/:id/graph", get(get_session_graph))
        .route("/sessions/:id/flows", get(get_session_flows))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive()),
        )
        .with_state(state)
}

/// Read-only HTTP API over saved sessions
pub struct ApiServer {
    database: Arc<Database>,
    pub host: String,
    pub port: u16,
}

impl ApiServer {
    pub fn new(database: Arc<Database>, host: &str, port: u16) -> Self {
        Self {
            database,
            host: host.to_string(),
            port,
        }
    }

    pub async fn start(&self) -> Result<(), ApiError> {
        let app = router(AppState {
            database: self.database.clone(),
        });

        let addr = format!("{}:{}", self.host, self.port);
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|e| ApiError::Server(format!("Failed to bind to {}: {}", addr, e)))?;

        log::info!("HTTP API server starting on {}", addr);

        axum::serve(listener, app)
            .await
            .map_err(|e| ApiError::Server(format!("Server error: {}", e)))?;

        Ok(())
    }
}

fn error_response(context: &str, error: DatabaseError) -> (StatusCode, Json<ErrorResponse>) {
    let (status, code) = match error {
        DatabaseError::NotFound(_) => (StatusCode::NOT_FOUND, "not_found"),
        _ => {
            log::error!("{}: {}", context, error);
            (StatusCode::INTERNAL_SERVER_ERROR, "database_error")
        }
    };
    (
        status,
        Json(ErrorResponse {
            error: code.to_string(),
            message: format!("{}: {}", context, error),
        }),
    )
}

/// GET /health - database connectivity and session count
pub async fn get_health(State(state): State<AppState>) -> ApiResult<HealthResponse> {
    match state
        .database
        .health_check()
        .and_then(|_| state.database.session_count())
    {
        Ok(session_count) => Ok(Json(HealthResponse {
            status: "healthy".to_string(),
            database_status: "connected".to_string(),
            session_count,
        })),
        Err(e) => Err(error_response("Health check failed", e)),
    }
}

/// GET /sessions - saved sessions, newest first
pub async fn list_sessions(State(state): State<AppState>) -> ApiResult<SessionsResponse> {
    let sessions = state
        .database
        .list_sessions()
        .map_err(|e| error_response("Failed to list sessions", e))?;

    Ok(Json(SessionsResponse {
        total_count: sessions.len(),
        sessions,
    }))
}

/// GET /sessions/:id - session summary and traversal outcome
pub async fn get_session(
    Path(id): Path<i64>,
    State(state): State<AppState>,
) -> ApiResult<SessionDetailResponse> {
    let session = state
        .database
        .get_session(id)
        .map_err(|e| error_response("Failed to load session", e))?;
    let report = session.report;

    Ok(Json(SessionDetailResponse {
        summary: session.summary,
        label_groups: report.graph.label_groups(),
        state: report.state,
        stopped: report.stopped,
        skipped: report.skipped,
        pending: report.pending,
        stats: report.stats,
    }))
}

/// GET /sessions/:id/graph - the stored graph, nodes and edges
pub async fn get_session_graph(
    Path(id): Path<i64>,
    State(state): State<AppState>,
) -> ApiResult<Graph> {
    let session = state
        .database
        .get_session(id)
        .map_err(|e| error_response("Failed to load session", e))?;

    Ok(Json(session.report.graph))
}

/// GET /sessions/:id/flows - value flows between label groups
pub async fn get_session_flows(
    Path(id): Path<i64>,
    State(state): State<AppState>,
) -> ApiResult<FlowsResponse> {
    let session = state
        .database
        .get_session(id)
        .map_err(|e| error_response("Failed to load session", e))?;
    let graph = &session.report.graph;

    Ok(Json(FlowsResponse {
        session_id: id,
        flows: FlowCalculator::label_flows(graph),
        net_flows: FlowCalculator::node_net_flows(graph),
    }))
}
