//! HTTP server hosting the stream producer
//!
//! Routes:
//! - `GET /api/health`
//! - `POST /api/tender/analyze/stream`, `/api/proposal/draft/stream`,
//!   `/api/proposal/rewrite/stream` (SSE)
//! - `POST /api/tender/analyze`, `/api/proposal/draft` (single JSON response)

use axum::{
    Json, Router,
    extract::{DefaultBodyLimit, State, rejection::JsonRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde_json::{Value, json};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::signal;
use tower_http::trace::TraceLayer;

use crate::backend::InferenceBackend;
use crate::config::Config;
use crate::error::{Result, StrataError};
use crate::producer::StreamProducer;
use crate::task::{
    AnalyzeRequest, DraftRequest, RewriteRequest, StreamTask, ValidationError,
    json_analysis_request, plain_draft_request,
};

/// Shared application state for all handlers
#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    pub backend: Arc<dyn InferenceBackend>,
    pub producer: StreamProducer,
}

impl AppState {
    pub fn new(config: Config, backend: Arc<dyn InferenceBackend>) -> Self {
        let producer = StreamProducer::new(Arc::clone(&backend), config.stream.channel_capacity);
        Self {
            config,
            backend,
            producer,
        }
    }
}

/// The HTTP server
pub struct StrataServer {
    config: Config,
    backend: Arc<dyn InferenceBackend>,
}

impl StrataServer {
    pub fn new(config: Config, backend: Arc<dyn InferenceBackend>) -> Self {
        Self { config, backend }
    }

    /// Bind and serve until Ctrl+C or SIGTERM
    pub async fn serve(&self) -> Result<()> {
        let addr: SocketAddr = self
            .config
            .server
            .listen_addr
            .parse()
            .map_err(|e| StrataError::Config(format!("Invalid listen address: {e}")))?;

        let state = Arc::new(AppState::new(self.config.clone(), Arc::clone(&self.backend)));
        let app = create_router(state);

        tracing::info!("Starting server on {addr}");
        tracing::info!(
            "Inference backend: {} (model {})",
            self.backend.name(),
            self.config.inference.model
        );

        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| StrataError::General(format!("Failed to bind to {addr}: {e}")))?;

        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal())
            .await
            .map_err(|e| StrataError::General(format!("Server error: {e}")))?;

        tracing::info!("Server shut down gracefully");
        Ok(())
    }
}

/// Create the router with all routes configured
pub fn create_router(state: Arc<AppState>) -> Router {
    let body_limit = state.config.server.max_body_bytes;
    Router::new()
        .route("/api/health", get(health_handler))
        .route("/api/tender/analyze/stream", post(analyze_stream_handler))
        .route("/api/proposal/draft/stream", post(draft_stream_handler))
        .route("/api/proposal/rewrite/stream", post(rewrite_stream_handler))
        .route("/api/tender/analyze", post(analyze_handler))
        .route("/api/proposal/draft", post(draft_handler))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health_handler() -> Json<Value> {
    Json(json!({"status": "ok"}))
}

fn error_response(status: StatusCode, message: &str) -> Response {
    (status, Json(json!({ "error": message }))).into_response()
}

fn bad_request(e: JsonRejection) -> Response {
    tracing::debug!("Rejected request body: {}", e.body_text());
    error_response(StatusCode::BAD_REQUEST, &e.body_text())
}

async fn open_stream(state: &AppState, task: std::result::Result<StreamTask, ValidationError>) -> Response {
    match task {
        Ok(task) => {
            let request = task.streaming_request(&state.config.inference);
            state.producer.open(task.kind(), request).await
        }
        Err(e) => error_response(StatusCode::BAD_REQUEST, &e.to_string()),
    }
}

async fn analyze_stream_handler(
    State(state): State<Arc<AppState>>,
    body: std::result::Result<Json<AnalyzeRequest>, JsonRejection>,
) -> Response {
    match body {
        Ok(Json(req)) => open_stream(&state, StreamTask::try_from(req)).await,
        Err(e) => bad_request(e),
    }
}

async fn draft_stream_handler(
    State(state): State<Arc<AppState>>,
    body: std::result::Result<Json<DraftRequest>, JsonRejection>,
) -> Response {
    match body {
        Ok(Json(req)) => open_stream(&state, StreamTask::try_from(req)).await,
        Err(e) => bad_request(e),
    }
}

async fn rewrite_stream_handler(
    State(state): State<Arc<AppState>>,
    body: std::result::Result<Json<RewriteRequest>, JsonRejection>,
) -> Response {
    match body {
        Ok(Json(req)) => open_stream(&state, StreamTask::try_from(req)).await,
        Err(e) => bad_request(e),
    }
}

/// Analysis as a single JSON object
async fn analyze_handler(
    State(state): State<Arc<AppState>>,
    body: std::result::Result<Json<AnalyzeRequest>, JsonRejection>,
) -> Response {
    let req = match body {
        Ok(Json(req)) => req,
        Err(e) => return bad_request(e),
    };
    let text = match StreamTask::try_from(req) {
        Ok(StreamTask::TenderAnalysis { text }) => text,
        Ok(_) => return error_response(StatusCode::BAD_REQUEST, "Tender text is required"),
        Err(e) => return error_response(StatusCode::BAD_REQUEST, &e.to_string()),
    };

    let request = json_analysis_request(&text, &state.config.inference);
    let content = match state.backend.complete(request).await {
        Ok(content) => content,
        Err(e) => {
            tracing::error!("Tender analysis failed: {}", e);
            return error_response(StatusCode::INTERNAL_SERVER_ERROR, &e.client_message());
        }
    };

    match serde_json::from_str::<Value>(content.trim()) {
        Ok(analysis) => Json(json!({"success": true, "analysis": analysis})).into_response(),
        Err(e) => {
            tracing::warn!("Model returned invalid JSON in JSON mode: {}", e);
            error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                "Model returned invalid JSON",
            )
        }
    }
}

/// Drafting as a single JSON response
async fn draft_handler(
    State(state): State<Arc<AppState>>,
    body: std::result::Result<Json<DraftRequest>, JsonRejection>,
) -> Response {
    let req = match body {
        Ok(Json(req)) => req,
        Err(e) => return bad_request(e),
    };
    let (prompt, context) = match StreamTask::try_from(req) {
        Ok(StreamTask::Draft { prompt, context }) => (prompt, context),
        Ok(_) => {
            return error_response(StatusCode::BAD_REQUEST, "Prompt and context are required");
        }
        Err(e) => return error_response(StatusCode::BAD_REQUEST, &e.to_string()),
    };

    let request = plain_draft_request(&prompt, &context, &state.config.inference);
    match state.backend.complete(request).await {
        Ok(draft) => Json(json!({"success": true, "draft": draft})).into_response(),
        Err(e) => {
            tracing::error!("Drafting failed: {}", e);
            error_response(StatusCode::INTERNAL_SERVER_ERROR, &e.client_message())
        }
    }
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating graceful shutdown");
        },
        _ = terminate => {
            tracing::info!("Received SIGTERM, initiating graceful shutdown");
        },
    }
}
