//! Chat HTTP server.
//!
//! Exposes the query service to the website's chat widget.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `POST` | `/api/chat` | Answer a visitor message |
//! | `GET`  | `/health` | Health check (version and indexed chunk count) |
//!
//! `POST /api/chat` takes `{"message": "..."}` (`prompt` is accepted as an
//! alias) and returns `{"answer": "...", "citations": [...]}`.
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "bad_request", "message": "message must not be empty" } }
//! ```
//!
//! Error codes: `bad_request` (400), `embedding_failed` (502),
//! `generation_failed` (502), `internal` (500).
//!
//! # CORS
//!
//! All origins, methods, and headers are permitted so the widget can be
//! served from a different origin than the API.

use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tracing::{info, warn};

use crate::config::Config;
use crate::service::{Answer, QueryService, ServiceError};

#[derive(Clone)]
struct AppState {
    service: Arc<QueryService>,
}

/// Starts the chat server on `[server].bind` and runs until the process is
/// terminated.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let service = Arc::new(QueryService::from_config(config)?);
    let listener = tokio::net::TcpListener::bind(&config.server.bind).await?;
    info!(
        addr = %listener.local_addr()?,
        chunks = service.chunk_count(),
        "chat server listening"
    );
    serve(listener, service).await
}

/// Serve `service` on an already bound listener.
pub async fn serve(listener: tokio::net::TcpListener, service: Arc<QueryService>) -> anyhow::Result<()> {
    axum::serve(listener, router(service)).await?;
    Ok(())
}

/// The application router, with CORS applied.
pub fn router(service: Arc<QueryService>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/api/chat", post(handle_chat))
        .route("/health", get(handle_health))
        .layer(cors)
        .with_state(AppState { service })
}

// ============ Error response ============

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    /// Machine-readable error code (e.g., `"bad_request"`).
    code: String,
    message: String,
}

struct AppError {
    status: StatusCode,
    code: &'static str,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code.to_string(),
                message: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

fn bad_request(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::BAD_REQUEST,
        code: "bad_request",
        message: message.into(),
    }
}

impl From<ServiceError> for AppError {
    fn from(err: ServiceError) -> Self {
        let message = err.to_string();
        match err {
            ServiceError::Input(_) => bad_request(message),
            ServiceError::Embedding(_) => {
                warn!(%message, "chat request failed");
                AppError {
                    status: StatusCode::BAD_GATEWAY,
                    code: "embedding_failed",
                    message,
                }
            }
            ServiceError::Generation(_) => {
                warn!(%message, "chat request failed");
                AppError {
                    status: StatusCode::BAD_GATEWAY,
                    code: "generation_failed",
                    message,
                }
            }
        }
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        if rejection.status().is_server_error() {
            return AppError {
                status: StatusCode::INTERNAL_SERVER_ERROR,
                code: "internal",
                message: rejection.body_text(),
            };
        }
        bad_request(rejection.body_text())
    }
}

// ============ GET /health ============

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
    /// Chunks in the loaded index, 0 when none is loaded.
    chunks: usize,
}

async fn handle_health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        chunks: state.service.chunk_count(),
    })
}

// ============ POST /api/chat ============

#[derive(Deserialize)]
struct ChatRequest {
    #[serde(alias = "prompt")]
    message: String,
}

async fn handle_chat(
    State(state): State<AppState>,
    payload: Result<Json<ChatRequest>, JsonRejection>,
) -> Result<Json<Answer>, AppError> {
    let Json(request) = payload?;
    let answer = state.service.ask(&request.message).await?;
    Ok(Json(answer))
}
