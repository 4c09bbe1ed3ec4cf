//! HTTP API for context cards.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `POST` | `/api/context` | Context card for a draft (or `{}` for no suggestion) |
//! | `GET`  | `/health` | Health check (returns version) |
//! | `GET`  | `/stats` | Engine counters and index stats |
//! | `POST` | `/index/invalidate` | Drop the index and response cache |
//!
//! # Error Contract
//!
//! Only malformed requests fail. Error bodies look like:
//!
//! ```json
//! { "error": { "code": "invalid_recipient", "message": "Invalid recipientId: user-x" } }
//! ```
//!
//! Error codes: `bad_request` (400), `invalid_recipient` (400).
//!
//! # Client identity
//!
//! The rate-limit key is the first `x-forwarded-for` entry, then
//! `x-real-ip`, then `unknown-client`.
//!
//! # CORS
//!
//! All origins, methods, and headers are permitted so browser clients can
//! call the API directly.

use axum::{
    extract::{rejection::JsonRejection, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::time::Instant;
use tower_http::cors::{Any, CorsLayer};

use crate::engine::{ContextEngine, EngineStats};
use crate::error::RequestError;
use crate::types::{ContextMode, ContextRequest, ContextResponse};

/// Shared application state passed to all route handlers.
#[derive(Clone)]
struct AppState {
    engine: ContextEngine,
}

/// Starts the HTTP server on `bind` and serves until the process exits.
pub async fn run_server(engine: ContextEngine, bind: &str) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(bind).await?;
    tracing::info!(bind = %listener.local_addr()?, "context server listening");
    println!("Context server listening on http://{}", listener.local_addr()?);
    axum::serve(listener, router(engine)).await?;
    Ok(())
}

/// The application router, without a listener.
pub fn router(engine: ContextEngine) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/api/context", post(handle_context))
        .route("/health", get(handle_health))
        .route("/stats", get(handle_stats))
        .route("/index/invalidate", post(handle_invalidate))
        .layer(cors)
        .with_state(AppState { engine })
}

// ============ Error response ============

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: String,
    message: String,
}

/// Internal error type that converts into an Axum HTTP response.
struct AppError {
    status: StatusCode,
    code: String,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code,
                message: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

impl From<RequestError> for AppError {
    fn from(err: RequestError) -> Self {
        AppError {
            status: StatusCode::BAD_REQUEST,
            code: err.code().to_string(),
            message: err.to_string(),
        }
    }
}

// ============ POST /api/context ============

/// Request body. `clientKey` is never read from the body.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ContextBody {
    #[serde(default)]
    draft_text: Option<String>,
    #[serde(default)]
    recipient_id: Option<String>,
    #[serde(default)]
    mode: ContextMode,
    #[serde(default)]
    channel_id: Option<String>,
}

async fn handle_context(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Result<Json<ContextBody>, JsonRejection>,
) -> Result<Json<ContextResponse>, AppError> {
    let started = Instant::now();
    let Json(body) = body.map_err(|e| RequestError::Malformed(e.body_text()))?;

    let draft_text = body.draft_text.unwrap_or_default();
    if draft_text.trim().chars().count() < state.engine.config().min_draft_chars {
        return Ok(Json(ContextResponse::default()));
    }

    let recipient_id = body.recipient_id.unwrap_or_default();
    if !state.engine.directory().is_known_recipient(&recipient_id) {
        return Err(RequestError::InvalidRecipient(recipient_id).into());
    }

    let mode = body.mode;
    let query: String = draft_text.chars().take(60).collect();
    let response = state
        .engine
        .suggest(ContextRequest {
            draft_text,
            recipient_id,
            mode,
            channel_id: body.channel_id,
            client_key: client_key(&headers),
        })
        .await;

    let stats = state.engine.stats();
    tracing::info!(
        elapsed_ms = started.elapsed().as_millis() as u64,
        mode = mode.as_str(),
        tier = ?response.serving_tier,
        cache = stats.cache_size,
        inflight_synthesis = stats.inflight_synthesis,
        query = %query,
        "POST /api/context"
    );

    Ok(Json(response))
}

fn client_key(headers: &HeaderMap) -> String {
    let header = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
    };

    if let Some(first) = header("x-forwarded-for")
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|v| !v.is_empty())
    {
        return first.to_string();
    }
    header("x-real-ip")
        .map(str::to_string)
        .unwrap_or_else(|| "unknown-client".to_string())
}

// ============ GET /health ============

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}

async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

// ============ GET /stats ============

async fn handle_stats(State(state): State<AppState>) -> Json<EngineStats> {
    Json(state.engine.stats())
}

// ============ POST /index/invalidate ============

async fn handle_invalidate(State(state): State<AppState>) -> Json<serde_json::Value> {
    state.engine.invalidate();
    Json(serde_json::json!({ "invalidated": true }))
}
