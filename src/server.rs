//! HTTP server: single-page UI plus a JSON revision API.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET`  | `/` | Single-page UI (editor, instruction field, results) |
//! | `POST` | `/api/revise` | Run one revision interaction |
//! | `GET`  | `/health` | Health check (returns version) |
//!
//! # Error Contract
//!
//! All error responses use one envelope:
//!
//! ```json
//! { "error": { "code": "input_validation", "message": "..." } }
//! ```
//!
//! Codes: `input_validation` (400), `embedding_service` (502),
//! `generation_service` (502), `storage` (500), `internal` (500).
//!
//! # CORS
//!
//! All origins, methods, and headers are permitted.

use axum::{
    extract::State,
    http::StatusCode,
    response::{Html, IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tracing::info;

use crate::assist::Assistant;
use crate::config::Config;
use crate::generation::GenerationClient;
use crate::models::EditRequest;
use crate::store::RetrievalIndex;

/// Shared application state passed to all route handlers.
///
/// The index is constructed once at startup and shared read-only.
#[derive(Clone)]
struct AppState {
    assistant: Arc<Assistant<GenerationClient>>,
}

/// Build the index (reusing a persisted copy when present), then serve.
///
/// Binds to `[server].bind` and runs until the process is terminated.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let index = RetrievalIndex::ensure(config).await?;
    info!(
        chunks = index.chunk_count(),
        location = %index.location().display(),
        "retrieval index ready"
    );

    let generator = GenerationClient::new(&config.generation)?;
    let assistant = Arc::new(Assistant::new(Arc::new(index), generator, config));

    let state = AppState { assistant };

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = Router::new()
        .route("/", get(handle_page))
        .route("/api/revise", post(handle_revise))
        .route("/health", get(handle_health))
        .layer(cors)
        .with_state(state);

    println!("a11y-assist listening on http://{}", config.server.bind);

    let listener = tokio::net::TcpListener::bind(&config.server.bind).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

// ============ Error response ============

/// JSON error response body.
#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: String,
    message: String,
}

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

/// Map an interaction error class to an HTTP status.
fn status_for(code: &str) -> StatusCode {
    match code {
        "input_validation" => StatusCode::BAD_REQUEST,
        "embedding_service" | "generation_service" => StatusCode::BAD_GATEWAY,
        "storage" => StatusCode::INTERNAL_SERVER_ERROR,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

// ============ GET / ============

/// Serves the embedded single-page UI.
async fn handle_page() -> Html<&'static str> {
    Html(include_str!("assets/index.html"))
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

// ============ POST /api/revise ============

#[derive(Serialize)]
struct ReviseResponse {
    revised_code: String,
    explanation: String,
    context: String,
}

/// Runs one revision interaction: retrieval, revision, explanation.
///
/// Validation failures return `400` without issuing any service call;
/// service failures return `502`/`500` with the error envelope. Prior
/// results held by the client are unaffected either way.
async fn handle_revise(
    State(state): State<AppState>,
    Json(request): Json<EditRequest>,
) -> Result<Json<ReviseResponse>, AppError> {
    let interaction = state.assistant.handle(&request).await;

    if let Some(code) = interaction.error_code.clone() {
        return Err(AppError {
            status: status_for(&code),
            code,
            message: interaction
                .error
                .unwrap_or_else(|| "interaction failed".to_string()),
        });
    }

    match interaction.result() {
        Some(result) => Ok(Json(ReviseResponse {
            revised_code: result.revised_code,
            explanation: result.explanation,
            context: interaction.context.unwrap_or_default(),
        })),
        None => Err(AppError {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            code: "internal".to_string(),
            message: "interaction ended without a result".to_string(),
        }),
    }
}
