//! HTTP chat API.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `POST` | `/api/v1/chat` | Answer a user question via the RAG pipeline |
//! | `GET`  | `/health` | Health check (returns version) |
//!
//! The chat endpoint takes `{ "userMessage": "..." }` and returns the answer
//! as plain text. A blank message is a 400. A request the pipeline declines
//! to answer (no context above the similarity threshold) returns 200 with a
//! fixed refusal line; a model response with no usable output returns 200
//! with an empty body.
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "bad_request", "message": "userMessage must not be empty" } }
//! ```

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tracing::{error, info};

use crate::chat::{ChatOutcome, ChatService};
use crate::config::Config;

/// What the chat endpoint says when retrieval finds nothing it may answer
/// from.
pub const REFUSAL_MESSAGE: &str =
    "I can only answer questions covered by the indexed documentation. Please rephrase your question or visit payara.fish.";

#[derive(Clone)]
struct AppState {
    chat: Arc<ChatService>,
}

/// Incoming chat request body.
#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    #[serde(rename = "userMessage", default)]
    pub user_message: String,
}

/// Start the HTTP server. Runs until the process is terminated.
pub async fn run_server(config: &Config, chat: Arc<ChatService>) -> anyhow::Result<()> {
    let app = build_router(chat);

    let bind_addr = config.server.bind.clone();
    info!("chat API listening on http://{}", bind_addr);

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

/// Build the application router. Split out so tests can serve on an
/// ephemeral port.
pub fn build_router(chat: Arc<ChatService>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/api/v1/chat", post(handle_chat))
        .route("/health", get(handle_health))
        .layer(cors)
        .with_state(AppState { chat })
}

async fn handle_chat(
    State(state): State<AppState>,
    Json(request): Json<ChatRequest>,
) -> Result<Response, AppError> {
    if request.user_message.trim().is_empty() {
        return Err(AppError::bad_request("userMessage must not be empty"));
    }

    let outcome = state
        .chat
        .answer(&request.user_message)
        .await
        .map_err(|e| {
            error!(error = %e, "chat request failed");
            AppError::internal("chat request failed")
        })?;

    let body = match outcome {
        ChatOutcome::Answer(text) => text,
        ChatOutcome::NoAnswer => String::new(),
        ChatOutcome::NoContext => REFUSAL_MESSAGE.to_string(),
    };
    Ok((StatusCode::OK, body).into_response())
}

async fn handle_health() -> impl IntoResponse {
    format!("ragpipe {}", env!("CARGO_PKG_VERSION"))
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

/// Internal error type that converts into an HTTP response.
struct AppError {
    status: StatusCode,
    code: &'static str,
    message: String,
}

impl AppError {
    fn bad_request(message: &str) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            code: "bad_request",
            message: message.to_string(),
        }
    }

    fn internal(message: &str) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            code: "internal",
            message: message.to_string(),
        }
    }
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
