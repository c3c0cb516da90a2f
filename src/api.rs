use std::sync::Arc;

use axum::{
    Json, Router,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};

use sha1::{Digest, Sha1};

use crate::errors::EnqueueError;
use crate::models::IntakeRequest;
use crate::queue::IntakeQueue;

// ── Shared application state ──────────────────────────────────────────

pub struct AppState {
    pub queue: IntakeQueue,
    /// Shared secret every intake request must carry.
    pub secret: String,
}

pub type SharedState = Arc<AppState>;

// ── Error handling ────────────────────────────────────────────────────

#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    Forbidden(String),
    Unavailable(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::Forbidden(msg) => (StatusCode::FORBIDDEN, msg),
            ApiError::Unavailable(msg) => (StatusCode::SERVICE_UNAVAILABLE, msg),
        };
        (status, Json(serde_json::json!({"error": message}))).into_response()
    }
}

impl From<EnqueueError> for ApiError {
    fn from(err: EnqueueError) -> Self {
        ApiError::Unavailable(err.to_string())
    }
}

// ── Router ────────────────────────────────────────────────────────────

pub fn api_router() -> Router<SharedState> {
    Router::new()
        .route("/", get(health_check))
        .route("/api-endpoint", post(intake))
}

// ── Handlers ──────────────────────────────────────────────────────────

async fn health_check() -> &'static str {
    "API is running!"
}

/// Validate the secret and enqueue. Never waits on the pipeline.
///
/// The secret is checked on the raw body, before the task fields are parsed.
async fn intake(
    State(state): State<SharedState>,
    Json(body): Json<serde_json::Value>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let presented = body.get("secret").and_then(serde_json::Value::as_str);
    if !presented.is_some_and(|secret| secrets_match(secret, &state.secret)) {
        tracing::warn!(task = ?body.get("task"), "Rejected request with invalid secret");
        return Err(ApiError::Forbidden("Invalid secret".to_string()));
    }

    let body: IntakeRequest = serde_json::from_value(body)
        .map_err(|e| ApiError::BadRequest(format!("Invalid task request: {}", e)))?;
    let task = body.request.task.clone();
    let round = body.request.round;

    let job_id = state.queue.enqueue(body.request).map_err(|e| {
        tracing::warn!(%task, round, error = %e, "Rejected request, queue unavailable");
        ApiError::from(e)
    })?;
    tracing::info!(%job_id, %task, round, queued = state.queue.pending(), "Accepted task request");

    Ok(Json(serde_json::json!({
        "status": "acknowledged",
        "job_id": job_id,
    })))
}

/// Compare fixed-size digests of both values so the time taken does not
/// depend on where, or whether, they first differ.
fn secrets_match(presented: &str, expected: &str) -> bool {
    let presented = Sha1::digest(presented.as_bytes());
    let expected = Sha1::digest(expected.as_bytes());
    presented
        .iter()
        .zip(expected.iter())
        .fold(0u8, |diff, (a, b)| diff | (a ^ b))
        == 0
}
