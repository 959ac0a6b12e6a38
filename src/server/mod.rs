#[cfg(test)]
mod tests;

use axum::Router;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use axum::routing::{get, post};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::sync::Arc;
use tracing::info;

use crate::MailError;
use crate::config::ServerConfig;
use crate::jobs::{JobQueue, JobStatus};
use crate::search::{DEFAULT_SEARCH_LIMIT, SearchHit, Searcher};

/// Shared handles the request handlers operate on.
#[derive(Clone)]
pub struct AppState {
    pub searcher: Arc<Searcher>,
    pub jobs: Arc<JobQueue>,
}

#[derive(Debug, Deserialize)]
pub struct SearchRequest {
    pub query: String,
    pub k: Option<usize>,
}

#[derive(Debug, Serialize)]
pub struct SearchResponse {
    pub results: Vec<SearchHit>,
}

#[derive(Debug, Serialize)]
pub struct SubmitResponse {
    pub job_id: uuid::Uuid,
}

/// Error shape returned to HTTP clients. Internal detail stays in the logs;
/// the body carries a stable code plus a short message.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    error_code: &'static str,
    message: String,
}

impl ApiError {
    #[inline]
    pub fn status(&self) -> StatusCode {
        self.status
    }
}

impl From<MailError> for ApiError {
    #[inline]
    fn from(error: MailError) -> Self {
        let (status, error_code) = match &error {
            MailError::InvalidInput(_) => (StatusCode::BAD_REQUEST, "invalid_input"),
            MailError::NotFound(_) => (StatusCode::NOT_FOUND, "not_found"),
            MailError::Database(_) => (StatusCode::SERVICE_UNAVAILABLE, "database_unavailable"),
            MailError::Embedding(_) => (StatusCode::SERVICE_UNAVAILABLE, "embedding_unavailable"),
            MailError::Completion(_) => (StatusCode::SERVICE_UNAVAILABLE, "completion_unavailable"),
            MailError::Timeout(_) => (StatusCode::GATEWAY_TIMEOUT, "timeout"),
            MailError::Config(_) | MailError::Io(_) | MailError::Other(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "internal_error")
            }
        };
        Self {
            status,
            error_code,
            message: error.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    #[inline]
    fn into_response(self) -> Response {
        let body = json!({
            "error_code": self.error_code,
            "message": self.message,
        });
        (self.status, Json(body)).into_response()
    }
}

/// Build the service router. Kept separate from `serve` so tests can drive
/// handlers without binding a socket.
#[inline]
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/search", post(search))
        .route("/api/summarize/{message_id}", post(summarize))
        .route("/api/task-status/{job_id}", get(task_status))
        .with_state(state)
}

/// Bind the configured address and run the service until the task is
/// cancelled.
#[inline]
pub async fn serve(config: &ServerConfig, state: AppState) -> anyhow::Result<()> {
    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("HTTP server listening on {addr}");

    axum::serve(listener, router(state)).await?;
    Ok(())
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

async fn search(
    State(state): State<AppState>,
    Json(request): Json<SearchRequest>,
) -> Result<Json<SearchResponse>, ApiError> {
    let limit = request.k.unwrap_or(DEFAULT_SEARCH_LIMIT);
    let results = state.searcher.search(&request.query, limit).await?;
    Ok(Json(SearchResponse { results }))
}

/// Accepts the job without checking the message exists; a bad id surfaces
/// as a failed job when polled.
async fn summarize(
    State(state): State<AppState>,
    Path(message_id): Path<i64>,
) -> (StatusCode, Json<SubmitResponse>) {
    let job_id = state.jobs.submit(message_id);
    (StatusCode::ACCEPTED, Json(SubmitResponse { job_id }))
}

async fn task_status(
    State(state): State<AppState>,
    Path(job_id): Path<uuid::Uuid>,
) -> Result<Json<JobStatus>, ApiError> {
    let status = state.jobs.poll(job_id)?;
    Ok(Json(status))
}
