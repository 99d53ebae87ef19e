//! Read-only HTTP status surface: liveness and session lookup.
//!
//! Nothing here mutates a session. Lookups go through
//! [`SessionStore::get`](conquest_runtime::SessionStore::get), so polling a
//! session does not keep it alive.

use std::sync::Arc;
use std::time::Instant;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use conquest_protocol::{Codec, SessionCode, SessionSummary};
use conquest_turn::RuleEngine;
use serde::Serialize;
use serde_json::json;

use crate::server::ServerState;

/// Body of every non-2xx response.
#[derive(Debug, Serialize)]
pub(crate) struct ErrorResponse {
    pub(crate) error: String,
}

type ApiError = (StatusCode, Json<ErrorResponse>);

fn api_error(status: StatusCode, error: impl ToString) -> ApiError {
    (
        status,
        Json(ErrorResponse {
            error: error.to_string(),
        }),
    )
}

pub(crate) fn router<G: RuleEngine, C: Codec>(state: Arc<ServerState<G, C>>) -> Router {
    Router::new()
        .route("/health", get(health_check::<G, C>))
        .route("/sessions/{code}", get(session_summary::<G, C>))
        .with_state(state)
}

/// `GET /health`
async fn health_check<G: RuleEngine, C: Codec>(
    State(state): State<Arc<ServerState<G, C>>>,
) -> impl IntoResponse {
    let session_count = state.store.lock().await.len();

    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "session_count": session_count,
        "uptime_ms": state.clock(),
        "timestamp": chrono::Utc::now().to_rfc3339(),
    }))
}

/// `GET /sessions/{code}`
///
/// - `400 Bad Request`: `code` is not a well-formed session code
/// - `404 Not Found`: no live session has that code
async fn session_summary<G: RuleEngine, C: Codec>(
    State(state): State<Arc<ServerState<G, C>>>,
    Path(code): Path<String>,
) -> Result<Json<SessionSummary>, ApiError> {
    let code = SessionCode::parse(&code).map_err(|e| api_error(StatusCode::BAD_REQUEST, e))?;

    let handle = state
        .store
        .lock()
        .await
        .get(&code, Instant::now())
        .map_err(|e| api_error(StatusCode::NOT_FOUND, e))?;

    match handle.summary().await {
        Ok(summary) => Ok(Json(summary)),
        Err(e) => {
            tracing::debug!(%code, error = %e, "summary lookup failed");
            Err(api_error(StatusCode::NOT_FOUND, e))
        }
    }
}
