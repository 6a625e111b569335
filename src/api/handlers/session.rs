//! Session handlers: create, get, delete.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};

use crate::api::dto::{CreateSessionRequest, CreateSessionResponse};
use crate::app_state::AppState;
use crate::domain::{CandidateOption, GeoParams};
use crate::error::{CoordinatorError, ErrorResponse};

/// `POST /sessions` — Create a new session.
///
/// The creator receives the code to share with the group; they become a
/// member (and host) when they join over the WebSocket channel.
///
/// # Errors
///
/// Returns [`CoordinatorError`] on invalid input or code exhaustion.
#[utoipa::path(
    post,
    path = "/api/v1/sessions",
    tag = "Sessions",
    summary = "Create a session",
    description = "Creates a session in the waiting state with the given candidate options. Returns the shareable 6-character code.",
    request_body = CreateSessionRequest,
    responses(
        (status = 201, description = "Session created", body = CreateSessionResponse),
        (status = 400, description = "Invalid request", body = ErrorResponse),
        (status = 409, description = "Code generation exhausted", body = ErrorResponse),
    )
)]
pub async fn create_session(
    State(state): State<AppState>,
    Json(req): Json<CreateSessionRequest>,
) -> Result<impl IntoResponse, CoordinatorError> {
    let geo: Option<GeoParams> = req.geo.map(Into::into);
    let options: Vec<CandidateOption> = req.options.into_iter().map(Into::into).collect();

    let (code, snapshot) = state
        .session_service
        .create_session(&req.host_name, geo, &options)
        .await?;

    let response = CreateSessionResponse {
        code: code.to_string(),
        state: snapshot.state.to_string(),
        created_at: snapshot.created_at,
        expires_at: snapshot.expires_at,
    };
    Ok((StatusCode::CREATED, Json(response)))
}

/// `GET /sessions/:code` — Public session snapshot.
///
/// Selection contents are never exposed here: only counts, flags, and
/// member display names.
///
/// # Errors
///
/// Returns [`CoordinatorError::SessionNotFound`] if the code is unknown
/// or the session has expired.
#[utoipa::path(
    get,
    path = "/api/v1/sessions/{code}",
    tag = "Sessions",
    summary = "Get session snapshot",
    description = "Returns the session's state, member summaries, submission counts, and expiry.",
    params(
        ("code" = String, Path, description = "6-character session code"),
    ),
    responses(
        (status = 200, description = "Session snapshot", body = serde_json::Value),
        (status = 404, description = "Session not found or expired", body = ErrorResponse),
    )
)]
pub async fn get_session(
    State(state): State<AppState>,
    Path(code): Path<String>,
) -> Result<impl IntoResponse, CoordinatorError> {
    let snapshot = state.session_service.get_session(&code).await?;
    Ok(Json(snapshot))
}

/// `DELETE /sessions/:code` — Administrative teardown.
///
/// Removes every key the session owns in one atomic operation and
/// notifies the room.
///
/// # Errors
///
/// Returns [`CoordinatorError::SessionNotFound`] if the code is unknown.
#[utoipa::path(
    delete,
    path = "/api/v1/sessions/{code}",
    tag = "Sessions",
    summary = "Delete a session",
    description = "Cascading, atomic removal of the session and all owned state.",
    params(
        ("code" = String, Path, description = "6-character session code"),
    ),
    responses(
        (status = 204, description = "Session deleted"),
        (status = 404, description = "Session not found", body = ErrorResponse),
    )
)]
pub async fn delete_session(
    State(state): State<AppState>,
    Path(code): Path<String>,
) -> Result<impl IntoResponse, CoordinatorError> {
    state.session_service.delete_session(&code).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Session management routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/sessions", post(create_session))
        .route("/sessions/{code}", get(get_session).delete(delete_session))
}
