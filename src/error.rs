//! Coordinator error types with HTTP status code mapping.
//!
//! [`CoordinatorError`] is the central error type for the service. Each
//! variant carries a short machine-readable code (clients map codes to
//! localized text) and maps to a specific HTTP status for the REST layer.
//! Store failures are logged with context at the call site and surfaced
//! as the generic `internal` code — backend error text never reaches
//! clients.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use utoipa::ToSchema;

/// Structured JSON error response body.
///
/// All error responses follow this shape:
/// ```json
/// {
///   "error": {
///     "code": "not_in_session",
///     "message": "not a member of session Q7K2MD",
///     "details": null
///   }
/// }
/// ```
#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorResponse {
    /// Structured error payload.
    pub error: ErrorBody,
}

/// Inner error body with machine-readable code and human-readable message.
#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorBody {
    /// Short machine-readable code (stable across releases).
    pub code: &'static str,
    /// Human-readable error message.
    pub message: String,
    /// Optional additional details.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

/// Server-side error enum with HTTP status code mapping.
///
/// # Error Kinds
///
/// | Kind         | Codes                                         | HTTP Status |
/// |--------------|-----------------------------------------------|-------------|
/// | Not found    | `session_not_found`, `participant_not_found`  | 404         |
/// | Full         | `session_full`                                | 409         |
/// | Validation   | `invalid_code`, `invalid_name`, `invalid_selection`, `invalid_options` | 400 |
/// | Conflict     | `already_submitted`, `code_generation_exhausted`, `restart_unavailable`, `round_complete` | 409 |
/// | Unauthorized | `not_in_session`                              | 403         |
/// | Internal     | `internal`                                    | 500         |
#[derive(Debug, thiserror::Error)]
pub enum CoordinatorError {
    /// Session with the given code was not found or has expired.
    #[error("session not found: {0}")]
    SessionNotFound(String),

    /// Participant is not known to the session.
    #[error("participant not found in session {0}")]
    ParticipantNotFound(String),

    /// Session already has the maximum number of participants.
    #[error("session {0} is full")]
    SessionFull(String),

    /// Session code does not match the 6-character alphanumeric format.
    #[error("invalid session code: {0}")]
    InvalidCode(String),

    /// Display name is empty or exceeds the length bound.
    #[error("invalid display name: {0}")]
    InvalidDisplayName(String),

    /// Selection list is empty or exceeds the length bound.
    #[error("invalid selection: {0}")]
    InvalidSelection(String),

    /// One or more submitted option ids are not candidates for the session.
    #[error("invalid options: {0}")]
    InvalidOptions(String),

    /// Participant already submitted this round; submission is write-once.
    #[error("selections already submitted for this round")]
    AlreadySubmitted,

    /// Code generation kept colliding past the bounded retry count.
    #[error("could not generate a unique session code")]
    CodeGenerationExhausted,

    /// Restart requested while the round is still in progress.
    #[error("session {0} has no completed round to restart")]
    RestartUnavailable(String),

    /// Join attempted on a session whose round is already complete; the
    /// group must restart before adding members.
    #[error("session {0} has a completed round; restart before joining")]
    RoundComplete(String),

    /// Action attempted by a connection that is not a member of the session.
    #[error("not a member of session {0}")]
    NotInSession(String),

    /// Session store operation failed.
    #[error("store error: {0}")]
    Store(String),

    /// Internal server error.
    #[error("internal error: {0}")]
    Internal(String),
}

impl CoordinatorError {
    /// Returns the machine-readable code for this variant.
    #[must_use]
    pub const fn error_code(&self) -> &'static str {
        match self {
            Self::SessionNotFound(_) => "session_not_found",
            Self::ParticipantNotFound(_) => "participant_not_found",
            Self::SessionFull(_) => "session_full",
            Self::InvalidCode(_) => "invalid_code",
            Self::InvalidDisplayName(_) => "invalid_name",
            Self::InvalidSelection(_) => "invalid_selection",
            Self::InvalidOptions(_) => "invalid_options",
            Self::AlreadySubmitted => "already_submitted",
            Self::CodeGenerationExhausted => "code_generation_exhausted",
            Self::RestartUnavailable(_) => "restart_unavailable",
            Self::RoundComplete(_) => "round_complete",
            Self::NotInSession(_) => "not_in_session",
            Self::Store(_) | Self::Internal(_) => "internal",
        }
    }

    /// Returns the HTTP status code for this variant.
    #[must_use]
    pub const fn status_code(&self) -> StatusCode {
        match self {
            Self::InvalidCode(_)
            | Self::InvalidDisplayName(_)
            | Self::InvalidSelection(_)
            | Self::InvalidOptions(_) => StatusCode::BAD_REQUEST,
            Self::SessionNotFound(_) | Self::ParticipantNotFound(_) => StatusCode::NOT_FOUND,
            Self::SessionFull(_)
            | Self::AlreadySubmitted
            | Self::CodeGenerationExhausted
            | Self::RestartUnavailable(_)
            | Self::RoundComplete(_) => StatusCode::CONFLICT,
            Self::NotInSession(_) => StatusCode::FORBIDDEN,
            Self::Store(_) | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Returns the message shown to clients.
    ///
    /// Store and internal variants are collapsed to a generic message so
    /// backend error text is never leaked.
    #[must_use]
    pub fn client_message(&self) -> String {
        match self {
            Self::Store(_) | Self::Internal(_) => "internal error".to_string(),
            other => other.to_string(),
        }
    }
}

impl IntoResponse for CoordinatorError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status == StatusCode::INTERNAL_SERVER_ERROR {
            tracing::error!(error = %self, "request failed");
        }
        let body = ErrorResponse {
            error: ErrorBody {
                code: self.error_code(),
                message: self.client_message(),
                details: None,
            },
        };
        let mut response = axum::Json(body).into_response();
        *response.status_mut() = status;
        response
    }
}
