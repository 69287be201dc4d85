//! Error types for ctv-mc
//!
//! Structural errors fail fast here. Track compatibility never reaches this
//! type: an incompatible track is an ordinary verdict until someone tries to
//! apply it.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::triggers::ApplyError;

/// Service error type
#[derive(Debug, Error)]
pub enum Error {
    /// ctv-common error
    #[error("Common error: {0}")]
    Common(#[from] ctv_common::Error),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// No template stored for the round (404)
    #[error("No template for session {session_id} round {round}")]
    TemplateNotFound { session_id: String, round: u32 },

    /// Phase key not generated for the round (404)
    #[error("Phase not found: {0}")]
    PhaseNotFound(String),

    /// Trigger update rejected by the resolver
    #[error(transparent)]
    Apply(#[from] ApplyError),

    /// Configuration store unreachable
    #[error("Persistence error: {0}")]
    Persistence(String),
}

impl Error {
    fn status_and_code(&self) -> (StatusCode, &'static str) {
        match self {
            Error::TemplateNotFound { .. } => (StatusCode::NOT_FOUND, "TEMPLATE_NOT_FOUND"),
            Error::PhaseNotFound(_) => (StatusCode::NOT_FOUND, "PHASE_NOT_FOUND"),
            Error::Apply(err) => match err {
                ApplyError::UnknownTrack(_) => (StatusCode::NOT_FOUND, "TRACK_NOT_FOUND"),
                ApplyError::ConflictingCountdownFlags => {
                    (StatusCode::BAD_REQUEST, "CONFLICTING_COUNTDOWN_FLAGS")
                }
                ApplyError::PhaseNotInRound(_) => (StatusCode::BAD_REQUEST, "PHASE_NOT_IN_ROUND"),
                ApplyError::IncompatibleTrack { .. } => (StatusCode::CONFLICT, "INCOMPATIBLE_TRACK"),
                ApplyError::NoCompatibleTrack(_) => (StatusCode::CONFLICT, "NO_COMPATIBLE_TRACK"),
                ApplyError::RandomNaturalEnding(_) => {
                    (StatusCode::BAD_REQUEST, "RANDOM_NATURAL_ENDING")
                }
                ApplyError::TriggerAfterNaturalEnding { .. } => {
                    (StatusCode::CONFLICT, "TRIGGER_AFTER_NATURAL_ENDING")
                }
            },
            Error::Common(ctv_common::Error::InvalidInput(_)) => {
                (StatusCode::BAD_REQUEST, "BAD_REQUEST")
            }
            Error::Common(ctv_common::Error::NotFound(_)) => (StatusCode::NOT_FOUND, "NOT_FOUND"),
            Error::Common(_) => (StatusCode::INTERNAL_SERVER_ERROR, "COMMON_ERROR"),
            Error::Database(_) => (StatusCode::INTERNAL_SERVER_ERROR, "DATABASE_ERROR"),
            Error::Persistence(_) => (StatusCode::INTERNAL_SERVER_ERROR, "PERSISTENCE_ERROR"),
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let (status, error_code) = self.status_and_code();
        if status.is_server_error() {
            tracing::error!("{}", self);
        } else {
            tracing::warn!("Request rejected: {}", self);
        }

        let body = Json(json!({
            "error": {
                "code": error_code,
                "message": self.to_string(),
            }
        }));

        (status, body).into_response()
    }
}

/// Result type for service operations and handlers
pub type Result<T> = std::result::Result<T, Error>;
