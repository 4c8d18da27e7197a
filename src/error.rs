use axum::{Json, http::StatusCode, response::IntoResponse};
use serde::Serialize;
use thiserror::Error;

use crate::{dao::storage::StorageError, state::state_machine::InvalidTransition};

/// Failures surfaced by the game services.
///
/// Losing a buzz race is not an error and never shows up here; see
/// [`crate::services::arbitration::ClaimOutcome`].
#[derive(Debug, Error)]
pub enum ServiceError {
    /// The session store rejected or failed the operation.
    #[error("session store unavailable")]
    Unavailable(#[source] StorageError),
    /// No session store has been installed yet.
    #[error("session store not connected (degraded mode)")]
    Degraded,
    /// Caller did not present a known identity.
    #[error("unauthorized: {0}")]
    Unauthorized(String),
    /// Caller is known but lacks the role, usually host.
    #[error("forbidden: {0}")]
    Forbidden(String),
    /// Request payload or parameter is not acceptable.
    #[error("invalid input: {0}")]
    InvalidInput(String),
    /// The session is not in a status that allows this intent.
    #[error("invalid state: {0}")]
    InvalidState(String),
    /// Unknown session, player or category.
    #[error("not found: {0}")]
    NotFound(String),
    /// Every item of the category has already been played this game.
    #[error("no unplayed items left in category `{category}`")]
    ContentExhausted {
        /// Category that ran dry.
        category: String,
    },
    /// No candidate item resolved to playable media.
    #[error("no playable media found after {attempts} attempt(s); try another category")]
    MediaUnavailable {
        /// Number of candidates tried.
        attempts: usize,
    },
    /// Optimistic writes kept losing against concurrent writers.
    #[error("session is busy, retry")]
    Contention,
    /// Unexpected server-side failure.
    #[error("internal error: {0}")]
    Internal(String),
}

impl From<StorageError> for ServiceError {
    fn from(err: StorageError) -> Self {
        ServiceError::Unavailable(err)
    }
}

impl From<InvalidTransition> for ServiceError {
    fn from(err: InvalidTransition) -> Self {
        ServiceError::InvalidState(err.to_string())
    }
}

/// HTTP-facing error: a status code plus a stable machine-readable kind.
#[derive(Debug, Error)]
#[error("{kind}: {message}")]
pub struct AppError {
    status: StatusCode,
    kind: &'static str,
    message: String,
}

impl AppError {
    fn new(status: StatusCode, kind: &'static str, message: impl Into<String>) -> Self {
        Self {
            status,
            kind,
            message: message.into(),
        }
    }

    /// 401 for requests without a usable bearer token.
    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, "unauthorized", message)
    }

    /// HTTP status this error renders with.
    pub fn status(&self) -> StatusCode {
        self.status
    }

    /// Stable identifier clients can branch on.
    pub fn kind(&self) -> &'static str {
        self.kind
    }
}

impl From<ServiceError> for AppError {
    fn from(err: ServiceError) -> Self {
        let message = err.to_string();
        let (status, kind) = match &err {
            ServiceError::Unavailable(source) => {
                tracing::warn!(error = %source, "session store call failed");
                (StatusCode::SERVICE_UNAVAILABLE, "store_unavailable")
            }
            ServiceError::Degraded => (StatusCode::SERVICE_UNAVAILABLE, "degraded"),
            ServiceError::Unauthorized(_) => (StatusCode::UNAUTHORIZED, "unauthorized"),
            ServiceError::Forbidden(_) => (StatusCode::FORBIDDEN, "forbidden"),
            ServiceError::InvalidInput(_) => (StatusCode::BAD_REQUEST, "invalid_input"),
            ServiceError::InvalidState(_) => (StatusCode::CONFLICT, "invalid_state"),
            ServiceError::NotFound(_) => (StatusCode::NOT_FOUND, "not_found"),
            ServiceError::ContentExhausted { .. } => (StatusCode::CONFLICT, "content_exhausted"),
            ServiceError::MediaUnavailable { .. } => (StatusCode::CONFLICT, "media_unavailable"),
            ServiceError::Contention => (StatusCode::CONFLICT, "contention"),
            ServiceError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "internal"),
        };
        AppError::new(status, kind, message)
    }
}

#[derive(Serialize)]
struct ErrorBody<'a> {
    error: &'a str,
    message: &'a str,
}

impl IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        let body = Json(ErrorBody {
            error: self.kind,
            message: &self.message,
        });
        (self.status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recoverable_round_errors_are_conflicts_with_distinct_kinds() {
        let exhausted = AppError::from(ServiceError::ContentExhausted {
            category: "scifi".into(),
        });
        let media = AppError::from(ServiceError::MediaUnavailable { attempts: 5 });

        assert_eq!(exhausted.status(), StatusCode::CONFLICT);
        assert_eq!(exhausted.kind(), "content_exhausted");
        assert_eq!(media.status(), StatusCode::CONFLICT);
        assert_eq!(media.kind(), "media_unavailable");
    }

    #[test]
    fn degraded_mode_is_service_unavailable() {
        let err = AppError::from(ServiceError::Degraded);
        assert_eq!(err.status(), StatusCode::SERVICE_UNAVAILABLE);
    }
}
