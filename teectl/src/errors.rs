use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error as ThisError;

#[derive(ThisError, Debug)]
pub enum Error {
    /// Invalid request data or missing required fields
    #[error("{message}")]
    BadRequest { message: String },

    /// Requested resource not found
    #[error("{resource} {id} not found")]
    NotFound { resource: String, id: String },

    /// Generic internal service error
    #[error("failed to {operation}")]
    Internal { operation: String },

    /// Reservation engine error (conflicts, store failures, ...)
    #[error(transparent)]
    Engine(#[from] teeline::Error),

    /// Unexpected error with full context chain
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl Error {
    pub fn status_code(&self) -> StatusCode {
        match self {
            Error::BadRequest { .. } => StatusCode::BAD_REQUEST,
            Error::NotFound { .. } => StatusCode::NOT_FOUND,
            Error::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            Error::Engine(engine) => match engine {
                teeline::Error::Conflict(_) => StatusCode::CONFLICT,
                teeline::Error::NotFound(_) => StatusCode::NOT_FOUND,
                teeline::Error::Invalid(_) => StatusCode::BAD_REQUEST,
                teeline::Error::RevisionConflict { .. } => StatusCode::CONFLICT,
                teeline::Error::Store(_) | teeline::Error::Artifact(_) | teeline::Error::Other(_) => {
                    StatusCode::INTERNAL_SERVER_ERROR
                }
            },
            Error::Other(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// A user-safe message that does not leak internals.
    pub fn user_message(&self) -> String {
        match self {
            Error::BadRequest { message } => message.clone(),
            Error::NotFound { resource, id } => format!("{resource} {id} not found"),
            Error::Internal { .. } => "Internal server error".to_string(),
            Error::Engine(engine) => match engine {
                teeline::Error::Conflict(key) => {
                    format!("A reservation already exists for {key}")
                }
                teeline::Error::NotFound(key) => format!("No reservation found for {key}"),
                teeline::Error::Invalid(message) => message.clone(),
                teeline::Error::RevisionConflict { key, .. } => {
                    format!("Reservation {key} was modified concurrently, please retry")
                }
                teeline::Error::Store(_) | teeline::Error::Artifact(_) | teeline::Error::Other(_) => {
                    "Internal server error".to_string()
                }
            },
            Error::Other(_) => "Internal server error".to_string(),
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        // Full detail to the logs, tiered by severity; sanitized message out.
        match &self {
            Error::Internal { .. } | Error::Other(_) => {
                tracing::error!("Internal service error: {:#}", self);
            }
            Error::Engine(teeline::Error::Store(_))
            | Error::Engine(teeline::Error::Artifact(_))
            | Error::Engine(teeline::Error::Other(_)) => {
                tracing::error!("Engine error: {:#}", self);
            }
            Error::Engine(teeline::Error::Conflict(_))
            | Error::Engine(teeline::Error::RevisionConflict { .. }) => {
                tracing::warn!("Conflict: {}", self);
            }
            Error::BadRequest { .. }
            | Error::NotFound { .. }
            | Error::Engine(teeline::Error::NotFound(_))
            | Error::Engine(teeline::Error::Invalid(_)) => {
                tracing::debug!("Client error: {}", self);
            }
        }

        let body = json!({
            "status": "error",
            "message": self.user_message(),
        });

        (self.status_code(), axum::response::Json(body)).into_response()
    }
}

/// Type alias for service operation results
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;
    use teeline::ReservationKey;

    #[test]
    fn duplicate_submission_maps_to_conflict() {
        let key = ReservationKey::from_raw("2025-06-01_10:00");
        let error = Error::from(teeline::Error::Conflict(key));
        assert_eq!(error.status_code(), StatusCode::CONFLICT);
        assert!(error.user_message().contains("already exists"));
    }

    #[test]
    fn internal_errors_do_not_leak_detail() {
        let error = Error::Other(anyhow::anyhow!("connection refused: 10.0.0.3:5432"));
        assert_eq!(error.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(error.user_message(), "Internal server error");
    }
}
