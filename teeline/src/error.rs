//! Error types for the reservation engine.

use crate::reservation::ReservationKey;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    /// A reservation already exists for the requested (date, time) pair.
    #[error("a reservation already exists for {0}")]
    Conflict(ReservationKey),

    /// No reservation stored under the given key.
    #[error("no reservation found for {0}")]
    NotFound(ReservationKey),

    /// The entity changed between read and write. The caller lost the race
    /// and must re-read before acting again.
    #[error("reservation {key} was modified concurrently (expected revision {expected})")]
    RevisionConflict {
        key: ReservationKey,
        expected: crate::store::Revision,
    },

    /// Malformed request data (unparseable time, empty fields).
    #[error("invalid reservation request: {0}")]
    Invalid(String),

    /// Underlying store failure (connection loss, query error).
    #[error("store error: {0}")]
    Store(anyhow::Error),

    /// Artifact store failure. Attempts survive these; evidence may be lost.
    #[error("artifact store error: {0}")]
    Artifact(anyhow::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
