use chrono::{Duration, NaiveTime, Utc};

use crate::artifact::ArtifactFolder;
use crate::error::Result;
use crate::reservation::{Executed, Failed, Locked, Pending, Reservation};
use crate::store::{ReservationStore, Revision};

impl Reservation<Pending> {
    /// Claim this reservation for one attempt.
    ///
    /// Extends the lock to `now + lock_duration`, increments the retry
    /// count, and allocates the artifact folder if this is the first claim.
    /// The write is guarded by `revision`; a concurrent claimant wins the
    /// race by getting its write in first, and this call returns
    /// [`crate::Error::RevisionConflict`].
    pub async fn claim<S: ReservationStore + ?Sized>(
        self,
        revision: Revision,
        lock_duration: Duration,
        store: &S,
    ) -> Result<(Reservation<Locked>, Revision)> {
        let now = Utc::now();
        let retry_count = self.state.retry_count + 1;
        let locked_until = now + lock_duration;

        let mut data = self.data;
        if data.artifact_folder.is_none() {
            data.artifact_folder = Some(ArtifactFolder::for_reservation(&data.key));
        }

        let reservation = Reservation {
            data,
            state: Locked {
                retry_count,
                locked_until,
                claimed_at: now,
            },
        };

        let revision = store
            .update(reservation.key(), revision, reservation.clone().into())
            .await?;

        tracing::info!(
            key = %reservation.key(),
            retry_count,
            locked_until = %locked_until,
            "Claimed reservation"
        );

        Ok((reservation, revision))
    }
}

impl Reservation<Locked> {
    /// The booking went through. Terminal; clears the lock.
    pub async fn succeed<S: ReservationStore + ?Sized>(
        self,
        booked_time: Option<NaiveTime>,
        revision: Revision,
        store: &S,
    ) -> Result<(Reservation<Executed>, Revision)> {
        let reservation = Reservation {
            data: self.data,
            state: Executed {
                retry_count: self.state.retry_count,
                executed_at: Utc::now(),
                booked_time,
            },
        };

        let revision = store
            .update(reservation.key(), revision, reservation.clone().into())
            .await?;

        tracing::info!(key = %reservation.key(), "Reservation executed");

        Ok((reservation, revision))
    }

    /// Return the reservation to the claim pool after a retriable failure.
    ///
    /// The lock is deliberately left in place: the entity only becomes
    /// claimable again once the lock expires, which spaces attempts out.
    pub async fn requeue<S: ReservationStore + ?Sized>(
        self,
        error: String,
        revision: Revision,
        store: &S,
    ) -> Result<(Reservation<Pending>, Revision)> {
        let reservation = Reservation {
            data: self.data,
            state: Pending {
                retry_count: self.state.retry_count,
                locked_until: self.state.locked_until,
                last_error: Some(error),
            },
        };

        let revision = store
            .update(reservation.key(), revision, reservation.clone().into())
            .await?;

        tracing::warn!(
            key = %reservation.key(),
            retry_count = reservation.state.retry_count,
            "Attempt failed, reservation requeued"
        );

        Ok((reservation, revision))
    }

    /// Give up on this reservation. Terminal; the lock is left untouched.
    pub async fn fail<S: ReservationStore + ?Sized>(
        self,
        error: String,
        revision: Revision,
        store: &S,
    ) -> Result<(Reservation<Failed>, Revision)> {
        let reservation = Reservation {
            data: self.data,
            state: Failed {
                retry_count: self.state.retry_count,
                locked_until: self.state.locked_until,
                error,
                failed_at: Utc::now(),
            },
        };

        let revision = store
            .update(reservation.key(), revision, reservation.clone().into())
            .await?;

        tracing::error!(
            key = %reservation.key(),
            retry_count = reservation.state.retry_count,
            error = %reservation.state.error,
            "Reservation failed permanently"
        );

        Ok((reservation, revision))
    }
}
