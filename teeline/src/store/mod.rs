//! Persistence boundary for reservations.
//!
//! The store is the only shared mutable resource in the system: every bit
//! of cross-invocation coordination goes through it. Implementations must
//! provide create-if-absent semantics and a revision-guarded update; the
//! claim protocol's exclusivity rests on those two operations.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::reservation::{AnyReservation, Pending, Reservation, ReservationKey, ReservationRecord};

pub mod memory;
#[cfg(feature = "postgres")]
pub mod postgres;

/// Optimistic-concurrency token. Bumped by the store on every successful
/// write; an update carrying a stale revision is rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Revision(pub i64);

impl std::fmt::Display for Revision {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A pending reservation eligible for claiming, paired with the revision
/// the claim write must be conditioned on.
#[derive(Debug, Clone)]
pub struct Claimable {
    pub reservation: Reservation<Pending>,
    pub revision: Revision,
}

#[async_trait]
pub trait ReservationStore: Send + Sync {
    /// Insert a new reservation. Fails with [`crate::Error::Conflict`] if
    /// the key already exists; never overwrites.
    async fn create(&self, reservation: Reservation<Pending>) -> Result<Revision>;

    /// Fetch one reservation by key.
    async fn get(&self, key: &ReservationKey) -> Result<Option<(AnyReservation, Revision)>>;

    /// All reservations in the partition, as flat records.
    async fn list(&self) -> Result<Vec<ReservationRecord>>;

    /// Remove a reservation at any status. [`crate::Error::NotFound`] if absent.
    async fn delete(&self, key: &ReservationKey) -> Result<()>;

    /// At most one entity with `status = pending`, `activation_time <= now`
    /// and `locked_until < now`. Selection among several eligible entities
    /// is arbitrary; every invocation is independent.
    async fn find_claimable(&self, now: DateTime<Utc>) -> Result<Option<Claimable>>;

    /// Replace the stored entity, conditioned on `expected` matching the
    /// current revision. Returns the new revision on success and
    /// [`crate::Error::RevisionConflict`] when the entity moved underneath
    /// the caller.
    async fn update(
        &self,
        key: &ReservationKey,
        expected: Revision,
        next: AnyReservation,
    ) -> Result<Revision>;
}
