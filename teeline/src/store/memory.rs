//! In-memory store, used by tests and single-process development runs.
//!
//! Revision checks happen under the per-entry map lock, so concurrent
//! claimants observe the same linearized outcomes a database would give.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

use super::{Claimable, ReservationStore, Revision};
use crate::error::{Error, Result};
use crate::reservation::{AnyReservation, Pending, Reservation, ReservationKey, ReservationRecord};

#[derive(Debug, Clone)]
struct StoredRow {
    revision: Revision,
    reservation: AnyReservation,
}

#[derive(Default)]
pub struct MemoryStore {
    rows: DashMap<ReservationKey, StoredRow>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ReservationStore for MemoryStore {
    async fn create(&self, reservation: Reservation<Pending>) -> Result<Revision> {
        let key = reservation.key().clone();
        match self.rows.entry(key.clone()) {
            Entry::Occupied(_) => Err(Error::Conflict(key)),
            Entry::Vacant(slot) => {
                let revision = Revision(1);
                slot.insert(StoredRow {
                    revision,
                    reservation: reservation.into(),
                });
                Ok(revision)
            }
        }
    }

    async fn get(&self, key: &ReservationKey) -> Result<Option<(AnyReservation, Revision)>> {
        Ok(self
            .rows
            .get(key)
            .map(|row| (row.reservation.clone(), row.revision)))
    }

    async fn list(&self) -> Result<Vec<ReservationRecord>> {
        let mut records: Vec<ReservationRecord> = self
            .rows
            .iter()
            .map(|row| row.reservation.record())
            .collect();
        records.sort_by(|a, b| (a.date, a.time).cmp(&(b.date, b.time)));
        Ok(records)
    }

    async fn delete(&self, key: &ReservationKey) -> Result<()> {
        self.rows
            .remove(key)
            .map(|_| ())
            .ok_or_else(|| Error::NotFound(key.clone()))
    }

    async fn find_claimable(&self, now: DateTime<Utc>) -> Result<Option<Claimable>> {
        let mut eligible: Option<Claimable> = None;
        for row in self.rows.iter() {
            if let AnyReservation::Pending(reservation) = &row.reservation {
                if reservation.data.activation_time > now || reservation.state.locked_until >= now {
                    continue;
                }
                // Lowest key wins, purely for deterministic tests; callers
                // may not rely on any ordering.
                let candidate_is_earlier = eligible
                    .as_ref()
                    .map(|current| reservation.key() < current.reservation.key())
                    .unwrap_or(true);
                if candidate_is_earlier {
                    eligible = Some(Claimable {
                        reservation: reservation.clone(),
                        revision: row.revision,
                    });
                }
            }
        }
        Ok(eligible)
    }

    async fn update(
        &self,
        key: &ReservationKey,
        expected: Revision,
        next: AnyReservation,
    ) -> Result<Revision> {
        match self.rows.get_mut(key) {
            None => Err(Error::NotFound(key.clone())),
            Some(mut row) => {
                if row.revision != expected {
                    return Err(Error::RevisionConflict {
                        key: key.clone(),
                        expected,
                    });
                }
                let revision = Revision(row.revision.0 + 1);
                row.revision = revision;
                row.reservation = next;
                Ok(revision)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reservation::{Course, SlotRequest};
    use chrono::{Duration, NaiveDate, NaiveTime};

    fn slot(day: u32, hour: u32) -> SlotRequest {
        SlotRequest {
            date: NaiveDate::from_ymd_opt(2025, 6, day).unwrap(),
            time: NaiveTime::from_hms_opt(hour, 0, 0).unwrap(),
            time_window_minutes: 0,
            course: Course::Any,
        }
    }

    #[tokio::test]
    async fn create_rejects_duplicate_keys() {
        let store = MemoryStore::new();
        let now = Utc::now();
        store
            .create(Reservation::submitted(slot(1, 10), now, now))
            .await
            .unwrap();
        let err = store
            .create(Reservation::submitted(slot(1, 10), now, now))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Conflict(_)));
    }

    #[tokio::test]
    async fn find_claimable_honors_activation_and_lock() {
        let store = MemoryStore::new();
        let now = Utc::now();

        // Not yet activated.
        store
            .create(Reservation::submitted(slot(1, 10), now + Duration::hours(1), now))
            .await
            .unwrap();
        assert!(store.find_claimable(now).await.unwrap().is_none());

        // Activated and unlocked.
        store
            .create(Reservation::submitted(slot(2, 10), now - Duration::minutes(1), now))
            .await
            .unwrap();
        let claimable = store.find_claimable(now).await.unwrap().unwrap();
        assert_eq!(
            claimable.reservation.data.slot.date,
            NaiveDate::from_ymd_opt(2025, 6, 2).unwrap()
        );
    }

    #[tokio::test]
    async fn stale_revision_updates_are_rejected() {
        let store = MemoryStore::new();
        let now = Utc::now();
        let reservation = Reservation::submitted(slot(3, 9), now, now);
        let revision = store.create(reservation.clone()).await.unwrap();

        let fresh = store
            .update(reservation.key(), revision, reservation.clone().into())
            .await
            .unwrap();
        assert!(fresh > revision);

        let err = store
            .update(reservation.key(), revision, reservation.clone().into())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::RevisionConflict { .. }));
    }

    #[tokio::test]
    async fn delete_then_resubmit_succeeds() {
        let store = MemoryStore::new();
        let now = Utc::now();
        let reservation = Reservation::submitted(slot(4, 8), now, now);
        let key = reservation.key().clone();
        store.create(reservation.clone()).await.unwrap();
        store.delete(&key).await.unwrap();
        assert!(matches!(
            store.delete(&key).await.unwrap_err(),
            Error::NotFound(_)
        ));
        store.create(reservation).await.unwrap();
    }
}
