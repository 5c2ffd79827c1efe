//! PostgreSQL implementation of [`ReservationStore`].
//!
//! All writes go through a revision-guarded UPDATE, so the claim protocol
//! holds across any number of concurrent control-layer replicas sharing one
//! database.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use sqlx::postgres::{PgPool, PgRow};
use sqlx::Row;

use super::{Claimable, ReservationStore, Revision};
use crate::error::{Error, Result};
use crate::reservation::{
    unlocked, AnyReservation, Course, Executed, Failed, Locked, Pending, Reservation,
    ReservationData, ReservationKey, ReservationRecord, SlotRequest, Status, PARTITION,
};

/// Embedded schema migrations for the reservations table.
pub fn migrator() -> sqlx::migrate::Migrator {
    sqlx::migrate!("./migrations")
}

pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

fn store_err(e: sqlx::Error) -> Error {
    Error::Store(anyhow::Error::new(e))
}

/// Mutable columns, extracted from whichever state the entity is in.
struct StateColumns {
    status: Status,
    locked_until: Option<DateTime<Utc>>,
    retry_count: i32,
    artifact_folder: Option<String>,
    last_error: Option<String>,
    claimed_at: Option<DateTime<Utc>>,
    executed_at: Option<DateTime<Utc>>,
    failed_at: Option<DateTime<Utc>>,
    booked_time: Option<NaiveTime>,
}

impl From<&AnyReservation> for StateColumns {
    fn from(reservation: &AnyReservation) -> Self {
        let artifact_folder = reservation
            .data()
            .artifact_folder
            .as_ref()
            .map(|f| f.as_str().to_string());
        match reservation {
            AnyReservation::Pending(r) => StateColumns {
                status: Status::Pending,
                locked_until: Some(r.state.locked_until),
                retry_count: r.state.retry_count as i32,
                artifact_folder,
                last_error: r.state.last_error.clone(),
                claimed_at: None,
                executed_at: None,
                failed_at: None,
                booked_time: None,
            },
            AnyReservation::Locked(r) => StateColumns {
                status: Status::Locked,
                locked_until: Some(r.state.locked_until),
                retry_count: r.state.retry_count as i32,
                artifact_folder,
                last_error: None,
                claimed_at: Some(r.state.claimed_at),
                executed_at: None,
                failed_at: None,
                booked_time: None,
            },
            AnyReservation::Executed(r) => StateColumns {
                status: Status::Executed,
                locked_until: None,
                retry_count: r.state.retry_count as i32,
                artifact_folder,
                last_error: None,
                claimed_at: None,
                executed_at: Some(r.state.executed_at),
                failed_at: None,
                booked_time: r.state.booked_time,
            },
            AnyReservation::Failed(r) => StateColumns {
                status: Status::Failed,
                locked_until: Some(r.state.locked_until),
                retry_count: r.state.retry_count as i32,
                artifact_folder,
                last_error: Some(r.state.error.clone()),
                claimed_at: None,
                executed_at: None,
                failed_at: Some(r.state.failed_at),
                booked_time: None,
            },
        }
    }
}

fn reservation_from_row(row: &PgRow) -> Result<(AnyReservation, Revision)> {
    let status: String = row.try_get("status").map_err(store_err)?;
    let status: Status = status.parse()?;

    let row_key: String = row.try_get("row_key").map_err(store_err)?;
    let slot_date: NaiveDate = row.try_get("slot_date").map_err(store_err)?;
    let slot_time: NaiveTime = row.try_get("slot_time").map_err(store_err)?;
    let time_window_minutes: i32 = row.try_get("time_window_minutes").map_err(store_err)?;
    let course: String = row.try_get("course").map_err(store_err)?;
    let activation_time: DateTime<Utc> = row.try_get("activation_time").map_err(store_err)?;
    let locked_until: Option<DateTime<Utc>> = row.try_get("locked_until").map_err(store_err)?;
    let retry_count: i32 = row.try_get("retry_count").map_err(store_err)?;
    let artifact_folder: Option<String> = row.try_get("artifact_folder").map_err(store_err)?;
    let last_error: Option<String> = row.try_get("last_error").map_err(store_err)?;
    let claimed_at: Option<DateTime<Utc>> = row.try_get("claimed_at").map_err(store_err)?;
    let executed_at: Option<DateTime<Utc>> = row.try_get("executed_at").map_err(store_err)?;
    let failed_at: Option<DateTime<Utc>> = row.try_get("failed_at").map_err(store_err)?;
    let booked_time: Option<NaiveTime> = row.try_get("booked_time").map_err(store_err)?;
    let created_at: DateTime<Utc> = row.try_get("created_at").map_err(store_err)?;
    let revision: i64 = row.try_get("revision").map_err(store_err)?;

    let data = ReservationData {
        key: ReservationKey::from_raw(row_key),
        slot: SlotRequest {
            date: slot_date,
            time: slot_time,
            time_window_minutes: time_window_minutes.max(0) as u32,
            course: Course::from(course.as_str()),
        },
        activation_time,
        artifact_folder: artifact_folder.map(crate::artifact::ArtifactFolder::from_raw),
        created_at,
    };

    let retry_count = retry_count.max(0) as u32;
    let reservation = match status {
        Status::Pending => AnyReservation::Pending(Reservation {
            data,
            state: Pending {
                retry_count,
                locked_until: locked_until.unwrap_or_else(unlocked),
                last_error,
            },
        }),
        Status::Locked => AnyReservation::Locked(Reservation {
            data,
            state: Locked {
                retry_count,
                locked_until: locked_until.unwrap_or_else(unlocked),
                claimed_at: claimed_at.unwrap_or(created_at),
            },
        }),
        Status::Executed => AnyReservation::Executed(Reservation {
            data,
            state: Executed {
                retry_count,
                executed_at: executed_at.unwrap_or(created_at),
                booked_time,
            },
        }),
        Status::Failed => AnyReservation::Failed(Reservation {
            data,
            state: Failed {
                retry_count,
                locked_until: locked_until.unwrap_or_else(unlocked),
                error: last_error.unwrap_or_default(),
                failed_at: failed_at.unwrap_or(created_at),
            },
        }),
    };

    Ok((reservation, Revision(revision)))
}

#[async_trait]
impl ReservationStore for PostgresStore {
    async fn create(&self, reservation: Reservation<Pending>) -> Result<Revision> {
        let key = reservation.key().clone();
        let data = &reservation.data;
        let state = &reservation.state;

        let inserted = sqlx::query(
            r#"
            INSERT INTO reservations
                (partition_key, row_key, slot_date, slot_time, time_window_minutes,
                 course, activation_time, status, locked_until, retry_count,
                 last_error, revision, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, 1, $12)
            ON CONFLICT (partition_key, row_key) DO NOTHING
            RETURNING revision
            "#,
        )
        .bind(PARTITION)
        .bind(key.as_str())
        .bind(data.slot.date)
        .bind(data.slot.time)
        .bind(data.slot.time_window_minutes as i32)
        .bind(data.slot.course.as_str())
        .bind(data.activation_time)
        .bind(Status::Pending.as_str())
        .bind(state.locked_until)
        .bind(state.retry_count as i32)
        .bind(state.last_error.as_deref())
        .bind(data.created_at)
        .fetch_optional(&self.pool)
        .await
        .map_err(store_err)?;

        match inserted {
            Some(row) => Ok(Revision(row.try_get("revision").map_err(store_err)?)),
            None => Err(Error::Conflict(key)),
        }
    }

    async fn get(&self, key: &ReservationKey) -> Result<Option<(AnyReservation, Revision)>> {
        let row = sqlx::query(
            "SELECT * FROM reservations WHERE partition_key = $1 AND row_key = $2",
        )
        .bind(PARTITION)
        .bind(key.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(store_err)?;

        row.as_ref().map(reservation_from_row).transpose()
    }

    async fn list(&self) -> Result<Vec<ReservationRecord>> {
        let rows = sqlx::query(
            "SELECT * FROM reservations WHERE partition_key = $1 ORDER BY slot_date, slot_time",
        )
        .bind(PARTITION)
        .fetch_all(&self.pool)
        .await
        .map_err(store_err)?;

        rows.iter()
            .map(|row| reservation_from_row(row).map(|(r, _)| r.record()))
            .collect()
    }

    async fn delete(&self, key: &ReservationKey) -> Result<()> {
        let result = sqlx::query(
            "DELETE FROM reservations WHERE partition_key = $1 AND row_key = $2",
        )
        .bind(PARTITION)
        .bind(key.as_str())
        .execute(&self.pool)
        .await
        .map_err(store_err)?;

        if result.rows_affected() == 0 {
            return Err(Error::NotFound(key.clone()));
        }
        Ok(())
    }

    async fn find_claimable(&self, now: DateTime<Utc>) -> Result<Option<Claimable>> {
        let row = sqlx::query(
            r#"
            SELECT * FROM reservations
            WHERE partition_key = $1
              AND status = 'pending'
              AND activation_time <= $2
              AND locked_until < $2
            ORDER BY activation_time, row_key
            LIMIT 1
            "#,
        )
        .bind(PARTITION)
        .bind(now)
        .fetch_optional(&self.pool)
        .await
        .map_err(store_err)?;

        let Some(row) = row else { return Ok(None) };
        let (reservation, revision) = reservation_from_row(&row)?;
        match reservation {
            AnyReservation::Pending(reservation) => Ok(Some(Claimable { reservation, revision })),
            other => Err(Error::Store(anyhow::anyhow!(
                "claimable query returned a {} entity for {}",
                other.status(),
                other.key()
            ))),
        }
    }

    async fn update(
        &self,
        key: &ReservationKey,
        expected: Revision,
        next: AnyReservation,
    ) -> Result<Revision> {
        let columns = StateColumns::from(&next);

        let updated = sqlx::query(
            r#"
            UPDATE reservations
            SET status = $1,
                locked_until = $2,
                retry_count = $3,
                artifact_folder = $4,
                last_error = $5,
                claimed_at = $6,
                executed_at = $7,
                failed_at = $8,
                booked_time = $9,
                revision = revision + 1
            WHERE partition_key = $10 AND row_key = $11 AND revision = $12
            RETURNING revision
            "#,
        )
        .bind(columns.status.as_str())
        .bind(columns.locked_until)
        .bind(columns.retry_count)
        .bind(columns.artifact_folder.as_deref())
        .bind(columns.last_error.as_deref())
        .bind(columns.claimed_at)
        .bind(columns.executed_at)
        .bind(columns.failed_at)
        .bind(columns.booked_time)
        .bind(PARTITION)
        .bind(key.as_str())
        .bind(expected.0)
        .fetch_optional(&self.pool)
        .await
        .map_err(store_err)?;

        if let Some(row) = updated {
            return Ok(Revision(row.try_get("revision").map_err(store_err)?));
        }

        // Disambiguate: gone entirely, or moved underneath us.
        let exists = sqlx::query(
            "SELECT 1 FROM reservations WHERE partition_key = $1 AND row_key = $2",
        )
        .bind(PARTITION)
        .bind(key.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(store_err)?;

        if exists.is_some() {
            Err(Error::RevisionConflict {
                key: key.clone(),
                expected,
            })
        } else {
            Err(Error::NotFound(key.clone()))
        }
    }
}
