//! Reservation entity types.
//!
//! A reservation is one request to book a specific tee time on a future
//! date. Its processing state is expressed as a typestate parameter on
//! [`Reservation`], so invalid transitions (claiming an executed entity,
//! re-locking a failed one) are unrepresentable. The store persists the
//! flattened form, [`AnyReservation`].
//!
//! See transitions/ for the state-transition methods, since they have their
//! logic tightly coupled to the store.

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};

use crate::artifact::ArtifactFolder;
use crate::error::{Error, Result};

pub mod transitions;

/// Partition key shared by every reservation. A namespace, not an identity.
pub const PARTITION: &str = "reservations";

/// Unique identifier for a reservation, derived from its (date, time) pair.
///
/// Derivation is deterministic, so a second submission for the same pair
/// collides on create instead of silently overwriting.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ReservationKey(String);

impl ReservationKey {
    pub fn derive(date: NaiveDate, time: NaiveTime) -> Self {
        ReservationKey(format!("{}_{}", date.format("%Y-%m-%d"), time.format("%H:%M")))
    }

    /// Rehydrate a key the store previously persisted. Store adapters only;
    /// everything else derives keys from the slot.
    pub fn from_raw(raw: impl Into<String>) -> Self {
        ReservationKey(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::ops::Deref for ReservationKey {
    type Target = str;
    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl std::fmt::Display for ReservationKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Which course the booking is for. The scheduling site offers several;
/// `Any` lets the agent take whichever has a matching slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Course {
    Any,
    Named(String),
}

impl Course {
    pub fn as_str(&self) -> &str {
        match self {
            Course::Any => "any",
            Course::Named(name) => name,
        }
    }
}

impl From<&str> for Course {
    fn from(s: &str) -> Self {
        let trimmed = s.trim();
        if trimmed.is_empty() || trimmed.eq_ignore_ascii_case("any") {
            Course::Any
        } else {
            Course::Named(trimmed.to_string())
        }
    }
}

impl From<Option<String>> for Course {
    fn from(s: Option<String>) -> Self {
        match s {
            Some(s) => Course::from(s.as_str()),
            None => Course::Any,
        }
    }
}

impl std::fmt::Display for Course {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for Course {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for Course {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Ok(Course::from(s.as_str()))
    }
}

/// Parse a user-supplied clock time. Accepts "10:00 AM" and "10:00".
pub fn parse_clock_time(input: &str) -> Result<NaiveTime> {
    let trimmed = input.trim();
    NaiveTime::parse_from_str(&trimmed.to_ascii_uppercase(), "%I:%M %p")
        .or_else(|_| NaiveTime::parse_from_str(trimmed, "%H:%M"))
        .map_err(|_| Error::Invalid(format!("unparseable time {trimmed:?}")))
}

/// The slot the user asked for, handed verbatim to the automation agent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlotRequest {
    pub date: NaiveDate,
    pub time: NaiveTime,
    /// Minutes past `time` in which an alternate slot is acceptable.
    /// Zero means exact time only.
    pub time_window_minutes: u32,
    pub course: Course,
}

/// Processing state of a reservation, as persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Pending,
    Locked,
    Executed,
    Failed,
}

impl Status {
    pub fn as_str(&self) -> &'static str {
        match self {
            Status::Pending => "pending",
            Status::Locked => "locked",
            Status::Executed => "executed",
            Status::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Status::Executed | Status::Failed)
    }
}

impl std::str::FromStr for Status {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "pending" => Ok(Status::Pending),
            "locked" => Ok(Status::Locked),
            "executed" => Ok(Status::Executed),
            "failed" => Ok(Status::Failed),
            other => Err(Error::Invalid(format!("unknown status {other:?}"))),
        }
    }
}

impl std::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lock sentinel for freshly created entities: already in the past, so the
/// entity is claimable the moment its activation time arrives.
pub fn unlocked() -> DateTime<Utc> {
    DateTime::UNIX_EPOCH
}

/// Fields shared by every state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReservationData {
    pub key: ReservationKey,
    pub slot: SlotRequest,
    /// Instant before which this reservation must not be attempted.
    pub activation_time: DateTime<Utc>,
    /// Evidence folder, allocated on first claim and never recomputed.
    pub artifact_folder: Option<ArtifactFolder>,
    pub created_at: DateTime<Utc>,
}

/// Waiting for activation, or for its lock to expire between attempts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pending {
    pub retry_count: u32,
    /// Unclaimable while this is in the future. Left at its pre-failure
    /// value after a retriable failure, which throttles re-attempts.
    pub locked_until: DateTime<Utc>,
    pub last_error: Option<String>,
}

/// Claimed by a runner; an attempt is (or was) in flight.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Locked {
    pub retry_count: u32,
    pub locked_until: DateTime<Utc>,
    pub claimed_at: DateTime<Utc>,
}

/// Terminal: the booking went through.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Executed {
    pub retry_count: u32,
    pub executed_at: DateTime<Utc>,
    /// The slot actually booked; may differ from the requested time when
    /// the agent settled for an alternate inside the window.
    pub booked_time: Option<NaiveTime>,
}

/// Terminal: out of budget, or the failure was not worth retrying.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Failed {
    pub retry_count: u32,
    /// Kept from the last claim so the entity stays cool even if something
    /// re-reads it; terminal states are never claimable regardless.
    pub locked_until: DateTime<Utc>,
    pub error: String,
    pub failed_at: DateTime<Utc>,
}

/// Marker trait for reservation states.
pub trait ReservationState: Send + Sync + Clone + std::fmt::Debug {
    fn status(&self) -> Status;
    fn retry_count(&self) -> u32;
    fn locked_until(&self) -> Option<DateTime<Utc>>;
}

impl ReservationState for Pending {
    fn status(&self) -> Status {
        Status::Pending
    }
    fn retry_count(&self) -> u32 {
        self.retry_count
    }
    fn locked_until(&self) -> Option<DateTime<Utc>> {
        Some(self.locked_until)
    }
}

impl ReservationState for Locked {
    fn status(&self) -> Status {
        Status::Locked
    }
    fn retry_count(&self) -> u32 {
        self.retry_count
    }
    fn locked_until(&self) -> Option<DateTime<Utc>> {
        Some(self.locked_until)
    }
}

impl ReservationState for Executed {
    fn status(&self) -> Status {
        Status::Executed
    }
    fn retry_count(&self) -> u32 {
        self.retry_count
    }
    fn locked_until(&self) -> Option<DateTime<Utc>> {
        None
    }
}

impl ReservationState for Failed {
    fn status(&self) -> Status {
        Status::Failed
    }
    fn retry_count(&self) -> u32 {
        self.retry_count
    }
    fn locked_until(&self) -> Option<DateTime<Utc>> {
        Some(self.locked_until)
    }
}

/// One reservation in a known state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reservation<S: ReservationState> {
    pub data: ReservationData,
    pub state: S,
}

impl Reservation<Pending> {
    /// Build a freshly submitted reservation: pending, zero retries,
    /// immediately claimable once its activation time arrives.
    pub fn submitted(slot: SlotRequest, activation_time: DateTime<Utc>, now: DateTime<Utc>) -> Self {
        let key = ReservationKey::derive(slot.date, slot.time);
        Reservation {
            data: ReservationData {
                key,
                slot,
                activation_time,
                artifact_folder: None,
                created_at: now,
            },
            state: Pending {
                retry_count: 0,
                locked_until: unlocked(),
                last_error: None,
            },
        }
    }
}

impl<S: ReservationState> Reservation<S> {
    pub fn key(&self) -> &ReservationKey {
        &self.data.key
    }
}

/// A reservation in whichever state the store last saw it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AnyReservation {
    Pending(Reservation<Pending>),
    Locked(Reservation<Locked>),
    Executed(Reservation<Executed>),
    Failed(Reservation<Failed>),
}

impl AnyReservation {
    pub fn data(&self) -> &ReservationData {
        match self {
            AnyReservation::Pending(r) => &r.data,
            AnyReservation::Locked(r) => &r.data,
            AnyReservation::Executed(r) => &r.data,
            AnyReservation::Failed(r) => &r.data,
        }
    }

    pub fn key(&self) -> &ReservationKey {
        &self.data().key
    }

    pub fn status(&self) -> Status {
        match self {
            AnyReservation::Pending(_) => Status::Pending,
            AnyReservation::Locked(_) => Status::Locked,
            AnyReservation::Executed(_) => Status::Executed,
            AnyReservation::Failed(_) => Status::Failed,
        }
    }

    pub fn retry_count(&self) -> u32 {
        match self {
            AnyReservation::Pending(r) => r.state.retry_count,
            AnyReservation::Locked(r) => r.state.retry_count,
            AnyReservation::Executed(r) => r.state.retry_count,
            AnyReservation::Failed(r) => r.state.retry_count,
        }
    }

    pub fn locked_until(&self) -> Option<DateTime<Utc>> {
        match self {
            AnyReservation::Pending(r) => r.state.locked_until(),
            AnyReservation::Locked(r) => r.state.locked_until(),
            AnyReservation::Executed(r) => r.state.locked_until(),
            AnyReservation::Failed(r) => r.state.locked_until(),
        }
    }

    pub fn last_error(&self) -> Option<&str> {
        match self {
            AnyReservation::Pending(r) => r.state.last_error.as_deref(),
            AnyReservation::Failed(r) => Some(&r.state.error),
            _ => None,
        }
    }

    /// Flat summary for listings and run reports.
    pub fn record(&self) -> ReservationRecord {
        let data = self.data();
        let booked_time = match self {
            AnyReservation::Executed(r) => r.state.booked_time,
            _ => None,
        };
        ReservationRecord {
            key: data.key.clone(),
            date: data.slot.date,
            time: data.slot.time,
            course: data.slot.course.clone(),
            status: self.status(),
            retry_count: self.retry_count(),
            activation_time: data.activation_time,
            locked_until: self.locked_until(),
            artifact_folder: data.artifact_folder.clone(),
            last_error: self.last_error().map(str::to_string),
            booked_time,
            created_at: data.created_at,
        }
    }
}

impl From<Reservation<Pending>> for AnyReservation {
    fn from(r: Reservation<Pending>) -> Self {
        AnyReservation::Pending(r)
    }
}

impl From<Reservation<Locked>> for AnyReservation {
    fn from(r: Reservation<Locked>) -> Self {
        AnyReservation::Locked(r)
    }
}

impl From<Reservation<Executed>> for AnyReservation {
    fn from(r: Reservation<Executed>) -> Self {
        AnyReservation::Executed(r)
    }
}

impl From<Reservation<Failed>> for AnyReservation {
    fn from(r: Reservation<Failed>) -> Self {
        AnyReservation::Failed(r)
    }
}

/// Flattened view of one reservation, as returned by list queries.
#[derive(Debug, Clone, Serialize)]
pub struct ReservationRecord {
    pub key: ReservationKey,
    pub date: NaiveDate,
    pub time: NaiveTime,
    pub course: Course,
    pub status: Status,
    pub retry_count: u32,
    pub activation_time: DateTime<Utc>,
    pub locked_until: Option<DateTime<Utc>>,
    pub artifact_folder: Option<ArtifactFolder>,
    pub last_error: Option<String>,
    /// Slot actually secured, once executed.
    pub booked_time: Option<NaiveTime>,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_is_deterministic_for_a_slot() {
        let date = NaiveDate::from_ymd_opt(2025, 6, 1).unwrap();
        let time = parse_clock_time("10:00 AM").unwrap();
        let a = ReservationKey::derive(date, time);
        let b = ReservationKey::derive(date, parse_clock_time("10:00").unwrap());
        assert_eq!(a, b);
        assert_eq!(a.as_str(), "2025-06-01_10:00");
    }

    #[test]
    fn clock_time_accepts_both_notations() {
        assert_eq!(
            parse_clock_time("2:30 PM").unwrap(),
            NaiveTime::from_hms_opt(14, 30, 0).unwrap()
        );
        assert_eq!(
            parse_clock_time("2:30 pm").unwrap(),
            NaiveTime::from_hms_opt(14, 30, 0).unwrap()
        );
        assert_eq!(
            parse_clock_time("14:30").unwrap(),
            NaiveTime::from_hms_opt(14, 30, 0).unwrap()
        );
        assert!(parse_clock_time("half past two").is_err());
    }

    #[test]
    fn course_sentinel_round_trips() {
        assert_eq!(Course::from("any"), Course::Any);
        assert_eq!(Course::from(""), Course::Any);
        assert_eq!(Course::from("North"), Course::Named("North".into()));
        let json = serde_json::to_string(&Course::Any).unwrap();
        assert_eq!(json, "\"any\"");
        let parsed: Course = serde_json::from_str("\"North\"").unwrap();
        assert_eq!(parsed, Course::Named("North".into()));
    }

    #[test]
    fn submitted_reservation_is_immediately_claimable_once_active() {
        let now = Utc::now();
        let slot = SlotRequest {
            date: NaiveDate::from_ymd_opt(2025, 6, 1).unwrap(),
            time: NaiveTime::from_hms_opt(10, 0, 0).unwrap(),
            time_window_minutes: 30,
            course: Course::Any,
        };
        let r = Reservation::submitted(slot, now, now);
        assert_eq!(r.state.retry_count, 0);
        assert!(r.state.locked_until < now);
        assert!(r.data.artifact_folder.is_none());
    }
}
