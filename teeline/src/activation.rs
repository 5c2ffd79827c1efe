//! Activation-time policy: when does the booking window for a requested
//! date open?
//!
//! The club publishes slots a few days ahead of play, with the lead time
//! depending on the day of the week, and the window opening at a fixed
//! local time-of-day. That rule belongs to whoever owns the club
//! relationship, not to the engine, so it is a trait with the observed
//! variants as implementations and the choice left to configuration.

use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Utc};
use chrono_tz::Tz;

/// Maps a requested (date, time) to the UTC instant before which the
/// reservation must not be attempted.
pub trait ActivationPolicy: Send + Sync {
    fn activation_instant(&self, now: DateTime<Utc>, date: NaiveDate, time: NaiveTime) -> DateTime<Utc>;
}

/// Resolve a club-local wall-clock time to an instant, tolerating DST
/// ambiguity (fall-back picks the earlier offset) and gaps (spring-forward
/// shifts an hour later).
fn localize(tz: Tz, naive: NaiveDateTime) -> DateTime<Utc> {
    if let Some(dt) = tz.from_local_datetime(&naive).earliest() {
        return dt.with_timezone(&Utc);
    }
    if let Some(dt) = tz.from_local_datetime(&(naive + Duration::hours(1))).earliest() {
        return dt.with_timezone(&Utc);
    }
    Utc.from_utc_datetime(&naive)
}

/// Production rule: the window for a given play date opens a
/// weekday-dependent number of days earlier, at a fixed local time.
#[derive(Debug, Clone)]
pub struct WeekdayLeadTime {
    /// Days of advance notice, indexed by the play date's weekday
    /// (Monday = 0 .. Sunday = 6).
    pub lead_days: [u32; 7],
    /// Local time-of-day at which the window opens.
    pub window_open: NaiveTime,
    pub timezone: Tz,
}

impl Default for WeekdayLeadTime {
    fn default() -> Self {
        Self {
            // Mon Tue Wed Thu Fri Sat Sun
            lead_days: [3, 4, 5, 6, 3, 3, 3],
            window_open: NaiveTime::from_hms_opt(7, 30, 0).expect("valid window-open time"),
            timezone: chrono_tz::America::New_York,
        }
    }
}

impl ActivationPolicy for WeekdayLeadTime {
    fn activation_instant(&self, _now: DateTime<Utc>, date: NaiveDate, _time: NaiveTime) -> DateTime<Utc> {
        let lead = self.lead_days[date.weekday().num_days_from_monday() as usize];
        let open_date = date - Duration::days(lead as i64);
        localize(self.timezone, open_date.and_time(self.window_open))
    }
}

/// Rehearsal rule: activate a fixed delay from submission, whatever the
/// requested date. Useful for dry runs against the live flow without
/// waiting days for a window to open.
#[derive(Debug, Clone, Copy)]
pub struct FixedDelay {
    pub delay: Duration,
}

impl ActivationPolicy for FixedDelay {
    fn activation_instant(&self, now: DateTime<Utc>, _date: NaiveDate, _time: NaiveTime) -> DateTime<Utc> {
        now + self.delay
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn ten_am() -> NaiveTime {
        NaiveTime::from_hms_opt(10, 0, 0).unwrap()
    }

    #[test]
    fn saturday_play_opens_three_days_ahead() {
        let policy = WeekdayLeadTime::default();
        // 2025-06-07 is a Saturday; EDT is UTC-4.
        let activation = policy.activation_instant(Utc::now(), at(2025, 6, 7), ten_am());
        assert_eq!(activation.to_rfc3339(), "2025-06-04T11:30:00+00:00");
    }

    #[test]
    fn thursday_play_opens_six_days_ahead() {
        let policy = WeekdayLeadTime::default();
        let activation = policy.activation_instant(Utc::now(), at(2025, 6, 5), ten_am());
        assert_eq!(activation.to_rfc3339(), "2025-05-30T11:30:00+00:00");
    }

    #[test]
    fn window_open_respects_standard_time_before_dst() {
        let policy = WeekdayLeadTime::default();
        // 2025-03-12 is a Wednesday; its window opens 2025-03-07, still EST.
        let activation = policy.activation_instant(Utc::now(), at(2025, 3, 12), ten_am());
        assert_eq!(activation.to_rfc3339(), "2025-03-07T12:30:00+00:00");

        // 2025-03-14 is a Friday; its window opens 2025-03-11, after the
        // spring-forward on 2025-03-09.
        let activation = policy.activation_instant(Utc::now(), at(2025, 3, 14), ten_am());
        assert_eq!(activation.to_rfc3339(), "2025-03-11T11:30:00+00:00");
    }

    #[test]
    fn fixed_delay_counts_from_submission() {
        let policy = FixedDelay {
            delay: Duration::minutes(2),
        };
        let now = Utc::now();
        assert_eq!(
            policy.activation_instant(now, at(2025, 6, 7), ten_am()),
            now + Duration::minutes(2)
        );
    }
}
