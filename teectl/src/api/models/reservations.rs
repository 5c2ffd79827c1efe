use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use teeline::{ReservationRecord, RunReport, Status};

#[derive(Debug, Deserialize)]
pub struct SubmitRequest {
    pub date: Option<String>,
    pub time: Option<String>,
    pub time_window_minutes: Option<u32>,
    pub course: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct SubmitResponse {
    pub status: &'static str,
    pub message: String,
    pub data: ReservationView,
}

/// One reservation as shown to the frontend.
#[derive(Debug, Serialize)]
pub struct ReservationView {
    pub date: NaiveDate,
    pub time: String,
    pub course: String,
    pub status: Status,
    pub retry_count: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub artifact_folder: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub booked_time: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub activation_time: DateTime<Utc>,
}

impl From<ReservationRecord> for ReservationView {
    fn from(record: ReservationRecord) -> Self {
        Self {
            date: record.date,
            time: record.time.format("%H:%M").to_string(),
            course: record.course.to_string(),
            status: record.status,
            retry_count: record.retry_count,
            artifact_folder: record.artifact_folder.map(|f| f.as_str().to_string()),
            booked_time: record.booked_time.map(|t| t.format("%H:%M").to_string()),
            error: record.last_error,
            activation_time: record.activation_time,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct RunResponse {
    pub status: &'static str,
    pub results: Vec<RunReport>,
}

#[derive(Debug, Serialize)]
pub struct ListResponse {
    pub status: &'static str,
    pub reservations: Vec<ReservationView>,
}

#[derive(Debug, Deserialize)]
pub struct CancelRequest {
    pub date: Option<String>,
    pub time: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct StatusMessage {
    pub status: &'static str,
    pub message: String,
}
