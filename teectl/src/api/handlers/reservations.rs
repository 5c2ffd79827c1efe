use axum::{Json, extract::State, http::StatusCode};
use chrono::{NaiveDate, NaiveTime, Utc};

use teeline::activation::ActivationPolicy;
use teeline::reservation::{Course, Reservation, ReservationKey, SlotRequest, parse_clock_time};
use teeline::store::ReservationStore;

use crate::api::models::reservations::{
    CancelRequest, ListResponse, ReservationView, RunResponse, StatusMessage, SubmitRequest,
    SubmitResponse,
};
use crate::AppState;
use crate::errors::{Error, Result};

fn parse_slot_fields(date: Option<&str>, time: Option<&str>) -> Result<(NaiveDate, NaiveTime)> {
    let (Some(date), Some(time)) = (
        date.map(str::trim).filter(|s| !s.is_empty()),
        time.map(str::trim).filter(|s| !s.is_empty()),
    ) else {
        return Err(Error::BadRequest {
            message: "Date and time are required".to_string(),
        });
    };

    let date = NaiveDate::parse_from_str(date, "%Y-%m-%d").map_err(|_| Error::BadRequest {
        message: format!("unparseable date {date:?}, expected YYYY-MM-DD"),
    })?;
    let time = parse_clock_time(time)?;
    Ok((date, time))
}

// POST /submit - register a new booking request
pub async fn submit(
    State(state): State<AppState>,
    Json(request): Json<SubmitRequest>,
) -> Result<(StatusCode, Json<SubmitResponse>)> {
    let (date, time) = parse_slot_fields(request.date.as_deref(), request.time.as_deref())?;

    tracing::info!(%date, %time, "Received reservation request");

    let slot = SlotRequest {
        date,
        time,
        time_window_minutes: request.time_window_minutes.unwrap_or(0),
        course: Course::from(request.course),
    };

    let now = Utc::now();
    let activation_time = state.activation.activation_instant(now, date, time);
    let reservation = Reservation::submitted(slot, activation_time, now);
    let view = ReservationView::from(teeline::AnyReservation::from(reservation.clone()).record());

    state.store.create(reservation).await?;

    Ok((
        StatusCode::CREATED,
        Json(SubmitResponse {
            status: "success",
            message: "Reservation request received".to_string(),
            data: view,
        }),
    ))
}

// GET|POST /run-reservation - idempotent external trigger; drives at most
// one reservation through one attempt
pub async fn run_reservation(State(state): State<AppState>) -> Result<Json<RunResponse>> {
    let results = crate::run_and_notify(&state).await?;
    Ok(Json(RunResponse {
        status: "success",
        results,
    }))
}

// GET /get-reservations - everything in the partition, no pagination
pub async fn list_reservations(State(state): State<AppState>) -> Result<Json<ListResponse>> {
    let records = state.store.list().await?;
    Ok(Json(ListResponse {
        status: "success",
        reservations: records.into_iter().map(Into::into).collect(),
    }))
}

// POST /cancel-reservation - delete by (date, time), any status
pub async fn cancel_reservation(
    State(state): State<AppState>,
    Json(request): Json<CancelRequest>,
) -> Result<Json<StatusMessage>> {
    let (date, time) = parse_slot_fields(request.date.as_deref(), request.time.as_deref())?;
    let key = ReservationKey::derive(date, time);

    state.store.delete(&key).await?;
    tracing::info!(%key, "Reservation cancelled");

    Ok(Json(StatusMessage {
        status: "success",
        message: "Reservation deleted successfully".to_string(),
    }))
}
