use axum::{
    Json,
    extract::{Query, State},
};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::AppState;
use crate::errors::{Error, Result};
use crate::weather::DailyForecast;

#[derive(Debug, Deserialize)]
pub struct WeatherQuery {
    pub date: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct WeatherResponse {
    pub status: &'static str,
    pub forecast: DailyForecast,
}

// GET /weather?date=YYYY-MM-DD - forecast for the course location
pub async fn get_weather(
    State(state): State<AppState>,
    Query(query): Query<WeatherQuery>,
) -> Result<Json<WeatherResponse>> {
    let date = query
        .date
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| Error::BadRequest {
            message: "date query parameter is required".to_string(),
        })?;

    let date = NaiveDate::parse_from_str(date, "%Y-%m-%d").map_err(|_| Error::BadRequest {
        message: format!("unparseable date {date:?}, expected YYYY-MM-DD"),
    })?;

    let forecast = state.weather.daily_forecast(date).await?;
    Ok(Json(WeatherResponse {
        status: "success",
        forecast,
    }))
}
