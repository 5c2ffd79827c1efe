//! Daily forecast lookup for the course location, via Open-Meteo's free
//! 16-day endpoint.

use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::config::WeatherConfig;
use crate::errors::{Error, Result};

#[derive(Debug, Clone, Serialize)]
pub struct DailyForecast {
    pub date: NaiveDate,
    pub temp_min: f64,
    pub temp_max: f64,
    pub weathercode: i32,
    pub description: &'static str,
}

pub struct WeatherService {
    client: reqwest::Client,
    config: WeatherConfig,
}

#[derive(Debug, Deserialize)]
struct ForecastResponse {
    daily: DailySeries,
}

#[derive(Debug, Deserialize)]
struct DailySeries {
    time: Vec<NaiveDate>,
    temperature_2m_min: Vec<f64>,
    temperature_2m_max: Vec<f64>,
    weathercode: Vec<i32>,
}

impl WeatherService {
    pub fn new(config: WeatherConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            config,
        }
    }

    pub async fn daily_forecast(&self, date: NaiveDate) -> Result<DailyForecast> {
        let today = Utc::now().with_timezone(&self.config.timezone).date_naive();
        let days_ahead = (date - today).num_days();

        if days_ahead < 0 {
            return Err(Error::BadRequest {
                message: "Cannot show past dates, please select today or later.".to_string(),
            });
        }
        if days_ahead >= 16 {
            return Err(Error::BadRequest {
                message: "Sorry, forecast is only available for dates within the next two weeks."
                    .to_string(),
            });
        }

        let response = self
            .client
            .get(&self.config.base_url)
            .query(&[
                ("latitude", self.config.latitude.to_string()),
                ("longitude", self.config.longitude.to_string()),
                (
                    "daily",
                    "temperature_2m_min,temperature_2m_max,weathercode".to_string(),
                ),
                ("forecast_days", "16".to_string()),
                ("timezone", self.config.timezone.name().to_string()),
            ])
            .send()
            .await
            .map_err(|e| Error::Internal {
                operation: format!("fetch forecast: {e}"),
            })?
            .error_for_status()
            .map_err(|e| Error::Internal {
                operation: format!("fetch forecast: {e}"),
            })?
            .json::<ForecastResponse>()
            .await
            .map_err(|e| Error::Internal {
                operation: format!("parse forecast response: {e}"),
            })?;

        let daily = &response.daily;
        let idx = daily
            .time
            .iter()
            .position(|d| *d == date)
            .ok_or_else(|| Error::Internal {
                operation: format!("forecast response missing {date}"),
            })?;

        let weathercode = daily.weathercode.get(idx).copied().unwrap_or(-1);

        Ok(DailyForecast {
            date,
            temp_min: daily.temperature_2m_min.get(idx).copied().unwrap_or(f64::NAN),
            temp_max: daily.temperature_2m_max.get(idx).copied().unwrap_or(f64::NAN),
            weathercode,
            description: describe_weathercode(weathercode),
        })
    }
}

/// WMO weather interpretation codes, as published by Open-Meteo.
fn describe_weathercode(code: i32) -> &'static str {
    match code {
        0 => "Clear sky",
        1 => "Mainly clear",
        2 => "Partly cloudy",
        3 => "Overcast",
        45 => "Fog",
        48 => "Depositing rime fog",
        51 => "Light drizzle",
        53 => "Moderate drizzle",
        55 => "Dense drizzle",
        56 => "Light freezing drizzle",
        57 => "Dense freezing drizzle",
        61 => "Light rain",
        63 => "Moderate rain",
        65 => "Heavy rain",
        66 => "Light freezing rain",
        67 => "Heavy freezing rain",
        71 => "Slight snow fall",
        73 => "Moderate snow fall",
        75 => "Heavy snow fall",
        77 => "Snow grains",
        80 => "Slight rain showers",
        81 => "Moderate rain showers",
        82 => "Violent rain showers",
        85 => "Slight snow showers",
        86 => "Heavy snow showers",
        95 => "Thunderstorm",
        96 => "Thunderstorm with slight hail",
        99 => "Thunderstorm with heavy hail",
        _ => "Unknown",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn service_against(mock: &MockServer) -> WeatherService {
        WeatherService::new(WeatherConfig {
            base_url: format!("{}/v1/forecast", mock.uri()),
            ..WeatherConfig::default()
        })
    }

    fn today_local() -> NaiveDate {
        Utc::now()
            .with_timezone(&WeatherConfig::default().timezone)
            .date_naive()
    }

    #[test_log::test(tokio::test)]
    async fn maps_weathercodes_to_descriptions() {
        let mock = MockServer::start().await;
        let today = today_local();
        let tomorrow = today + Duration::days(1);

        Mock::given(method("GET"))
            .and(path("/v1/forecast"))
            .and(query_param("forecast_days", "16"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "daily": {
                    "time": [today, tomorrow],
                    "temperature_2m_min": [12.5, 14.0],
                    "temperature_2m_max": [24.1, 26.3],
                    "weathercode": [0, 61],
                }
            })))
            .mount(&mock)
            .await;

        let forecast = service_against(&mock).daily_forecast(tomorrow).await.unwrap();
        assert_eq!(forecast.description, "Light rain");
        assert_eq!(forecast.temp_max, 26.3);
    }

    #[test_log::test(tokio::test)]
    async fn rejects_past_dates_without_calling_the_api() {
        let mock = MockServer::start().await;
        let err = service_against(&mock)
            .daily_forecast(today_local() - Duration::days(1))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::BadRequest { .. }));
        assert!(mock.received_requests().await.unwrap().is_empty());
    }

    #[test_log::test(tokio::test)]
    async fn rejects_dates_beyond_the_forecast_horizon() {
        let mock = MockServer::start().await;
        let err = service_against(&mock)
            .daily_forecast(today_local() + Duration::days(20))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::BadRequest { .. }));
    }
}
