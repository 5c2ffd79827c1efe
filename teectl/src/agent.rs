//! Adapter to the external automation runner.
//!
//! The actual booking is performed by a separate service driving a real
//! browser against the club site. This adapter posts it one job per
//! attempt and maps its structured reply onto the engine's tagged
//! [`BookingFailure`] variants, so the engine never has to parse error
//! prose.

use async_trait::async_trait;
use chrono::NaiveTime;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use teeline::agent::{AutomationAgent, BookingConfirmation, BookingFailure, BookingResult};
use teeline::artifact::AttemptContext;
use teeline::reservation::SlotRequest;

use crate::config::AgentConfig;

pub struct RemoteAgent {
    client: reqwest::Client,
    runner_url: String,
    club_url: String,
    club_username: String,
    club_password: String,
    attempt_timeout: Duration,
}

#[derive(Debug, Serialize)]
struct BookingJob<'a> {
    date: String,
    time: String,
    time_window_minutes: u32,
    course: &'a str,
    club_url: &'a str,
    username: &'a str,
    password: &'a str,
    /// Where the runner should upload its evidence.
    artifact_folder: &'a str,
    attempt: u32,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "snake_case", tag = "outcome")]
enum BookingReply {
    Booked {
        booked_time: NaiveTime,
        confirmation_code: Option<String>,
    },
    NoSlot,
    Failed {
        error: String,
    },
}

impl RemoteAgent {
    pub fn new(runner_url: String, config: &AgentConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            runner_url,
            club_url: config.club_url.clone(),
            club_username: config.club_username.clone(),
            club_password: config.club_password.clone(),
            attempt_timeout: config.attempt_timeout,
        }
    }
}

#[async_trait]
impl AutomationAgent for RemoteAgent {
    async fn book(&self, slot: &SlotRequest, ctx: &AttemptContext) -> BookingResult {
        let job = BookingJob {
            date: slot.date.format("%Y-%m-%d").to_string(),
            time: slot.time.format("%H:%M").to_string(),
            time_window_minutes: slot.time_window_minutes,
            course: slot.course.as_str(),
            club_url: &self.club_url,
            username: &self.club_username,
            password: &self.club_password,
            artifact_folder: ctx.folder().as_str(),
            attempt: ctx.attempt(),
        };

        ctx.log(format!(
            "dispatching attempt {} to automation runner",
            ctx.attempt()
        ));

        let response = self
            .client
            .post(&self.runner_url)
            .timeout(self.attempt_timeout)
            .json(&job)
            .send()
            .await
            .map_err(|e| BookingFailure::Transient(format!("automation runner unreachable: {e}")))?;

        if !response.status().is_success() {
            return Err(BookingFailure::Transient(format!(
                "automation runner returned {}",
                response.status()
            )));
        }

        let reply: BookingReply = response
            .json()
            .await
            .map_err(|e| BookingFailure::Transient(format!("malformed runner reply: {e}")))?;

        match reply {
            BookingReply::Booked {
                booked_time,
                confirmation_code,
            } => {
                ctx.log(format!("runner confirmed slot at {booked_time}"));
                Ok(BookingConfirmation {
                    booked_time,
                    confirmation_code,
                })
            }
            BookingReply::NoSlot => Err(BookingFailure::NoSlotInWindow),
            BookingReply::Failed { error } => Err(BookingFailure::Transient(error)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use teeline::artifact::{ArtifactFolder, MemoryArtifactStore};
    use teeline::reservation::Course;
    use wiremock::matchers::{body_partial_json, method};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn slot() -> SlotRequest {
        SlotRequest {
            date: chrono::NaiveDate::from_ymd_opt(2025, 6, 1).unwrap(),
            time: chrono::NaiveTime::from_hms_opt(10, 0, 0).unwrap(),
            time_window_minutes: 30,
            course: Course::Any,
        }
    }

    fn ctx() -> AttemptContext {
        AttemptContext::new(
            ArtifactFolder::from_raw("2025-06-01_10:00"),
            1,
            Arc::new(MemoryArtifactStore::new()),
        )
    }

    fn agent_against(mock: &MockServer) -> RemoteAgent {
        RemoteAgent::new(format!("{}/book", mock.uri()), &AgentConfig::default())
    }

    #[tokio::test]
    async fn maps_a_booked_reply_to_a_confirmation() {
        let mock = MockServer::start().await;
        Mock::given(method("POST"))
            .and(body_partial_json(serde_json::json!({
                "date": "2025-06-01",
                "time": "10:00",
                "attempt": 1,
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "outcome": "booked",
                "booked_time": "10:10:00",
                "confirmation_code": "FT-1234",
            })))
            .mount(&mock)
            .await;

        let confirmation = agent_against(&mock).book(&slot(), &ctx()).await.unwrap();
        assert_eq!(
            confirmation.booked_time,
            chrono::NaiveTime::from_hms_opt(10, 10, 0).unwrap()
        );
    }

    #[tokio::test]
    async fn maps_no_slot_to_the_non_retriable_variant() {
        let mock = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({ "outcome": "no_slot" })),
            )
            .mount(&mock)
            .await;

        let failure = agent_against(&mock).book(&slot(), &ctx()).await.unwrap_err();
        assert_eq!(failure, BookingFailure::NoSlotInWindow);
    }

    #[tokio::test]
    async fn runner_errors_stay_retriable() {
        let mock = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(502))
            .mount(&mock)
            .await;

        let failure = agent_against(&mock).book(&slot(), &ctx()).await.unwrap_err();
        assert!(matches!(failure, BookingFailure::Transient(_)));
    }
}
