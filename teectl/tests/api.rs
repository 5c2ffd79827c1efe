//! HTTP surface tests against the in-memory store and a scripted agent.

use std::sync::Arc;

use axum::http::StatusCode;
use axum_test::TestServer;
use serde_json::{Value, json};

use teectl::config::{ActivationConfig, ActivationMode, EmailConfig, EmailTransportConfig};
use teectl::email::EmailService;
use teectl::weather::WeatherService;
use teectl::{AppState, Config, router};

use teeline::agent::mock::ScriptedAgent;
use teeline::agent::{BookingConfirmation, BookingFailure};
use teeline::artifact::{ArtifactStore, MemoryArtifactStore};
use teeline::runner::Runner;
use teeline::store::ReservationStore;
use teeline::store::memory::MemoryStore;

fn test_config() -> Config {
    Config {
        activation: ActivationConfig {
            mode: ActivationMode::FixedDelay,
            fixed_delay_minutes: 0,
            ..ActivationConfig::default()
        },
        ..Config::default()
    }
}

fn state_with(config: Config, agent: ScriptedAgent) -> AppState {
    let store: Arc<dyn ReservationStore> = Arc::new(MemoryStore::new());
    let artifacts: Arc<dyn ArtifactStore> = Arc::new(MemoryArtifactStore::new());
    let runner = Arc::new(Runner::new(
        store.clone(),
        Arc::new(agent),
        artifacts.clone(),
        config.runner_config(),
    ));
    let email = EmailService::new(&config).unwrap().map(Arc::new);
    AppState {
        activation: config.activation_policy(),
        weather: Arc::new(WeatherService::new(config.weather.clone())),
        config,
        store,
        artifacts,
        runner,
        email,
    }
}

fn server_with(agent: ScriptedAgent) -> TestServer {
    TestServer::new(router(state_with(test_config(), agent))).unwrap()
}

fn confirmation() -> BookingConfirmation {
    BookingConfirmation {
        booked_time: chrono::NaiveTime::from_hms_opt(10, 10, 0).unwrap(),
        confirmation_code: Some("FT-1234".into()),
    }
}

#[tokio::test]
async fn submit_creates_a_pending_reservation() {
    let server = server_with(ScriptedAgent::new());

    let response = server
        .post("/submit")
        .json(&json!({"date": "2025-06-01", "time": "10:00 AM"}))
        .await;
    response.assert_status(StatusCode::CREATED);

    let body: Value = response.json();
    assert_eq!(body["status"], "success");
    assert_eq!(body["data"]["status"], "pending");
    assert_eq!(body["data"]["retry_count"], 0);

    let listed: Value = server.get("/get-reservations").await.json();
    assert_eq!(listed["reservations"].as_array().unwrap().len(), 1);
    assert_eq!(listed["reservations"][0]["time"], "10:00");
}

#[tokio::test]
async fn duplicate_submission_returns_conflict() {
    let server = server_with(ScriptedAgent::new());
    let request = json!({"date": "2025-06-01", "time": "10:00"});

    server.post("/submit").json(&request).await.assert_status(StatusCode::CREATED);

    let response = server.post("/submit").json(&request).await;
    response.assert_status(StatusCode::CONFLICT);
    let body: Value = response.json();
    assert_eq!(body["status"], "error");
    assert!(body["message"].as_str().unwrap().contains("already exists"));
}

#[tokio::test]
async fn submit_without_required_fields_is_rejected() {
    let server = server_with(ScriptedAgent::new());

    let response = server.post("/submit").json(&json!({"date": "2025-06-01"})).await;
    response.assert_status(StatusCode::BAD_REQUEST);

    let response = server
        .post("/submit")
        .json(&json!({"date": "June 1st", "time": "10:00"}))
        .await;
    response.assert_status(StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn run_with_nothing_eligible_returns_empty_results() {
    let server = server_with(ScriptedAgent::new());

    let response = server.post("/run-reservation").await;
    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(body["status"], "success");
    assert_eq!(body["results"], json!([]));
}

#[tokio::test]
async fn successful_attempt_executes_the_reservation() {
    let server = server_with(ScriptedAgent::with([Ok(confirmation())]));

    server
        .post("/submit")
        .json(&json!({"date": "2025-06-01", "time": "10:00", "time_window_minutes": 30}))
        .await
        .assert_status(StatusCode::CREATED);

    let body: Value = server.post("/run-reservation").await.json();
    let results = body["results"].as_array().unwrap();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0]["status"], "executed");
    assert_eq!(results[0]["retry_count"], 1);

    let listed: Value = server.get("/get-reservations").await.json();
    assert_eq!(listed["reservations"][0]["status"], "executed");
    assert_eq!(listed["reservations"][0]["booked_time"], "10:10");
}

#[tokio::test]
async fn no_slot_failure_is_reported_in_the_run_results() {
    let server = server_with(ScriptedAgent::with([Err(BookingFailure::NoSlotInWindow)]));

    server
        .post("/submit")
        .json(&json!({"date": "2025-06-01", "time": "10:00"}))
        .await
        .assert_status(StatusCode::CREATED);

    let body: Value = server.post("/run-reservation").await.json();
    assert_eq!(body["results"][0]["status"], "failed");
    assert!(
        body["results"][0]["error"]
            .as_str()
            .unwrap()
            .contains("no available tee times")
    );
}

#[tokio::test]
async fn cancel_removes_the_reservation_and_frees_the_slot() {
    let server = server_with(ScriptedAgent::new());
    let slot = json!({"date": "2025-06-01", "time": "10:00"});

    server.post("/submit").json(&slot).await.assert_status(StatusCode::CREATED);

    server
        .post("/cancel-reservation")
        .json(&slot)
        .await
        .assert_status_ok();

    let listed: Value = server.get("/get-reservations").await.json();
    assert_eq!(listed["reservations"], json!([]));

    // Cancelling what is already gone surfaces an error.
    server
        .post("/cancel-reservation")
        .json(&slot)
        .await
        .assert_status(StatusCode::NOT_FOUND);

    // And the slot can be submitted again with no ghost conflict.
    server.post("/submit").json(&slot).await.assert_status(StatusCode::CREATED);
}

#[tokio::test]
async fn cancel_without_fields_is_a_client_error() {
    let server = server_with(ScriptedAgent::new());
    server
        .post("/cancel-reservation")
        .json(&json!({"date": "2025-06-01"}))
        .await
        .assert_status(StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn gallery_exposes_attempt_evidence_with_cache_headers() {
    let server = server_with(ScriptedAgent::with([Ok(confirmation())]));

    server
        .post("/submit")
        .json(&json!({"date": "2025-06-01", "time": "10:00"}))
        .await
        .assert_status(StatusCode::CREATED);
    server.post("/run-reservation").await.assert_status_ok();

    let gallery: Value = server
        .get("/gallery")
        .add_query_param("date", "2025-06-01")
        .add_query_param("time", "10:00")
        .await
        .json();

    assert_eq!(gallery["status"], "success");
    let attempts = gallery["attempts"].as_array().unwrap();
    assert_eq!(attempts.len(), 1);
    assert_eq!(attempts[0]["attempt"], 1);
    let url = attempts[0]["artifacts"][0]["url"].as_str().unwrap().to_string();
    assert!(url.ends_with("attempt_1.log"));

    let artifact = server.get(&url).await;
    artifact.assert_status_ok();
    assert_eq!(
        artifact.header("cache-control"),
        "public, max-age=31536000, immutable"
    );
    assert!(artifact.text().contains("attempt finished"));
}

#[tokio::test]
async fn missing_artifact_is_not_found() {
    let server = server_with(ScriptedAgent::new());
    server
        .get("/artifacts/2025-06-01_10:00/1/missing.png")
        .await
        .assert_status(StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn terminal_outcomes_send_a_notification_email() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = test_config();
    config.email = EmailConfig {
        enabled: true,
        transport: EmailTransportConfig::File {
            path: dir.path().to_string_lossy().into_owned(),
        },
        from_email: "bot@example.com".into(),
        from_name: "Tee Time Bot".into(),
        receiver_email: "golfer@example.com".into(),
    };

    let state = state_with(config, ScriptedAgent::with([Ok(confirmation())]));
    let server = TestServer::new(router(state)).unwrap();

    server
        .post("/submit")
        .json(&json!({"date": "2025-06-01", "time": "10:00"}))
        .await
        .assert_status(StatusCode::CREATED);
    server.post("/run-reservation").await.assert_status_ok();

    // The notification is dispatched off the request path; give it a beat.
    let mut sent = false;
    for _ in 0..40 {
        if std::fs::read_dir(dir.path()).unwrap().count() > 0 {
            sent = true;
            break;
        }
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
    }
    assert!(sent, "expected a notification email in the file transport");
}
