//! # teectl: control layer for the tee time reservation bot
//!
//! Thin HTTP surface over the [`teeline`] reservation engine. Users submit
//! a (date, time) they want to play; the service computes when the club's
//! booking window opens, parks the request as a pending reservation, and
//! an external timer firing `/run-reservation` drives attempts through the
//! engine's claim-lock/retry lifecycle. Evidence from every attempt is
//! browsable through the gallery endpoints, and terminal outcomes are
//! emailed to the configured recipient.
//!
//! ## Endpoints
//!
//! - `POST /submit` - register a booking request (409 on duplicate slot)
//! - `GET|POST /run-reservation` - idempotent trigger; one attempt per call
//! - `GET /get-reservations` - list all reservations and their state
//! - `POST /cancel-reservation` - delete by (date, time)
//! - `GET /weather?date=` - forecast for the course location
//! - `GET /gallery?date&time` - attempt evidence for one reservation
//! - `GET /artifacts/{folder}/{attempt}/{name}` - artifact bytes
//!
//! State lives in PostgreSQL (or in memory for development); the browser
//! automation itself runs in a separate automation-runner service that
//! this layer talks to over HTTP.

pub mod agent;
pub mod api;
pub mod artifacts;
pub mod config;
pub mod email;
pub mod errors;
pub mod telemetry;
pub mod trigger;
pub mod weather;

use std::sync::Arc;

use anyhow::Context;
use axum::{
    Router,
    routing::{get, post},
};
use sqlx::postgres::PgPoolOptions;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;

use teeline::activation::ActivationPolicy;
use teeline::artifact::ArtifactStore;
use teeline::runner::{RunReport, Runner};
use teeline::store::ReservationStore;
use teeline::store::memory::MemoryStore;
use teeline::store::postgres::PostgresStore;
use teeline::Status;

pub use config::Config;
use crate::agent::RemoteAgent;
use crate::artifacts::LocalArtifactStore;
use crate::email::EmailService;
use crate::errors::Error;
use crate::weather::WeatherService;

/// Application state shared across all request handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    pub store: Arc<dyn ReservationStore>,
    pub artifacts: Arc<dyn ArtifactStore>,
    pub runner: Arc<Runner>,
    pub activation: Arc<dyn ActivationPolicy>,
    pub email: Option<Arc<EmailService>>,
    pub weather: Arc<WeatherService>,
}

/// Drive one run-once cycle and, on a terminal transition, dispatch the
/// notification email off the request path.
pub async fn run_and_notify(state: &AppState) -> Result<Vec<RunReport>, Error> {
    let Some(report) = state.runner.run_once().await? else {
        return Ok(Vec::new());
    };

    if report.status.is_terminal() {
        if let Some(email) = state.email.clone() {
            let store = state.store.clone();
            let public_url = state.config.public_url.clone();
            let report = report.clone();
            tokio::spawn(async move {
                if let Err(e) = notify_outcome(email, store, public_url, report).await {
                    tracing::warn!(error = %e, "Failed to send outcome notification");
                }
            });
        }
    }

    Ok(vec![report])
}

async fn notify_outcome(
    email: Arc<EmailService>,
    store: Arc<dyn ReservationStore>,
    public_url: String,
    report: RunReport,
) -> Result<(), Error> {
    let Some((reservation, _)) = store.get(&report.key).await? else {
        return Ok(());
    };
    let record = reservation.record();

    let date = record.date.format("%Y-%m-%d").to_string();
    let time = record.time.format("%H:%M").to_string();
    let gallery_url = format!("{public_url}/gallery?date={date}&time={time}");

    match report.status {
        Status::Executed => {
            let booked = record.booked_time.map(|t| t.format("%H:%M").to_string());
            email
                .send_booking_succeeded(&date, &time, booked.as_deref(), &gallery_url)
                .await
        }
        Status::Failed => {
            let reason = report.error.as_deref().unwrap_or("unknown error");
            email
                .send_booking_failed(&date, &time, reason, &gallery_url)
                .await
        }
        Status::Pending | Status::Locked => Ok(()),
    }
}

/// Assemble the application router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/submit", post(api::handlers::reservations::submit))
        .route(
            "/run-reservation",
            get(api::handlers::reservations::run_reservation)
                .post(api::handlers::reservations::run_reservation),
        )
        .route(
            "/get-reservations",
            get(api::handlers::reservations::list_reservations),
        )
        .route(
            "/cancel-reservation",
            post(api::handlers::reservations::cancel_reservation),
        )
        .route("/weather", get(api::handlers::weather::get_weather))
        .route("/gallery", get(api::handlers::gallery::gallery))
        .route(
            "/artifacts/{folder}/{attempt}/{name}",
            get(api::handlers::gallery::fetch_artifact),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

pub struct Application {
    state: AppState,
    listener: TcpListener,
}

impl Application {
    pub async fn new(config: Config) -> anyhow::Result<Self> {
        let store: Arc<dyn ReservationStore> = match &config.database_url {
            Some(url) => {
                let pool = PgPoolOptions::new()
                    .max_connections(5)
                    .connect(url)
                    .await
                    .context("connect to PostgreSQL")?;
                teeline::store::postgres::migrator()
                    .run(&pool)
                    .await
                    .context("run database migrations")?;
                Arc::new(PostgresStore::new(pool))
            }
            None => {
                tracing::warn!(
                    "No database_url configured; using the in-memory store (state is lost on restart)"
                );
                Arc::new(MemoryStore::new())
            }
        };

        let artifacts: Arc<dyn ArtifactStore> =
            Arc::new(LocalArtifactStore::new(config.artifacts.root.clone()));

        let runner_url = config
            .agent
            .runner_url
            .clone()
            .context("agent.runner_url must be configured")?;
        let agent = Arc::new(RemoteAgent::new(runner_url, &config.agent));

        let runner = Arc::new(Runner::new(
            store.clone(),
            agent,
            artifacts.clone(),
            config.runner_config(),
        ));

        let email = EmailService::new(&config)?.map(Arc::new);
        let weather = Arc::new(WeatherService::new(config.weather.clone()));
        let activation = config.activation_policy();

        let listener = TcpListener::bind((config.host.as_str(), config.port))
            .await
            .with_context(|| format!("bind {}:{}", config.host, config.port))?;

        tracing::info!(
            address = %listener.local_addr()?,
            "teectl listening"
        );

        Ok(Self {
            state: AppState {
                config,
                store,
                artifacts,
                runner,
                activation,
                email,
                weather,
            },
            listener,
        })
    }

    pub fn local_addr(&self) -> anyhow::Result<std::net::SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Serve until the shutdown future resolves.
    pub async fn serve<F>(self, shutdown: F) -> anyhow::Result<()>
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        let trigger_config = &self.state.config.scheduler.background_trigger;
        if trigger_config.enabled {
            tokio::spawn(trigger::run_trigger_loop(
                self.state.clone(),
                trigger_config.interval_seconds,
            ));
        }

        axum::serve(self.listener, router(self.state))
            .with_graceful_shutdown(shutdown)
            .await?;

        Ok(())
    }
}
