//! Application configuration management.
//!
//! Configuration is loaded from a YAML file with environment variable
//! overrides. The file path defaults to `config.yaml` and can be set with
//! `-f` or `TEECTL_CONFIG`; variables prefixed with `TEECTL_` override
//! file values, with `__` separating nested keys (for example
//! `TEECTL_SCHEDULER__MAX_RETRIES=5`). `DATABASE_URL` is special-cased and
//! overrides `database_url` when set.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chrono::NaiveTime;
use chrono_tz::Tz;
use clap::Parser;
use figment::{
    Figment,
    providers::{Env, Format, Yaml},
};
use serde::{Deserialize, Serialize};

use teeline::activation::{ActivationPolicy, FixedDelay, WeekdayLeadTime};
use teeline::policy::RetryPolicy;
use teeline::runner::RunnerConfig;

/// Simple CLI args - just for specifying the config file.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Path to configuration file
    #[arg(short = 'f', long, env = "TEECTL_CONFIG", default_value = "config.yaml")]
    pub config: String,

    /// Validate configuration and exit without starting the server.
    #[arg(long)]
    pub validate: bool,
}

/// Main application configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// HTTP server host to bind to
    pub host: String,
    /// HTTP server port to bind to
    pub port: u16,
    /// Base URL where this service is reachable, used for gallery links in
    /// notification emails (e.g. "https://teetime.example.com")
    pub public_url: String,
    /// PostgreSQL connection string. When unset the service runs on an
    /// in-memory store, which only makes sense for local development.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub database_url: Option<String>,
    pub scheduler: SchedulerConfig,
    pub activation: ActivationConfig,
    pub agent: AgentConfig,
    pub artifacts: ArtifactConfig,
    pub email: EmailConfig,
    pub weather: WeatherConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            public_url: "http://localhost:8080".to_string(),
            database_url: None,
            scheduler: SchedulerConfig::default(),
            activation: ActivationConfig::default(),
            agent: AgentConfig::default(),
            artifacts: ArtifactConfig::default(),
            email: EmailConfig::default(),
            weather: WeatherConfig::default(),
        }
    }
}

/// Claim lock and retry budget settings for the run-once entry point.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct SchedulerConfig {
    /// Claims allowed before a transient failure becomes terminal.
    pub max_retries: u32,
    /// Minutes a claim lock stays valid; also the cooldown between attempts.
    pub lock_duration_minutes: u64,
    /// Seconds ahead of activation an entity may be claimed, so the agent
    /// can act the instant the booking window opens. Zero disables it.
    pub early_claim_seconds: u64,
    pub background_trigger: BackgroundTriggerConfig,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            lock_duration_minutes: 5,
            early_claim_seconds: 0,
            background_trigger: BackgroundTriggerConfig::default(),
        }
    }
}

/// Built-in interval trigger, standing in for an external cron. Each tick
/// performs one claim-attempt-resolve cycle, exactly like a POST to
/// `/run-reservation`.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct BackgroundTriggerConfig {
    pub enabled: bool,
    pub interval_seconds: u64,
}

impl Default for BackgroundTriggerConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            interval_seconds: 60,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivationMode {
    /// Weekday-dependent lead days with a fixed local window-open time.
    Weekday,
    /// Activate a fixed delay after submission (rehearsal runs).
    FixedDelay,
}

/// When the booking window for a requested date opens. The lead-day table
/// belongs to whoever owns the club relationship; treat these values as
/// business configuration, not code.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct ActivationConfig {
    pub mode: ActivationMode,
    /// Local time-of-day at which the window opens ("07:30:00").
    pub window_open: NaiveTime,
    /// IANA timezone the club publishes times in.
    pub timezone: Tz,
    /// Days of advance notice, Monday through Sunday.
    pub lead_days: [u32; 7],
    /// Delay for `fixed_delay` mode.
    pub fixed_delay_minutes: u64,
}

impl Default for ActivationConfig {
    fn default() -> Self {
        let weekday = WeekdayLeadTime::default();
        Self {
            mode: ActivationMode::Weekday,
            window_open: weekday.window_open,
            timezone: weekday.timezone,
            lead_days: weekday.lead_days,
            fixed_delay_minutes: 2,
        }
    }
}

/// Connection details for the automation runner and the club site it
/// drives. Credentials are passed through verbatim.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct AgentConfig {
    /// URL of the automation-runner service that performs the booking.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub runner_url: Option<String>,
    pub club_url: String,
    pub club_username: String,
    pub club_password: String,
    /// Upper bound on one booking attempt, browser time included.
    #[serde(with = "humantime_serde")]
    pub attempt_timeout: Duration,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            runner_url: None,
            club_url: String::new(),
            club_username: String::new(),
            club_password: String::new(),
            attempt_timeout: Duration::from_secs(300),
        }
    }
}

/// Where attempt evidence (screenshots, logs) is written.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct ArtifactConfig {
    pub root: PathBuf,
}

impl Default for ArtifactConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("./artifacts"),
        }
    }
}

/// Notification email settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct EmailConfig {
    pub enabled: bool,
    pub transport: EmailTransportConfig,
    pub from_email: String,
    pub from_name: String,
    /// Who gets told about booking outcomes.
    pub receiver_email: String,
}

impl Default for EmailConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            transport: EmailTransportConfig::File {
                path: "./emails".to_string(),
            },
            from_email: "teectl@localhost".to_string(),
            from_name: "Tee Time Bot".to_string(),
            receiver_email: String::new(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum EmailTransportConfig {
    Smtp {
        host: String,
        port: u16,
        username: String,
        password: String,
        use_tls: bool,
    },
    /// Write messages to a directory instead of sending. Development only.
    File { path: String },
}

/// Forecast lookup for the course location.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct WeatherConfig {
    pub latitude: f64,
    pub longitude: f64,
    pub timezone: Tz,
    /// Open-Meteo endpoint; overridable for tests.
    pub base_url: String,
}

impl Default for WeatherConfig {
    fn default() -> Self {
        Self {
            latitude: 33.849,
            longitude: -84.386,
            timezone: chrono_tz::America::New_York,
            base_url: "https://api.open-meteo.com/v1/forecast".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from the YAML file and `TEECTL_` environment
    /// overrides, in that order.
    pub fn load(args: &Args) -> Result<Self, anyhow::Error> {
        let figment = Figment::new()
            .merge(Yaml::file(&args.config))
            .merge(Env::prefixed("TEECTL_").split("__"));

        let mut config: Config = figment.extract()?;

        if let Ok(url) = std::env::var("DATABASE_URL") {
            config.database_url = Some(url);
        }

        Ok(config)
    }

    pub fn runner_config(&self) -> RunnerConfig {
        RunnerConfig {
            retry: RetryPolicy {
                max_retries: self.scheduler.max_retries,
            },
            lock_duration: chrono::Duration::minutes(self.scheduler.lock_duration_minutes as i64),
            claim_horizon: chrono::Duration::seconds(self.scheduler.early_claim_seconds as i64),
        }
    }

    pub fn activation_policy(&self) -> Arc<dyn ActivationPolicy> {
        match self.activation.mode {
            ActivationMode::Weekday => Arc::new(WeekdayLeadTime {
                lead_days: self.activation.lead_days,
                window_open: self.activation.window_open,
                timezone: self.activation.timezone,
            }),
            ActivationMode::FixedDelay => Arc::new(FixedDelay {
                delay: chrono::Duration::minutes(self.activation.fixed_delay_minutes as i64),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_the_documented_booking_rules() {
        let config = Config::default();
        assert_eq!(config.scheduler.max_retries, 3);
        assert_eq!(config.scheduler.lock_duration_minutes, 5);
        assert_eq!(config.activation.mode, ActivationMode::Weekday);
        assert_eq!(config.activation.lead_days, [3, 4, 5, 6, 3, 3, 3]);
        assert!(!config.scheduler.background_trigger.enabled);
    }

    #[test]
    fn runner_config_converts_units() {
        let config = Config::default();
        let runner = config.runner_config();
        assert_eq!(runner.lock_duration, chrono::Duration::minutes(5));
        assert_eq!(runner.claim_horizon, chrono::Duration::zero());
    }
}
