//! Application configuration management.
//!
//! This module handles loading configuration from environment variables.
//! It uses the `envy` crate to automatically deserialize environment variables into a type-safe struct.

use std::time::Duration;

use serde::Deserialize;

use crate::services::retry::RetrySchedule;
use crate::services::simulator::SimulationMode;

/// Which halves of the system this process runs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunMode {
    /// HTTP API and workers in one process
    #[default]
    All,
    /// HTTP API only; workers run elsewhere
    Api,
    /// Workers only
    Worker,
}

impl RunMode {
    pub fn serves_api(&self) -> bool {
        matches!(self, RunMode::All | RunMode::Api)
    }

    pub fn runs_workers(&self) -> bool {
        matches!(self, RunMode::All | RunMode::Worker)
    }
}

/// Application configuration loaded from environment variables.
///
/// # Environment Variables
///
/// - `DATABASE_URL` (optional): PostgreSQL connection string. Without it the
///   process runs on an in-memory store and queue seeded with the test
///   merchant.
/// - `SERVER_PORT` (optional): HTTP server port, defaults to 8000
/// - `RUN_MODE` (optional): `all`, `api` or `worker`, defaults to `all`
/// - `TEST_MODE` (optional): deterministic settlement and short retry delays
/// - `TEST_PROCESSING_DELAY_MS` (optional): settlement delay in test mode
/// - `WEBHOOK_RETRY_INTERVALS_TEST` (optional): `true` for the short retry
///   schedule, `false` for the production one, or comma separated seconds
/// - `PAYMENT_WORKER_CONCURRENCY`, `REFUND_WORKER_CONCURRENCY`,
///   `WEBHOOK_WORKER_CONCURRENCY` (optional): jobs in flight per queue
/// - `JOB_POLL_INTERVAL_MS`, `JOB_VISIBILITY_TIMEOUT_SECS` (optional)
/// - `JOB_COMPLETED_RETENTION_SECS` (optional): age at which completed jobs
///   are pruned, defaults to one hour
/// - `WEBHOOK_TIMEOUT_MS` (optional): outbound delivery timeout
/// - `DATABASE_MAX_CONNECTIONS` (optional)
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub database_url: Option<String>,

    #[serde(default = "default_port")]
    pub server_port: u16,

    #[serde(default)]
    pub run_mode: RunMode,

    #[serde(default)]
    pub test_mode: bool,

    #[serde(default = "default_test_processing_delay_ms")]
    pub test_processing_delay_ms: u64,

    pub webhook_retry_intervals_test: Option<String>,

    #[serde(default = "default_settlement_concurrency")]
    pub payment_worker_concurrency: usize,

    #[serde(default = "default_settlement_concurrency")]
    pub refund_worker_concurrency: usize,

    #[serde(default = "default_webhook_concurrency")]
    pub webhook_worker_concurrency: usize,

    #[serde(default = "default_poll_interval_ms")]
    pub job_poll_interval_ms: u64,

    #[serde(default = "default_visibility_timeout_secs")]
    pub job_visibility_timeout_secs: u64,

    #[serde(default = "default_completed_retention_secs")]
    pub job_completed_retention_secs: u64,

    #[serde(default = "default_webhook_timeout_ms")]
    pub webhook_timeout_ms: u64,

    #[serde(default = "default_max_connections")]
    pub database_max_connections: u32,
}

/// Default port if SERVER_PORT environment variable is not set.
fn default_port() -> u16 {
    8000
}

fn default_test_processing_delay_ms() -> u64 {
    1000
}

fn default_settlement_concurrency() -> usize {
    5
}

fn default_webhook_concurrency() -> usize {
    10
}

fn default_poll_interval_ms() -> u64 {
    500
}

fn default_visibility_timeout_secs() -> u64 {
    60
}

fn default_completed_retention_secs() -> u64 {
    3600
}

fn default_webhook_timeout_ms() -> u64 {
    5000
}

fn default_max_connections() -> u32 {
    10
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// This method first attempts to load a `.env` file (which is optional),
    /// then reads environment variables and deserializes them into a Config struct.
    ///
    /// # Errors
    ///
    /// Returns an error if environment variable values cannot be parsed into
    /// expected types.
    pub fn from_env() -> Result<Self, envy::Error> {
        // Try to load .env file if it exists (does nothing if not found)
        dotenvy::dotenv().ok();

        // Field names are automatically converted: database_url -> DATABASE_URL
        envy::from_env::<Config>()
    }

    pub fn simulation_mode(&self) -> SimulationMode {
        if self.test_mode {
            SimulationMode::Test
        } else {
            SimulationMode::Live
        }
    }

    pub fn test_processing_delay(&self) -> Duration {
        Duration::from_millis(self.test_processing_delay_ms)
    }

    /// Retry schedule of the webhook worker.
    ///
    /// `WEBHOOK_RETRY_INTERVALS_TEST` decides when set:
    ///
    /// - `true` / `false`: the built-in test or production schedule,
    ///   whatever `TEST_MODE` says
    /// - a comma separated list of seconds: that schedule
    ///
    /// Unset or unparsable, test mode picks the test schedule.
    pub fn retry_schedule(&self) -> RetrySchedule {
        let fallback = if self.test_mode {
            RetrySchedule::test()
        } else {
            RetrySchedule::production()
        };

        let Some(raw) = self.webhook_retry_intervals_test.as_deref().map(str::trim) else {
            return fallback;
        };

        if raw.eq_ignore_ascii_case("true") {
            RetrySchedule::test()
        } else if raw.eq_ignore_ascii_case("false") {
            RetrySchedule::production()
        } else {
            RetrySchedule::parse_secs(raw).unwrap_or_else(|| {
                tracing::warn!(value = raw, "ignoring invalid WEBHOOK_RETRY_INTERVALS_TEST");
                fallback
            })
        }
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.job_poll_interval_ms)
    }

    pub fn visibility_timeout(&self) -> Duration {
        Duration::from_secs(self.job_visibility_timeout_secs)
    }

    pub fn completed_job_retention(&self) -> Duration {
        Duration::from_secs(self.job_completed_retention_secs)
    }

    pub fn webhook_timeout(&self) -> Duration {
        Duration::from_millis(self.webhook_timeout_ms)
    }
}
