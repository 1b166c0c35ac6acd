use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::logging::LogFormat;
use crate::pipeline::RetryPolicy;
use crate::scheduler::{DuplicatePolicy, SchedulerOptions};

fn default_listen_address() -> String {
    "0.0.0.0:8000".to_string()
}

fn default_allowed_origins() -> Vec<String> {
    vec!["http://localhost:3000".to_string()]
}

fn default_max_concurrent_jobs() -> usize {
    4
}

fn default_retention_secs() -> u64 {
    3600
}

fn default_sweep_interval_secs() -> u64 {
    60
}

fn default_callback_timeout_secs() -> u64 {
    10
}

fn default_event_capacity() -> usize {
    256
}

/// Service configuration, read from a JSON file.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ServiceConfig {
    #[serde(default = "default_listen_address")]
    pub listen_address: String,

    /// Origins allowed to call the HTTP API from a browser.
    #[serde(default = "default_allowed_origins")]
    pub allowed_origins: Vec<String>,

    #[serde(default = "default_max_concurrent_jobs")]
    pub max_concurrent_jobs: usize,

    #[serde(default)]
    pub duplicate_policy: DuplicatePolicy,

    /// How long finished jobs stay pollable.
    #[serde(default = "default_retention_secs")]
    pub retention_secs: u64,

    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,

    #[serde(default = "default_callback_timeout_secs")]
    pub callback_timeout_secs: u64,

    /// Capacity of the job event broadcast channel.
    #[serde(default = "default_event_capacity")]
    pub event_capacity: usize,

    #[serde(default)]
    pub log_format: LogFormat,

    /// Per-stage retry overrides.
    #[serde(default)]
    pub stages: Vec<StageRetryConfig>,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            listen_address: default_listen_address(),
            allowed_origins: default_allowed_origins(),
            max_concurrent_jobs: default_max_concurrent_jobs(),
            duplicate_policy: DuplicatePolicy::default(),
            retention_secs: default_retention_secs(),
            sweep_interval_secs: default_sweep_interval_secs(),
            callback_timeout_secs: default_callback_timeout_secs(),
            event_capacity: default_event_capacity(),
            log_format: LogFormat::default(),
            stages: Vec::new(),
        }
    }
}

impl ServiceConfig {
    pub fn scheduler_options(&self) -> SchedulerOptions {
        SchedulerOptions {
            max_concurrent_jobs: self.max_concurrent_jobs,
            duplicate_policy: self.duplicate_policy,
        }
    }

    pub fn retention(&self) -> Duration {
        Duration::from_secs(self.retention_secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }

    pub fn callback_timeout(&self) -> Duration {
        Duration::from_secs(self.callback_timeout_secs)
    }
}

fn default_max_attempts() -> u32 {
    1
}

fn default_initial_backoff_ms() -> u64 {
    500
}

fn default_max_backoff_ms() -> u64 {
    10_000
}

/// Retry settings for one named stage.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct StageRetryConfig {
    pub name: String,
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,
    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,
}

impl StageRetryConfig {
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::exponential(
            self.max_attempts,
            Duration::from_millis(self.initial_backoff_ms),
            Duration::from_millis(self.max_backoff_ms),
        )
    }
}
