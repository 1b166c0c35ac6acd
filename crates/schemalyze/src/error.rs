use std::path::PathBuf;
use thiserror::Error;

use crate::job::JobStatus;

#[derive(Error, Debug)]
pub enum SchemalyzeError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Job error: {0}")]
    Job(#[from] JobError),

    #[error("Invalid stage set: {0}")]
    StageSet(#[from] StageSetError),

    #[error("Submission rejected: {0}")]
    Submit(#[from] SubmitError),

    #[error("Callback failed: {0}")]
    Notify(#[from] NotifyError),

    #[error("Failed to initialize logging: {0}")]
    Logging(String),
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum JobError {
    #[error("Job not found: {0}")]
    NotFound(String),

    #[error("Job {id} cannot move from {from} to {to}")]
    InvalidTransition {
        id: String,
        from: JobStatus,
        to: JobStatus,
    },

    #[error("Job {id} progress cannot go from {current} back to {requested}")]
    ProgressRegression {
        id: String,
        current: f64,
        requested: f64,
    },

    #[error("Progress value {0} is outside [0.0, 1.0]")]
    InvalidProgress(f64),
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum StageSetError {
    #[error("Stage set must contain at least one stage")]
    Empty,

    #[error("Stage '{name}' has target progress {target} outside (0.0, 1.0]")]
    OutOfRange { name: String, target: f64 },

    #[error("Stage '{name}' target {target} does not exceed previous target {previous}")]
    NotIncreasing {
        name: String,
        target: f64,
        previous: f64,
    },

    #[error("Final stage '{name}' must target 1.0, found {target}")]
    FinalNotComplete { name: String, target: f64 },

    #[error("Duplicate stage name: {0}")]
    DuplicateName(String),
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum SubmitError {
    #[error("Missing required field '{0}'")]
    MissingField(&'static str),

    #[error(transparent)]
    Job(#[from] JobError),
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file '{path}': {source}")]
    ReadFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config JSON: {0}")]
    ParseJson(#[from] serde_json::Error),

    #[error("Config validation failed: {message}")]
    Validation { message: String },

    #[error("Invalid listen address '{address}': {reason}")]
    InvalidAddress { address: String, reason: String },
}

#[derive(Error, Debug)]
pub enum NotifyError {
    #[error("Failed to build HTTP client: {0}")]
    Client(#[source] reqwest::Error),

    #[error("Callback request to '{url}' failed: {source}")]
    Request {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("Callback '{url}' answered with status {status}")]
    Status { url: String, status: u16 },
}

pub type Result<T> = std::result::Result<T, SchemalyzeError>;
