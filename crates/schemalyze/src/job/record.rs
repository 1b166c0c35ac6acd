use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::JobError;

use super::status::JobStatus;

/// Caller-supplied fields of a new job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewJob {
    pub schematic_id: String,
    pub source_ref: String,
    pub callback_ref: Option<String>,
}

impl NewJob {
    pub fn new(schematic_id: impl Into<String>, source_ref: impl Into<String>) -> Self {
        Self {
            schematic_id: schematic_id.into(),
            source_ref: source_ref.into(),
            callback_ref: None,
        }
    }

    pub fn with_callback(mut self, callback_ref: impl Into<String>) -> Self {
        self.callback_ref = Some(callback_ref.into());
        self
    }
}

/// A tracked analysis job.
///
/// Identity fields never change after creation. The lifecycle fields are only
/// changed through the transition methods below, which enforce the status
/// state machine and keep `progress` monotonic.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct JobRecord {
    /// Unique job identifier.
    pub id: String,
    /// External schematic reference supplied by the caller.
    pub schematic_id: String,
    /// Location of the input artifact.
    pub source_ref: String,
    /// URL notified once the job reaches a terminal status.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub callback_ref: Option<String>,
    /// Current status.
    pub status: JobStatus,
    /// Cumulative progress in [0.0, 1.0].
    pub progress: f64,
    /// Human-readable status message.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Name of the stage most recently reported.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stage: Option<String>,
    /// Analysis output, present only on completed jobs.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// When the job reached a terminal status.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
}

impl JobRecord {
    /// Creates a queued record with a fresh identifier.
    pub fn new(job: NewJob) -> Self {
        let now = Utc::now();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            schematic_id: job.schematic_id,
            source_ref: job.source_ref,
            callback_ref: job.callback_ref,
            status: JobStatus::Queued,
            progress: 0.0,
            message: Some("Job queued for processing".to_string()),
            stage: None,
            result: None,
            created_at: now,
            updated_at: now,
            finished_at: None,
        }
    }

    pub fn is_finished(&self) -> bool {
        self.status.is_terminal()
    }

    /// QUEUED -> PROCESSING.
    pub fn start(&mut self, message: &str) -> Result<(), JobError> {
        if self.status != JobStatus::Queued {
            return Err(self.invalid(JobStatus::Processing));
        }
        self.status = JobStatus::Processing;
        self.message = Some(message.to_string());
        self.touch();
        Ok(())
    }

    /// PROCESSING -> PROCESSING after a stage succeeded.
    pub fn advance(&mut self, stage: &str, progress: f64, message: &str) -> Result<(), JobError> {
        if self.status != JobStatus::Processing {
            return Err(self.invalid(JobStatus::Processing));
        }
        self.check_progress(progress)?;

        self.progress = progress;
        self.stage = Some(stage.to_string());
        self.message = Some(message.to_string());
        self.touch();
        Ok(())
    }

    /// PROCESSING -> COMPLETED. Progress is forced to 1.0.
    pub fn complete(&mut self, result: Value, message: &str) -> Result<(), JobError> {
        self.check_transition(JobStatus::Completed)?;

        self.status = JobStatus::Completed;
        self.progress = 1.0;
        self.result = Some(result);
        self.message = Some(message.to_string());
        self.finish();
        Ok(())
    }

    /// PROCESSING -> FAILED. Progress stays at its last value.
    pub fn fail(&mut self, stage: Option<&str>, message: &str) -> Result<(), JobError> {
        self.check_transition(JobStatus::Failed)?;

        self.status = JobStatus::Failed;
        self.result = None;
        if let Some(stage) = stage {
            self.stage = Some(stage.to_string());
        }
        self.message = Some(message.to_string());
        self.finish();
        Ok(())
    }

    /// QUEUED/PROCESSING -> CANCELLED. Progress stays at its last value.
    pub fn cancel(&mut self, message: &str) -> Result<(), JobError> {
        self.check_transition(JobStatus::Cancelled)?;

        self.status = JobStatus::Cancelled;
        self.result = None;
        self.message = Some(message.to_string());
        self.finish();
        Ok(())
    }

    /// Read-only projection served to pollers.
    pub fn view(&self) -> JobStatusView {
        JobStatusView {
            job_id: self.id.clone(),
            status: self.status,
            progress: self.progress,
            message: self.message.clone(),
            result: self.result.clone(),
        }
    }

    fn check_transition(&self, to: JobStatus) -> Result<(), JobError> {
        if self.status.can_transition_to(to) {
            Ok(())
        } else {
            Err(self.invalid(to))
        }
    }

    fn check_progress(&self, requested: f64) -> Result<(), JobError> {
        if !(0.0..=1.0).contains(&requested) {
            return Err(JobError::InvalidProgress(requested));
        }
        if requested < self.progress {
            return Err(JobError::ProgressRegression {
                id: self.id.clone(),
                current: self.progress,
                requested,
            });
        }
        Ok(())
    }

    fn invalid(&self, to: JobStatus) -> JobError {
        JobError::InvalidTransition {
            id: self.id.clone(),
            from: self.status,
            to,
        }
    }

    fn touch(&mut self) {
        self.updated_at = Utc::now();
    }

    fn finish(&mut self) {
        let now = Utc::now();
        self.updated_at = now;
        self.finished_at = Some(now);
    }
}

/// Status projection of a job, as returned to pollers.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct JobStatusView {
    pub job_id: String,
    pub status: JobStatus,
    pub progress: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
}
