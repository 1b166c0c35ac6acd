//! Submission and asynchronous dispatch of jobs.

pub mod notifier;
pub mod retention;

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use serde::{Deserialize, Serialize};
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::error::{JobError, SubmitError};
use crate::job::{JobRecord, JobStatus, NewJob};
use crate::pipeline::{NoopProgress, PipelineRunner, ProgressReporter, StageSet};
use crate::store::JobStore;

pub use notifier::{CompletionNotifier, HttpCallbackNotifier, NoopNotifier};
pub use retention::spawn_retention_sweeper;

/// What to do when a schematic is submitted while an earlier job for it is still running.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DuplicatePolicy {
    /// Always start a new, independent job.
    #[default]
    Spawn,
    /// Return the job that is still queued or processing.
    ReuseActive,
}

/// An external request to analyze a schematic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmitRequest {
    pub schematic_id: String,
    pub source_ref: String,
    pub callback_ref: Option<String>,
}

impl SubmitRequest {
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

    fn validate(&self) -> Result<(), SubmitError> {
        if self.schematic_id.trim().is_empty() {
            return Err(SubmitError::MissingField("schematicId"));
        }
        if self.source_ref.trim().is_empty() {
            return Err(SubmitError::MissingField("sourceRef"));
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct SchedulerOptions {
    /// Jobs allowed in PROCESSING at once. Further jobs wait as QUEUED.
    pub max_concurrent_jobs: usize,
    pub duplicate_policy: DuplicatePolicy,
}

impl Default for SchedulerOptions {
    fn default() -> Self {
        Self {
            max_concurrent_jobs: 4,
            duplicate_policy: DuplicatePolicy::Spawn,
        }
    }
}

/// A dispatched job that has not reached a terminal status yet.
struct ActiveJob {
    schematic_id: String,
    cancel: CancellationToken,
    handle: Option<JoinHandle<()>>,
}

type ActiveJobs = Arc<Mutex<HashMap<String, ActiveJob>>>;

/// Creates job records and runs each one on its own Tokio task.
pub struct Scheduler {
    store: Arc<dyn JobStore>,
    runner: Arc<PipelineRunner>,
    stages: Arc<StageSet>,
    notifier: Arc<dyn CompletionNotifier>,
    permits: Arc<Semaphore>,
    duplicate_policy: DuplicatePolicy,
    active: ActiveJobs,
}

impl Scheduler {
    pub fn new(store: Arc<dyn JobStore>, stages: StageSet, options: SchedulerOptions) -> Self {
        let runner = Arc::new(PipelineRunner::new(Arc::clone(&store), Arc::new(NoopProgress)));
        Self {
            store,
            runner,
            stages: Arc::new(stages),
            notifier: Arc::new(NoopNotifier),
            permits: Arc::new(Semaphore::new(options.max_concurrent_jobs.max(1))),
            duplicate_policy: options.duplicate_policy,
            active: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Reports every committed transition to `progress`.
    pub fn with_progress(mut self, progress: Arc<dyn ProgressReporter>) -> Self {
        self.runner = Arc::new(PipelineRunner::new(Arc::clone(&self.store), progress));
        self
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn CompletionNotifier>) -> Self {
        self.notifier = notifier;
        self
    }

    pub fn store(&self) -> &Arc<dyn JobStore> {
        &self.store
    }

    pub fn stages(&self) -> &StageSet {
        &self.stages
    }

    /// Creates a queued job and dispatches it without waiting for any stage.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn submit(&self, request: SubmitRequest) -> Result<JobRecord, SubmitError> {
        request.validate()?;

        let mut active = lock(&self.active);

        if self.duplicate_policy == DuplicatePolicy::ReuseActive {
            if let Some(existing) = self.find_active(&active, &request.schematic_id) {
                log::info!(
                    "Schematic {} already has active job {}, reusing it",
                    request.schematic_id,
                    existing.id
                );
                return Ok(existing);
            }
        }

        let record = self.store.create(NewJob {
            schematic_id: request.schematic_id,
            source_ref: request.source_ref,
            callback_ref: request.callback_ref,
        });

        let cancel = CancellationToken::new();
        let handle = tokio::spawn(run_job(
            record.id.clone(),
            Arc::clone(&self.runner),
            Arc::clone(&self.stages),
            Arc::clone(&self.notifier),
            Arc::clone(&self.permits),
            Arc::clone(&self.active),
            cancel.clone(),
        ));

        active.insert(
            record.id.clone(),
            ActiveJob {
                schematic_id: record.schematic_id.clone(),
                cancel,
                handle: Some(handle),
            },
        );

        log::info!(
            "Queued job {} for schematic {}",
            record.id,
            record.schematic_id
        );
        Ok(record)
    }

    /// Returns the current record of a job.
    pub fn get(&self, job_id: &str) -> Result<JobRecord, JobError> {
        self.store.get(job_id)
    }

    /// Signals a queued or processing job to stop.
    ///
    /// The runner observes the signal between stages, so the record may still
    /// read QUEUED or PROCESSING for a moment after this returns.
    pub fn cancel(&self, job_id: &str) -> Result<JobRecord, JobError> {
        let active = lock(&self.active);

        // A job stays in `active` until its task has reported the terminal
        // record, so the stored status decides.
        let record = self.store.get(job_id)?;
        if record.is_finished() {
            return Err(JobError::InvalidTransition {
                id: record.id,
                from: record.status,
                to: JobStatus::Cancelled,
            });
        }

        if let Some(job) = active.get(job_id) {
            job.cancel.cancel();
            log::info!("Cancellation requested for job {}", job_id);
        }
        Ok(record)
    }

    /// Number of dispatched jobs that have not finished yet.
    pub fn active_jobs(&self) -> usize {
        lock(&self.active).len()
    }

    /// Cancels every active job and waits for their tasks to end.
    pub async fn shutdown(&self) -> usize {
        let handles: Vec<JoinHandle<()>> = {
            let mut active = lock(&self.active);
            active
                .values_mut()
                .filter_map(|job| {
                    job.cancel.cancel();
                    job.handle.take()
                })
                .collect()
        };

        let count = handles.len();
        log::info!("Shutting down scheduler, waiting for {} jobs", count);
        for result in futures_util::future::join_all(handles).await {
            if let Err(e) = result {
                log::error!("Job task ended abnormally: {}", e);
            }
        }
        count
    }

    fn find_active(
        &self,
        active: &HashMap<String, ActiveJob>,
        schematic_id: &str,
    ) -> Option<JobRecord> {
        active
            .iter()
            .filter(|(_, job)| job.schematic_id == schematic_id)
            .filter_map(|(id, _)| self.store.get(id).ok())
            .find(|record| !record.is_finished())
    }
}

async fn run_job(
    job_id: String,
    runner: Arc<PipelineRunner>,
    stages: Arc<StageSet>,
    notifier: Arc<dyn CompletionNotifier>,
    permits: Arc<Semaphore>,
    active: ActiveJobs,
    cancel: CancellationToken,
) {
    let permit = tokio::select! {
        permit = permits.acquire_owned() => permit.ok(),
        _ = cancel.cancelled() => None,
    };

    let outcome = runner.run(&job_id, &stages, &cancel).await;
    drop(permit);
    lock(&active).remove(&job_id);

    match outcome {
        Ok(record) => {
            if let Err(e) = notifier.notify(&record).await {
                log::warn!("Completion callback for job {} failed: {}", job_id, e);
            }
        }
        Err(e) => {
            log::error!("Job {} could not be run: {}", job_id, e);
            debug_assert!(
                !matches!(e, JobError::InvalidTransition { .. }),
                "scheduler dispatched a job that was not queued: {}",
                e
            );
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(g) => g,
        Err(poisoned) => {
            log::warn!("Scheduler lock was poisoned, recovering");
            poisoned.into_inner()
        }
    }
}
