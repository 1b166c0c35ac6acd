//! Test harness wiring a scheduler to an in-memory store.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;

use schemalyze::pipeline::{BroadcastProgress, ProgressReporter};
use schemalyze::scheduler::CompletionNotifier;
use schemalyze::{
    DuplicatePolicy, JobEvent, JobEventBroadcaster, JobRecord, JobStore, MemoryJobStore,
    Scheduler, SchedulerOptions, StageSet, SubmitRequest,
};

const WAIT_TIMEOUT: Duration = Duration::from_secs(5);

pub struct TestHarness {
    pub store: Arc<MemoryJobStore>,
    pub scheduler: Scheduler,
    pub events: JobEventBroadcaster,
}

impl TestHarness {
    pub fn new(stages: StageSet) -> Self {
        Self::with_options(stages, SchedulerOptions::default())
    }

    pub fn with_options(stages: StageSet, options: SchedulerOptions) -> Self {
        let store = Arc::new(MemoryJobStore::new());
        let events = JobEventBroadcaster::new(1024);
        let scheduler = Scheduler::new(store.clone(), stages, options)
            .with_progress(Arc::new(BroadcastProgress::new(events.clone())));

        Self {
            store,
            scheduler,
            events,
        }
    }

    pub fn with_duplicate_policy(stages: StageSet, policy: DuplicatePolicy) -> Self {
        Self::with_options(
            stages,
            SchedulerOptions {
                duplicate_policy: policy,
                ..SchedulerOptions::default()
            },
        )
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn CompletionNotifier>) -> Self {
        self.scheduler = self.scheduler.with_notifier(notifier);
        self
    }

    /// Replaces the event reporter. Events are no longer broadcast.
    pub fn with_progress(mut self, progress: Arc<dyn ProgressReporter>) -> Self {
        self.scheduler = self.scheduler.with_progress(progress);
        self
    }

    pub fn subscribe(&self) -> broadcast::Receiver<JobEvent> {
        self.events.subscribe()
    }

    /// Submits a job for `schematic` reading from a file URL.
    pub fn submit(&self, schematic: &str) -> JobRecord {
        self.scheduler
            .submit(SubmitRequest::new(
                schematic,
                format!("file:///schematics/{}.pdf", schematic),
            ))
            .expect("submission accepted")
    }

    pub fn poll(&self, id: &str) -> JobRecord {
        self.store.get(id).expect("job exists")
    }

    /// Polls until `predicate` holds, panicking after a timeout.
    pub async fn wait_until<F>(&self, id: &str, predicate: F) -> JobRecord
    where
        F: Fn(&JobRecord) -> bool,
    {
        let deadline = tokio::time::Instant::now() + WAIT_TIMEOUT;
        loop {
            let record = self.poll(id);
            if predicate(&record) {
                return record;
            }
            if tokio::time::Instant::now() > deadline {
                panic!("timed out waiting on job {}: {:?}", id, record);
            }
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
    }

    pub async fn wait_finished(&self, id: &str) -> JobRecord {
        self.wait_until(id, |r| r.is_finished()).await
    }

    /// Waits until the scheduler no longer tracks any job.
    pub async fn wait_idle(&self) {
        let deadline = tokio::time::Instant::now() + WAIT_TIMEOUT;
        while self.scheduler.active_jobs() > 0 {
            if tokio::time::Instant::now() > deadline {
                panic!("scheduler still has {} active jobs", self.scheduler.active_jobs());
            }
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
    }
}
