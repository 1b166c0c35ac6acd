use std::sync::Arc;

use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, info_span, warn, Instrument};

use crate::error::JobError;
use crate::job::JobRecord;
use crate::store::JobStore;

use super::progress::ProgressReporter;
use super::stage::{execute_contained, StageContext, StageOutcome, StageOutput};
use super::stage_set::{StageDescriptor, StageSet};

/// How one stage ended once retries are exhausted.
enum StageRun {
    Success(StageOutput),
    Failure(String),
    Cancelled,
}

/// Drives a single queued job through a [`StageSet`].
///
/// The runner is the only writer of a job's record once the job is
/// dispatched. Stage failures and panics end up as a FAILED record; they never
/// escape as errors. `Err` is only returned for invariant violations, such as
/// running a job that is not QUEUED.
pub struct PipelineRunner {
    store: Arc<dyn JobStore>,
    progress: Arc<dyn ProgressReporter>,
}

impl PipelineRunner {
    pub fn new(store: Arc<dyn JobStore>, progress: Arc<dyn ProgressReporter>) -> Self {
        Self { store, progress }
    }

    pub fn store(&self) -> &Arc<dyn JobStore> {
        &self.store
    }

    /// Runs every stage of `stages` for `job_id` and returns the terminal record.
    pub async fn run(
        &self,
        job_id: &str,
        stages: &StageSet,
        cancel: &CancellationToken,
    ) -> Result<JobRecord, JobError> {
        let span = info_span!("pipeline", job_id = %job_id, stages = stages.len());
        self.run_stages(job_id, stages, cancel).instrument(span).await
    }

    async fn run_stages(
        &self,
        job_id: &str,
        stages: &StageSet,
        cancel: &CancellationToken,
    ) -> Result<JobRecord, JobError> {
        if cancel.is_cancelled() {
            return self.commit_cancel(job_id, "Cancelled before processing started");
        }

        let started = self
            .commit(job_id, &mut |job| job.start("Starting analysis pipeline"))
            .inspect_err(|e| warn!("Refusing to run job: {}", e))?;

        let mut outputs = StageOutput::new();

        for (position, descriptor) in stages.iter().enumerate() {
            let index = position + 1;

            if cancel.is_cancelled() {
                let message = format!(
                    "Cancelled before stage {} ({})",
                    index, descriptor.name
                );
                return self.commit_cancel(job_id, &message);
            }

            let ctx = StageContext {
                job_id: started.id.clone(),
                schematic_id: started.schematic_id.clone(),
                source_ref: started.source_ref.clone(),
                stage_index: index,
                outputs: outputs.clone(),
            };

            let span = info_span!("stage", name = %descriptor.name, index);
            let run = self
                .execute_with_retry(descriptor, &ctx, cancel)
                .instrument(span)
                .await;

            match run {
                StageRun::Success(partial) => {
                    outputs.extend(partial);
                    self.commit(job_id, &mut |job| {
                        job.advance(
                            &descriptor.name,
                            descriptor.target_progress,
                            &descriptor.description,
                        )
                    })?;
                    debug!(
                        "Stage {} ({}) done, progress {}",
                        index, descriptor.name, descriptor.target_progress
                    );
                }
                StageRun::Failure(error) => {
                    let message = format!("stage {} ({}) failed: {}", index, descriptor.name, error);
                    warn!("{}", message);
                    return self.commit(job_id, &mut |job| {
                        job.fail(Some(&descriptor.name), &message)
                    });
                }
                StageRun::Cancelled => {
                    let message = format!(
                        "Cancelled during stage {} ({})",
                        index, descriptor.name
                    );
                    return self.commit_cancel(job_id, &message);
                }
            }

            tokio::task::yield_now().await;
        }

        let mut result = Some(Value::Object(outputs));
        let record = self.commit(job_id, &mut |job| {
            job.complete(result.take().unwrap_or(Value::Null), "Processing complete")
        })?;
        info!("Job completed");
        Ok(record)
    }

    async fn execute_with_retry(
        &self,
        descriptor: &StageDescriptor,
        ctx: &StageContext,
        cancel: &CancellationToken,
    ) -> StageRun {
        let mut attempt = 1;
        loop {
            let outcome = execute_contained(descriptor.stage.as_ref(), ctx).await;

            let error = match outcome {
                StageOutcome::Success { partial_result } => return StageRun::Success(partial_result),
                StageOutcome::Failure { error } => error,
            };

            if !descriptor.retry.allows_retry(attempt) {
                return StageRun::Failure(error);
            }

            let delay = descriptor.retry.backoff(attempt);
            warn!(
                "Attempt {}/{} failed: {}; retrying in {:?}",
                attempt, descriptor.retry.max_attempts, error, delay
            );

            tokio::select! {
                _ = cancel.cancelled() => return StageRun::Cancelled,
                _ = tokio::time::sleep(delay) => {}
            }
            attempt += 1;
        }
    }

    fn commit(
        &self,
        job_id: &str,
        f: &mut dyn FnMut(&mut JobRecord) -> Result<(), JobError>,
    ) -> Result<JobRecord, JobError> {
        let record = self.store.mutate(job_id, f)?;
        self.progress.report(&record);
        Ok(record)
    }

    fn commit_cancel(&self, job_id: &str, message: &str) -> Result<JobRecord, JobError> {
        info!("{}", message);
        self.commit(job_id, &mut |job| job.cancel(message))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::{JobStatus, NewJob};
    use crate::pipeline::progress::NoopProgress;
    use crate::pipeline::retry::RetryPolicy;
    use crate::pipeline::stage::Stage;
    use crate::store::MemoryJobStore;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    struct Emit(&'static str, i64);

    #[async_trait]
    impl Stage for Emit {
        async fn execute(&self, _ctx: &StageContext) -> StageOutcome {
            let mut out = StageOutput::new();
            out.insert(self.0.to_string(), json!(self.1));
            StageOutcome::success(out)
        }
    }

    struct Fail;

    #[async_trait]
    impl Stage for Fail {
        async fn execute(&self, _ctx: &StageContext) -> StageOutcome {
            StageOutcome::failure("model unavailable")
        }
    }

    struct Panics;

    #[async_trait]
    impl Stage for Panics {
        async fn execute(&self, _ctx: &StageContext) -> StageOutcome {
            panic!("detector crashed");
        }
    }

    /// Fails until the given attempt, then succeeds.
    struct Flaky {
        succeed_on: u32,
        calls: AtomicU32,
    }

    #[async_trait]
    impl Stage for Flaky {
        async fn execute(&self, _ctx: &StageContext) -> StageOutcome {
            let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            if call >= self.succeed_on {
                StageOutcome::empty()
            } else {
                StageOutcome::failure(format!("transient error {}", call))
            }
        }
    }

    /// Records the outputs it was handed.
    struct SeesOutputs(std::sync::Mutex<Option<StageOutput>>);

    #[async_trait]
    impl Stage for SeesOutputs {
        async fn execute(&self, ctx: &StageContext) -> StageOutcome {
            *self.0.lock().unwrap() = Some(ctx.outputs.clone());
            StageOutcome::empty()
        }
    }

    fn runner() -> (PipelineRunner, Arc<MemoryJobStore>) {
        let store = Arc::new(MemoryJobStore::new());
        let runner = PipelineRunner::new(store.clone(), Arc::new(NoopProgress));
        (runner, store)
    }

    fn desc(name: &str, target: f64, stage: Arc<dyn Stage>) -> StageDescriptor {
        StageDescriptor::new(name, format!("Running {}", name), target, stage)
    }

    fn queued(store: &MemoryJobStore) -> String {
        store.create(NewJob::new("sch-1", "file:///sch-1.pdf")).id
    }

    #[tokio::test]
    async fn test_all_stages_succeed() {
        let (runner, store) = runner();
        let id = queued(&store);
        let stages = StageSet::new(vec![
            desc("a", 0.5, Arc::new(Emit("pages", 2))),
            desc("b", 1.0, Arc::new(Emit("components", 7))),
        ])
        .unwrap();

        let record = runner
            .run(&id, &stages, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(record.status, JobStatus::Completed);
        assert_eq!(record.progress, 1.0);
        assert_eq!(record.result, Some(json!({"pages": 2, "components": 7})));
        assert_eq!(store.get(&id).unwrap(), record);
    }

    #[tokio::test]
    async fn test_failure_freezes_progress_and_names_stage() {
        let (runner, store) = runner();
        let id = queued(&store);
        let stages = StageSet::new(vec![
            desc("a", 0.3, Arc::new(Emit("pages", 2))),
            desc("b", 0.6, Arc::new(Fail)),
            desc("c", 1.0, Arc::new(Emit("never", 0))),
        ])
        .unwrap();

        let record = runner
            .run(&id, &stages, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(record.status, JobStatus::Failed);
        assert_eq!(record.progress, 0.3);
        assert!(record.result.is_none());
        let message = record.message.unwrap();
        assert!(message.contains("stage 2"), "{}", message);
        assert!(message.contains("model unavailable"), "{}", message);
    }

    #[tokio::test]
    async fn test_first_stage_failure_leaves_zero_progress() {
        let (runner, store) = runner();
        let id = queued(&store);
        let stages = StageSet::new(vec![desc("only", 1.0, Arc::new(Fail))]).unwrap();

        let record = runner
            .run(&id, &stages, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(record.status, JobStatus::Failed);
        assert_eq!(record.progress, 0.0);
        assert!(record.message.unwrap().contains("stage 1"));
    }

    #[tokio::test]
    async fn test_panicking_stage_becomes_failure() {
        let (runner, store) = runner();
        let id = queued(&store);
        let stages = StageSet::new(vec![desc("boom", 1.0, Arc::new(Panics))]).unwrap();

        let record = runner
            .run(&id, &stages, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(record.status, JobStatus::Failed);
        assert!(record.message.unwrap().contains("detector crashed"));
    }

    #[tokio::test]
    async fn test_rerun_of_terminal_job_is_rejected() {
        let (runner, store) = runner();
        let id = queued(&store);
        let calls = Arc::new(Flaky {
            succeed_on: 1,
            calls: AtomicU32::new(0),
        });
        let stages = StageSet::new(vec![desc("a", 1.0, calls.clone())]).unwrap();

        runner
            .run(&id, &stages, &CancellationToken::new())
            .await
            .unwrap();
        let err = runner
            .run(&id, &stages, &CancellationToken::new())
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            JobError::InvalidTransition {
                from: JobStatus::Completed,
                ..
            }
        ));
        assert_eq!(calls.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_unknown_job_is_not_found() {
        let (runner, _store) = runner();
        let stages = StageSet::new(vec![desc("a", 1.0, Arc::new(Emit("x", 1)))]).unwrap();
        let err = runner
            .run("missing", &stages, &CancellationToken::new())
            .await
            .unwrap_err();
        assert_eq!(err, JobError::NotFound("missing".to_string()));
    }

    #[tokio::test]
    async fn test_cancelled_token_cancels_before_start() {
        let (runner, store) = runner();
        let id = queued(&store);
        let stages = StageSet::new(vec![desc("a", 1.0, Arc::new(Emit("x", 1)))]).unwrap();
        let token = CancellationToken::new();
        token.cancel();

        let record = runner.run(&id, &stages, &token).await.unwrap();
        assert_eq!(record.status, JobStatus::Cancelled);
        assert_eq!(record.progress, 0.0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_recovers_transient_failure() {
        let (runner, store) = runner();
        let id = queued(&store);
        let flaky = Arc::new(Flaky {
            succeed_on: 3,
            calls: AtomicU32::new(0),
        });
        let stages = StageSet::new(vec![desc("a", 1.0, flaky.clone()).with_retry(
            RetryPolicy::exponential(3, Duration::from_millis(50), Duration::from_secs(1)),
        )])
        .unwrap();

        let record = runner
            .run(&id, &stages, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(record.status, JobStatus::Completed);
        assert_eq!(flaky.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_is_bounded() {
        let (runner, store) = runner();
        let id = queued(&store);
        let flaky = Arc::new(Flaky {
            succeed_on: 10,
            calls: AtomicU32::new(0),
        });
        let stages = StageSet::new(vec![desc("a", 1.0, flaky.clone()).with_retry(
            RetryPolicy::exponential(2, Duration::from_millis(50), Duration::from_secs(1)),
        )])
        .unwrap();

        let record = runner
            .run(&id, &stages, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(record.status, JobStatus::Failed);
        assert!(record.message.unwrap().contains("transient error 2"));
        assert_eq!(flaky.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_stage_sees_previous_outputs() {
        let (runner, store) = runner();
        let id = queued(&store);
        let observer = Arc::new(SeesOutputs(std::sync::Mutex::new(None)));
        let stages = StageSet::new(vec![
            desc("a", 0.5, Arc::new(Emit("pages", 4))),
            desc("b", 1.0, observer.clone()),
        ])
        .unwrap();

        runner
            .run(&id, &stages, &CancellationToken::new())
            .await
            .unwrap();

        let seen = observer.0.lock().unwrap().clone().unwrap();
        assert_eq!(seen.get("pages"), Some(&json!(4)));
    }
}
