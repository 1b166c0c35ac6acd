//! Fake stages and stage-set builders.
//!
//! Fake stages have deterministic, controllable outcomes so the engine can be
//! tested without any detection or OCR backend.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex};

use async_trait::async_trait;
use serde_json::json;
use tokio::sync::Semaphore;

use schemalyze::job::JobRecord;
use schemalyze::pipeline::ProgressReporter;
use schemalyze::scheduler::CompletionNotifier;
use schemalyze::{
    NotifyError, Stage, StageContext, StageDescriptor, StageOutcome, StageOutput, StageSet,
};

/// Succeeds with `{<name>: true}`.
pub struct SucceedStage {
    pub name: String,
}

#[async_trait]
impl Stage for SucceedStage {
    async fn execute(&self, _ctx: &StageContext) -> StageOutcome {
        let mut out = StageOutput::new();
        out.insert(self.name.clone(), json!(true));
        StageOutcome::success(out)
    }
}

/// Always fails with the given error.
pub struct FailStage {
    pub error: String,
}

#[async_trait]
impl Stage for FailStage {
    async fn execute(&self, _ctx: &StageContext) -> StageOutcome {
        StageOutcome::failure(self.error.clone())
    }
}

/// Fails only for jobs whose source reference contains `marker`.
pub struct FailForSource {
    pub marker: String,
}

#[async_trait]
impl Stage for FailForSource {
    async fn execute(&self, ctx: &StageContext) -> StageOutcome {
        if ctx.source_ref.contains(&self.marker) {
            StageOutcome::failure(format!("cannot read {}", ctx.source_ref))
        } else {
            StageOutcome::empty()
        }
    }
}

/// Blocks until a permit is added to its gate, then succeeds.
pub struct GatedStage {
    pub gate: Arc<Semaphore>,
    pub runs: AtomicUsize,
}

impl GatedStage {
    pub fn new(gate: Arc<Semaphore>) -> Self {
        Self {
            gate,
            runs: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl Stage for GatedStage {
    async fn execute(&self, _ctx: &StageContext) -> StageOutcome {
        self.runs.fetch_add(1, Ordering::SeqCst);
        match self.gate.acquire().await {
            Ok(permit) => {
                permit.forget();
                StageOutcome::empty()
            }
            Err(_) => StageOutcome::failure("gate closed"),
        }
    }
}

/// Builds a [`StageSet`] from fake stages.
#[derive(Default)]
pub struct StageSetBuilder {
    stages: Vec<StageDescriptor>,
}

impl StageSetBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stage(mut self, name: &str, target: f64, stage: Arc<dyn Stage>) -> Self {
        self.stages.push(StageDescriptor::new(
            name,
            description_for(name),
            target,
            stage,
        ));
        self
    }

    pub fn succeed(self, name: &str, target: f64) -> Self {
        let stage = Arc::new(SucceedStage {
            name: name.to_string(),
        });
        self.stage(name, target, stage)
    }

    pub fn fail(self, name: &str, target: f64, error: &str) -> Self {
        let stage = Arc::new(FailStage {
            error: error.to_string(),
        });
        self.stage(name, target, stage)
    }

    pub fn build(self) -> StageSet {
        StageSet::new(self.stages).expect("valid stage set")
    }
}

/// The message a fake stage writes once it has run.
pub fn description_for(name: &str) -> String {
    format!("Finished {}", name)
}

/// Stage targets used across the tests.
pub const FIVE_TARGETS: [f64; 5] = [0.1, 0.3, 0.5, 0.7, 1.0];

/// Five succeeding stages named `stage1`..`stage5`.
pub fn five_succeeding() -> StageSetBuilder {
    FIVE_TARGETS
        .iter()
        .enumerate()
        .fold(StageSetBuilder::new(), |b, (i, t)| {
            b.succeed(&format!("stage{}", i + 1), *t)
        })
}

/// Five stages that each wait on `gate`.
pub fn five_gated(gate: &Arc<Semaphore>) -> StageSet {
    FIVE_TARGETS
        .iter()
        .enumerate()
        .fold(StageSetBuilder::new(), |b, (i, t)| {
            b.stage(
                &format!("stage{}", i + 1),
                *t,
                Arc::new(GatedStage::new(Arc::clone(gate))),
            )
        })
        .build()
}

/// Notifier that keeps every record it was handed.
#[derive(Default)]
pub struct RecordingNotifier {
    pub notified: Mutex<Vec<JobRecord>>,
}

impl RecordingNotifier {
    pub fn records(&self) -> Vec<JobRecord> {
        self.notified.lock().unwrap().clone()
    }
}

#[async_trait]
impl CompletionNotifier for RecordingNotifier {
    async fn notify(&self, record: &JobRecord) -> Result<(), NotifyError> {
        self.notified.lock().unwrap().push(record.clone());
        Ok(())
    }
}

/// Reporter that blocks the job task on its terminal record until released.
///
/// Keeps a finished job registered with the scheduler for as long as a test
/// needs.
#[derive(Default)]
pub struct HoldTerminalProgress {
    released: Mutex<bool>,
    wake: Condvar,
}

impl HoldTerminalProgress {
    pub fn release(&self) {
        *self.released.lock().unwrap() = true;
        self.wake.notify_all();
    }
}

impl ProgressReporter for HoldTerminalProgress {
    fn report(&self, record: &JobRecord) {
        if !record.is_finished() {
            return;
        }
        let mut released = self.released.lock().unwrap();
        while !*released {
            released = self.wake.wait(released).unwrap();
        }
    }
}
