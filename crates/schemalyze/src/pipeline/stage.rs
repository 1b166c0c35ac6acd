use std::any::Any;
use std::panic::AssertUnwindSafe;

use async_trait::async_trait;
use futures_util::FutureExt;
use serde_json::{Map, Value};

/// Outputs of the stages that have already succeeded, keyed by field name.
pub type StageOutput = Map<String, Value>;

/// What a stage reports back to the runner.
#[derive(Debug, Clone, PartialEq)]
pub enum StageOutcome {
    Success { partial_result: StageOutput },
    Failure { error: String },
}

impl StageOutcome {
    pub fn success(partial_result: StageOutput) -> Self {
        StageOutcome::Success { partial_result }
    }

    /// Success without any output fields.
    pub fn empty() -> Self {
        StageOutcome::Success {
            partial_result: StageOutput::new(),
        }
    }

    pub fn failure(error: impl Into<String>) -> Self {
        StageOutcome::Failure {
            error: error.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, StageOutcome::Success { .. })
    }
}

/// Inputs available to a stage while it runs.
#[derive(Debug, Clone)]
pub struct StageContext {
    pub job_id: String,
    pub schematic_id: String,
    pub source_ref: String,
    /// 1-based position of the stage in its set.
    pub stage_index: usize,
    /// Merged outputs of the stages before this one.
    pub outputs: StageOutput,
}

impl StageContext {
    pub fn new(job_id: &str, schematic_id: &str, source_ref: &str) -> Self {
        Self {
            job_id: job_id.to_string(),
            schematic_id: schematic_id.to_string(),
            source_ref: source_ref.to_string(),
            stage_index: 0,
            outputs: StageOutput::new(),
        }
    }

    /// Context for running a stage on its own, outside any job.
    pub fn standalone(source_ref: &str) -> Self {
        Self::new("standalone", "standalone", source_ref)
    }
}

/// One unit of pipeline work.
///
/// The runner never looks at what a stage does, only at the outcome.
#[async_trait]
pub trait Stage: Send + Sync {
    async fn execute(&self, ctx: &StageContext) -> StageOutcome;
}

/// Runs `stage`, turning a panic into a failure outcome.
pub async fn execute_contained(stage: &dyn Stage, ctx: &StageContext) -> StageOutcome {
    AssertUnwindSafe(stage.execute(ctx))
        .catch_unwind()
        .await
        .unwrap_or_else(|panic| {
            StageOutcome::failure(format!("stage panicked: {}", panic_message(panic.as_ref())))
        })
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
