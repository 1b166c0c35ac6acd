use std::collections::HashSet;
use std::sync::Arc;

use crate::error::StageSetError;

use super::retry::RetryPolicy;
use super::stage::Stage;

/// A named stage with its cumulative progress target.
#[derive(Clone)]
pub struct StageDescriptor {
    pub name: String,
    /// Message written to the job once the stage has run.
    pub description: String,
    pub target_progress: f64,
    pub retry: RetryPolicy,
    pub stage: Arc<dyn Stage>,
}

impl StageDescriptor {
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        target_progress: f64,
        stage: Arc<dyn Stage>,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            target_progress,
            retry: RetryPolicy::none(),
            stage,
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }
}

impl std::fmt::Debug for StageDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StageDescriptor")
            .field("name", &self.name)
            .field("target_progress", &self.target_progress)
            .field("retry", &self.retry)
            .finish()
    }
}

/// Ordered, validated list of stages.
///
/// Non-empty, names unique, targets strictly increasing within (0.0, 1.0]
/// and the last target exactly 1.0.
#[derive(Debug, Clone)]
pub struct StageSet {
    stages: Vec<StageDescriptor>,
}

impl StageSet {
    pub fn new(stages: Vec<StageDescriptor>) -> Result<Self, StageSetError> {
        let last = stages.last().ok_or(StageSetError::Empty)?;
        if last.target_progress != 1.0 {
            return Err(StageSetError::FinalNotComplete {
                name: last.name.clone(),
                target: last.target_progress,
            });
        }

        let mut names = HashSet::new();
        let mut previous = 0.0;
        for stage in &stages {
            if !names.insert(stage.name.as_str()) {
                return Err(StageSetError::DuplicateName(stage.name.clone()));
            }
            let target = stage.target_progress;
            if !(target > 0.0 && target <= 1.0) {
                return Err(StageSetError::OutOfRange {
                    name: stage.name.clone(),
                    target,
                });
            }
            if target <= previous {
                return Err(StageSetError::NotIncreasing {
                    name: stage.name.clone(),
                    target,
                    previous,
                });
            }
            previous = target;
        }

        Ok(Self { stages })
    }

    /// Replaces the retry policy of the named stage. Returns false if no stage has that name.
    pub fn set_retry(&mut self, name: &str, retry: RetryPolicy) -> bool {
        match self.stages.iter_mut().find(|s| s.name == name) {
            Some(stage) => {
                stage.retry = retry;
                true
            }
            None => false,
        }
    }

    pub fn get(&self, name: &str) -> Option<&StageDescriptor> {
        self.stages.iter().find(|s| s.name == name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &StageDescriptor> {
        self.stages.iter()
    }

    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }
}
