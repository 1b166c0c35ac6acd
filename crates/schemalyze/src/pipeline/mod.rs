pub mod phases;
pub mod progress;
pub mod retry;
pub mod runner;
pub mod stage;
pub mod stage_set;

pub use phases::default_stage_set;
pub use progress::{BroadcastProgress, NoopProgress, ProgressReporter};
pub use retry::RetryPolicy;
pub use runner::PipelineRunner;
pub use stage::{execute_contained, Stage, StageContext, StageOutcome, StageOutput};
pub use stage_set::{StageDescriptor, StageSet};
