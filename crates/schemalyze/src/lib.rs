pub mod broadcast;
pub mod config;
pub mod error;
pub mod job;
pub mod logging;
pub mod pipeline;
pub mod scheduler;
pub mod store;

pub use broadcast::{JobEvent, JobEventBroadcaster};
pub use config::{load_config, load_service_config, ServiceConfig};
pub use error::{
    ConfigError, JobError, NotifyError, Result, SchemalyzeError, StageSetError, SubmitError,
};
pub use job::{JobRecord, JobStatus, JobStatusView, NewJob};
pub use pipeline::{
    default_stage_set, PipelineRunner, RetryPolicy, Stage, StageContext, StageDescriptor,
    StageOutcome, StageOutput, StageSet,
};
pub use scheduler::{DuplicatePolicy, Scheduler, SchedulerOptions, SubmitRequest};
pub use store::{JobStore, MemoryJobStore};
