use crate::broadcast::{JobEvent, JobEventBroadcaster};
use crate::job::JobRecord;

/// Receives the job state after every transition the runner commits.
pub trait ProgressReporter: Send + Sync {
    fn report(&self, record: &JobRecord);
}

/// No-op reporter for unit tests.
pub struct NoopProgress;

impl ProgressReporter for NoopProgress {
    fn report(&self, _record: &JobRecord) {}
}

/// Bridges committed transitions to the event broadcast channel.
pub struct BroadcastProgress {
    broadcaster: JobEventBroadcaster,
}

impl BroadcastProgress {
    pub fn new(broadcaster: JobEventBroadcaster) -> Self {
        Self { broadcaster }
    }
}

impl ProgressReporter for BroadcastProgress {
    fn report(&self, record: &JobRecord) {
        self.broadcaster.send(JobEvent::from_record(record));
    }
}
