//! Job storage.
//!
//! The pipeline only talks to a [`JobStore`], so a persistent or shared
//! backend can replace [`MemoryJobStore`] without touching the runner.

pub mod memory;

use chrono::{DateTime, Utc};

use crate::error::JobError;
use crate::job::{JobRecord, NewJob};

pub use memory::MemoryJobStore;

/// Concurrency-safe mapping from job id to [`JobRecord`].
pub trait JobStore: Send + Sync {
    /// Inserts a new queued record and returns it.
    fn create(&self, job: NewJob) -> JobRecord;

    /// Returns a snapshot of the record, or `NotFound`.
    fn get(&self, id: &str) -> Result<JobRecord, JobError>;

    /// Applies `f` to the record as one atomic read-modify-write.
    ///
    /// If `f` returns an error the stored record is left unchanged.
    /// On success the updated snapshot is returned.
    fn mutate(
        &self,
        id: &str,
        f: &mut dyn FnMut(&mut JobRecord) -> Result<(), JobError>,
    ) -> Result<JobRecord, JobError>;

    /// Removes terminal jobs that finished before `cutoff`. Returns the number removed.
    fn remove_finished_before(&self, cutoff: DateTime<Utc>) -> usize;

    /// Number of stored jobs.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
