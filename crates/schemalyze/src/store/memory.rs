//! In-memory job store with striped locking.

use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::{DateTime, Utc};

use crate::error::JobError;
use crate::job::{JobRecord, NewJob};

use super::JobStore;

const DEFAULT_SHARDS: usize = 16;

type Shard = RwLock<HashMap<String, JobRecord>>;

/// Process-local job store.
///
/// Records are spread over a fixed number of shards, each behind its own
/// `RwLock`, so a runner updating one job never blocks lookups of jobs that
/// hash to other shards. Critical sections are a single map operation.
pub struct MemoryJobStore {
    shards: Vec<Shard>,
}

impl MemoryJobStore {
    pub fn new() -> Self {
        Self::with_shards(DEFAULT_SHARDS)
    }

    /// Creates a store with `shards` lock stripes (at least one).
    pub fn with_shards(shards: usize) -> Self {
        let shards = shards.max(1);
        Self {
            shards: (0..shards).map(|_| RwLock::new(HashMap::new())).collect(),
        }
    }

    fn shard(&self, id: &str) -> &Shard {
        let mut hasher = DefaultHasher::new();
        id.hash(&mut hasher);
        let index = (hasher.finish() as usize) % self.shards.len();
        &self.shards[index]
    }

    fn read(shard: &Shard) -> RwLockReadGuard<'_, HashMap<String, JobRecord>> {
        match shard.read() {
            Ok(g) => g,
            Err(poisoned) => {
                log::warn!("Job store shard lock was poisoned, recovering");
                poisoned.into_inner()
            }
        }
    }

    fn write(shard: &Shard) -> RwLockWriteGuard<'_, HashMap<String, JobRecord>> {
        match shard.write() {
            Ok(g) => g,
            Err(poisoned) => {
                log::warn!("Job store shard lock was poisoned, recovering");
                poisoned.into_inner()
            }
        }
    }
}

impl Default for MemoryJobStore {
    fn default() -> Self {
        Self::new()
    }
}

impl JobStore for MemoryJobStore {
    fn create(&self, job: NewJob) -> JobRecord {
        let mut record = JobRecord::new(job);
        let mut shard = Self::write(self.shard(&record.id));

        // Ids are never reused.
        while shard.contains_key(&record.id) {
            record.id = uuid::Uuid::new_v4().to_string();
        }

        shard.insert(record.id.clone(), record.clone());
        log::debug!(
            "Created job {} for schematic {}",
            record.id,
            record.schematic_id
        );
        record
    }

    fn get(&self, id: &str) -> Result<JobRecord, JobError> {
        Self::read(self.shard(id))
            .get(id)
            .cloned()
            .ok_or_else(|| JobError::NotFound(id.to_string()))
    }

    fn mutate(
        &self,
        id: &str,
        f: &mut dyn FnMut(&mut JobRecord) -> Result<(), JobError>,
    ) -> Result<JobRecord, JobError> {
        let mut shard = Self::write(self.shard(id));
        let record = shard
            .get_mut(id)
            .ok_or_else(|| JobError::NotFound(id.to_string()))?;

        let mut updated = record.clone();
        f(&mut updated)?;
        *record = updated.clone();
        Ok(updated)
    }

    fn remove_finished_before(&self, cutoff: DateTime<Utc>) -> usize {
        let mut removed = 0;
        for shard in &self.shards {
            let mut shard = Self::write(shard);
            let before = shard.len();
            shard.retain(|_, job| match job.finished_at {
                Some(finished) if job.is_finished() => finished >= cutoff,
                _ => true,
            });
            removed += before - shard.len();
        }
        removed
    }

    fn len(&self) -> usize {
        self.shards.iter().map(|s| Self::read(s).len()).sum()
    }
}
