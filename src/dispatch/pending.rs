//! Outstanding jobs, keyed by identifier.

use std::collections::HashMap;

use crate::job::{Job, JobId};

/// Jobs still waiting for a result.
///
/// Owned by the dispatcher for the duration of a run; callers only see
/// read-only views.
#[derive(Debug, Clone, Default)]
pub struct PendingSet {
    jobs: HashMap<JobId, Job>,
}

impl PendingSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Track a job. Returns `false` if its id was already pending.
    pub fn insert(&mut self, job: Job) -> bool {
        use std::collections::hash_map::Entry;

        match self.jobs.entry(job.id) {
            Entry::Occupied(_) => false,
            Entry::Vacant(slot) => {
                slot.insert(job);
                true
            }
        }
    }

    /// Remove and return the job for `id`, if it is still pending.
    pub(crate) fn resolve(&mut self, id: JobId) -> Option<Job> {
        self.jobs.remove(&id)
    }

    pub fn contains(&self, id: JobId) -> bool {
        self.jobs.contains_key(&id)
    }

    pub fn get(&self, id: JobId) -> Option<&Job> {
        self.jobs.get(&id)
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    /// Pending identifiers in ascending order.
    pub fn outstanding(&self) -> Vec<JobId> {
        let mut ids: Vec<JobId> = self.jobs.keys().copied().collect();
        ids.sort_unstable();
        ids
    }
}

impl FromIterator<Job> for PendingSet {
    fn from_iter<I: IntoIterator<Item = Job>>(iter: I) -> Self {
        let mut set = Self::new();
        for job in iter {
            set.insert(job);
        }
        set
    }
}

impl From<&[Job]> for PendingSet {
    fn from(jobs: &[Job]) -> Self {
        jobs.iter().cloned().collect()
    }
}
