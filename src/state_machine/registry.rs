use std::collections::BTreeMap;

use super::job::Job;
use super::state::StateKind;
use crate::vendor::VendorId;

/// In-memory collection of the jobs of one run, split into jobs still in
/// play and jobs that have been finalized.
///
/// A vendor id lives in at most one of the two maps.
#[derive(Debug, Default)]
pub struct JobRegistry {
    active: BTreeMap<VendorId, Job>,
    completed: BTreeMap<VendorId, Job>,
}

impl JobRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `job` as active, returning any job it displaced.
    pub fn add(&mut self, job: Job) -> Option<Job> {
        let id = job.vendor_id.clone();
        let finalized = self.completed.remove(&id);
        let previous = self.active.insert(id.clone(), job);
        let displaced = previous.or(finalized);
        if displaced.is_some() {
            tracing::warn!(vendor = %id, "vendor id registered twice, previous job replaced");
        }
        displaced
    }

    #[allow(dead_code)]
    pub fn find(&self, vendor_id: &VendorId) -> Option<&Job> {
        self.active
            .get(vendor_id)
            .or_else(|| self.completed.get(vendor_id))
    }

    pub fn find_mut(&mut self, vendor_id: &VendorId) -> Option<&mut Job> {
        self.active.get_mut(vendor_id)
    }

    /// Active jobs in `state`. Finalized jobs are never listed.
    pub fn list_by_state(&self, state: StateKind) -> Vec<&Job> {
        self.active.values().filter(|j| j.kind() == state).collect()
    }

    /// Moves a job out of the active set. No-op when it is not active.
    pub fn finalize(&mut self, vendor_id: &VendorId) {
        if let Some(job) = self.active.remove(vendor_id) {
            self.completed.insert(vendor_id.clone(), job);
        }
    }

    /// Finalizes every active job that reached a terminal state and returns
    /// how many moved.
    pub fn finalize_terminal(&mut self) -> usize {
        let done: Vec<VendorId> = self
            .active
            .values()
            .filter(|j| j.is_terminal())
            .map(|j| j.vendor_id.clone())
            .collect();
        for id in &done {
            self.finalize(id);
        }
        done.len()
    }

    /// Count of jobs per state across both maps. Every state is present.
    pub fn status_counts(&self) -> BTreeMap<StateKind, usize> {
        let mut counts: BTreeMap<StateKind, usize> =
            StateKind::ALL.iter().map(|&k| (k, 0)).collect();
        for job in self.all_jobs() {
            *counts.entry(job.kind()).or_insert(0) += 1;
        }
        counts
    }

    /// Active jobs followed by finalized ones.
    pub fn all_jobs(&self) -> impl Iterator<Item = &Job> {
        self.active.values().chain(self.completed.values())
    }

    #[allow(dead_code)]
    pub fn len(&self) -> usize {
        self.active.len() + self.completed.len()
    }

    #[allow(dead_code)]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state_machine::{JobState, Quote};
    use crate::vendor::ContactMethod;

    fn job(index: usize, name: &str) -> Job {
        Job::new(
            VendorId::new(index, name),
            name,
            "plumbing",
            "Leaky faucet",
            ContactMethod::Unknown,
        )
    }

    fn waiting(index: usize, name: &str) -> Job {
        let mut j = job(index, name);
        j.update_state(JobState::Running, None).unwrap();
        j.update_state(JobState::Waiting, None).unwrap();
        j
    }

    #[test]
    fn find_checks_active_then_completed() {
        let mut reg = JobRegistry::new();
        let a = job(0, "A");
        let id = a.vendor_id.clone();
        reg.add(a);
        assert!(reg.find(&id).is_some());

        reg.finalize(&id);
        assert!(reg.find(&id).is_some());
        assert!(reg.find_mut(&id).is_none());
        assert!(reg.find(&VendorId::new(9, "missing")).is_none());
    }

    #[test]
    fn add_overwrites_same_id() {
        let mut reg = JobRegistry::new();
        reg.add(job(0, "A"));
        let displaced = reg.add(waiting(0, "A"));
        assert_eq!(displaced.unwrap().kind(), StateKind::Pending);
        assert_eq!(reg.len(), 1);
        assert_eq!(
            reg.find(&VendorId::new(0, "A")).unwrap().kind(),
            StateKind::Waiting
        );
    }

    #[test]
    fn add_after_finalize_keeps_one_map_per_id() {
        let mut reg = JobRegistry::new();
        let id = VendorId::new(0, "A");
        reg.add(job(0, "A"));
        reg.finalize(&id);
        reg.add(job(0, "A"));
        assert_eq!(reg.len(), 1);
        assert!(reg.find_mut(&id).is_some());
    }

    #[test]
    fn list_by_state_ignores_finalized_jobs() {
        let mut reg = JobRegistry::new();
        let mut done = waiting(0, "Done");
        done.mark_complete(Quote::new(Some(100.0), "ok")).unwrap();
        reg.add(done);
        reg.add(waiting(1, "Waiting"));

        assert_eq!(reg.list_by_state(StateKind::Completed).len(), 1);
        assert_eq!(reg.finalize_terminal(), 1);
        assert!(reg.list_by_state(StateKind::Completed).is_empty());
        assert_eq!(reg.list_by_state(StateKind::Waiting).len(), 1);
        assert_eq!(reg.status_counts()[&StateKind::Completed], 1);
    }

    #[test]
    fn finalize_missing_is_noop() {
        let mut reg = JobRegistry::new();
        reg.add(job(0, "A"));
        reg.finalize(&VendorId::new(5, "Z"));
        assert_eq!(reg.len(), 1);
        assert_eq!(reg.list_by_state(StateKind::Pending).len(), 1);
    }

    #[test]
    fn status_counts_cover_every_state_and_sum_to_total() {
        let mut reg = JobRegistry::new();
        assert_eq!(reg.status_counts().len(), StateKind::ALL.len());
        assert_eq!(reg.status_counts().values().sum::<usize>(), 0);

        for i in 0..6 {
            reg.add(waiting(i, &format!("Vendor {i}")));
        }
        let ids: Vec<VendorId> = reg.all_jobs().map(|j| j.vendor_id.clone()).collect();
        for (n, id) in ids.iter().enumerate() {
            if n % 2 == 0 {
                reg.find_mut(id).unwrap().mark_failed("declined").unwrap();
            }
            if n % 3 == 0 {
                reg.finalize(id);
            }
            assert_eq!(reg.status_counts().values().sum::<usize>(), 6);
        }
        let counts = reg.status_counts();
        assert_eq!(counts[&StateKind::Failed], 3);
        assert_eq!(counts[&StateKind::Waiting], 3);
        assert_eq!(counts[&StateKind::Pending], 0);
    }
}
