//! Concurrent registry of archive jobs.
//!
//! The registry is the only shared mutable state of the archive subsystem.
//! Every operation holds the lock for its whole read or read-modify-write,
//! so callers always observe complete job records.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::job::{ArchiveJob, JobId, JobState};
use crate::{NimbusError, Result};

/// Registry of archive jobs indexed by ID.
#[derive(Debug, Default)]
pub struct JobRegistry {
    jobs: RwLock<HashMap<JobId, ArchiveJob>>,
}

impl JobRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    // Mutations never leave a record half written, so a poisoned map is
    // still consistent.
    fn read(&self) -> RwLockReadGuard<'_, HashMap<JobId, ArchiveJob>> {
        self.jobs.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<JobId, ArchiveJob>> {
        self.jobs.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register a new `Processing` job under a fresh ID.
    pub fn create(&self, source_path: PathBuf, scratch_dir: &Path) -> ArchiveJob {
        let mut jobs = self.write();

        let mut id = Uuid::new_v4();
        while jobs.contains_key(&id) {
            id = Uuid::new_v4();
        }

        let job = ArchiveJob::new(id, source_path, scratch_dir);
        jobs.insert(id, job.clone());
        job
    }

    /// Record build progress.
    ///
    /// Ignored unless the job is `Processing`. The stored value never
    /// decreases. Returns whether the job was updated.
    pub fn update_progress(&self, id: JobId, percent: u8) -> bool {
        let mut jobs = self.write();
        match jobs.get_mut(&id) {
            Some(job) if job.state == JobState::Processing => {
                job.progress_percent = job.progress_percent.max(percent.min(100));
                true
            }
            _ => false,
        }
    }

    /// Move a `Processing` job to `Complete`.
    pub fn complete(&self, id: JobId) -> bool {
        self.finish(id, JobState::Complete, None)
    }

    /// Move a `Processing` job to `Failed`.
    pub fn fail(&self, id: JobId, detail: impl Into<String>) -> bool {
        self.finish(id, JobState::Failed, Some(detail.into()))
    }

    fn finish(&self, id: JobId, state: JobState, detail: Option<String>) -> bool {
        let mut jobs = self.write();
        match jobs.get_mut(&id) {
            Some(job) if job.state == JobState::Processing => {
                job.state = state;
                if state == JobState::Complete {
                    job.progress_percent = 100;
                }
                job.error_detail = detail;
                job.finished_at = Some(Utc::now());
                true
            }
            Some(job) => {
                tracing::warn!(
                    job_id = %id,
                    state = %job.state,
                    requested = %state,
                    "Ignoring second terminal transition"
                );
                false
            }
            None => false,
        }
    }

    /// Snapshot of a job.
    pub fn get(&self, id: JobId) -> Option<ArchiveJob> {
        self.read().get(&id).cloned()
    }

    /// Remove a job, returning its last state.
    pub fn remove(&self, id: JobId) -> Option<ArchiveJob> {
        self.write().remove(&id)
    }

    /// Remove a job only if it is `Complete`.
    ///
    /// The check and the removal happen under one lock, so exactly one of
    /// several concurrent callers gets the job.
    pub fn take_completed(&self, id: JobId) -> Result<ArchiveJob> {
        let mut jobs = self.write();
        match jobs.get(&id).map(|job| job.state) {
            None => Err(NimbusError::NotFound("Archive job".to_string())),
            Some(JobState::Complete) => jobs
                .remove(&id)
                .ok_or_else(|| NimbusError::NotFound("Archive job".to_string())),
            Some(state) => Err(NimbusError::NotReady(format!("archive job is {state}"))),
        }
    }

    /// Remove finished jobs whose `finished_at` is at or before `cutoff`.
    pub fn remove_finished_before(&self, cutoff: DateTime<Utc>) -> Vec<ArchiveJob> {
        let mut jobs = self.write();
        let stale: Vec<JobId> = jobs
            .values()
            .filter(|job| job.finished_at.is_some_and(|t| t <= cutoff))
            .map(|job| job.id)
            .collect();

        stale.iter().filter_map(|id| jobs.remove(id)).collect()
    }

    /// Snapshot of all jobs, oldest first.
    pub fn list(&self) -> Vec<ArchiveJob> {
        let mut jobs: Vec<ArchiveJob> = self.read().values().cloned().collect();
        jobs.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        jobs
    }

    /// Number of registered jobs.
    pub fn len(&self) -> usize {
        self.read().len()
    }

    /// Whether the registry has no jobs.
    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    fn create_job(registry: &JobRegistry) -> ArchiveJob {
        registry.create(PathBuf::from("/srv/storage/docs"), Path::new("/tmp"))
    }

    #[test]
    fn test_create_and_get() {
        let registry = JobRegistry::new();
        let job = create_job(&registry);

        let fetched = registry.get(job.id).unwrap();
        assert_eq!(fetched.state, JobState::Processing);
        assert_eq!(fetched.progress_percent, 0);
        assert_eq!(fetched.display_name, "docs.zip");
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_create_unique_ids() {
        let registry = JobRegistry::new();
        let a = create_job(&registry);
        let b = create_job(&registry);

        assert_ne!(a.id, b.id);
        assert_ne!(a.artifact_path, b.artifact_path);
    }

    #[test]
    fn test_get_unknown() {
        let registry = JobRegistry::new();
        assert!(registry.get(Uuid::new_v4()).is_none());
    }

    #[test]
    fn test_progress_never_decreases() {
        let registry = JobRegistry::new();
        let job = create_job(&registry);

        assert!(registry.update_progress(job.id, 40));
        assert!(registry.update_progress(job.id, 20));
        assert_eq!(registry.get(job.id).unwrap().progress_percent, 40);

        registry.update_progress(job.id, 250);
        assert_eq!(registry.get(job.id).unwrap().progress_percent, 100);
    }

    #[test]
    fn test_progress_ignored_after_terminal() {
        let registry = JobRegistry::new();
        let job = create_job(&registry);

        registry.fail(job.id, "disk full");
        assert!(!registry.update_progress(job.id, 50));
        assert_eq!(registry.get(job.id).unwrap().progress_percent, 0);
    }

    #[test]
    fn test_complete_sets_full_progress() {
        let registry = JobRegistry::new();
        let job = create_job(&registry);

        assert!(registry.complete(job.id));

        let done = registry.get(job.id).unwrap();
        assert_eq!(done.state, JobState::Complete);
        assert_eq!(done.progress_percent, 100);
        assert!(done.error_detail.is_none());
        assert!(done.finished_at.is_some());
    }

    #[test]
    fn test_fail_records_detail() {
        let registry = JobRegistry::new();
        let job = create_job(&registry);

        assert!(registry.fail(job.id, "permission denied"));

        let failed = registry.get(job.id).unwrap();
        assert_eq!(failed.state, JobState::Failed);
        assert_eq!(failed.error_detail.as_deref(), Some("permission denied"));
    }

    #[test]
    fn test_second_terminal_transition_ignored() {
        let registry = JobRegistry::new();
        let job = create_job(&registry);

        assert!(registry.complete(job.id));
        assert!(!registry.fail(job.id, "late failure"));

        let done = registry.get(job.id).unwrap();
        assert_eq!(done.state, JobState::Complete);
        assert!(done.error_detail.is_none());
    }

    #[test]
    fn test_take_completed() {
        let registry = JobRegistry::new();
        let job = create_job(&registry);

        assert!(matches!(
            registry.take_completed(job.id),
            Err(NimbusError::NotReady(_))
        ));
        // Still there and untouched
        assert_eq!(registry.get(job.id).unwrap().state, JobState::Processing);

        registry.complete(job.id);
        assert_eq!(registry.take_completed(job.id).unwrap().id, job.id);
        assert!(matches!(
            registry.take_completed(job.id),
            Err(NimbusError::NotFound(_))
        ));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_take_failed_is_not_ready() {
        let registry = JobRegistry::new();
        let job = create_job(&registry);
        registry.fail(job.id, "boom");

        assert!(matches!(
            registry.take_completed(job.id),
            Err(NimbusError::NotReady(_))
        ));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_remove() {
        let registry = JobRegistry::new();
        let job = create_job(&registry);

        assert!(registry.remove(job.id).is_some());
        assert!(registry.remove(job.id).is_none());
    }

    #[test]
    fn test_remove_finished_before() {
        let registry = JobRegistry::new();
        let running = create_job(&registry);
        let done = create_job(&registry);
        registry.complete(done.id);

        let removed = registry.remove_finished_before(Utc::now() + chrono::Duration::seconds(1));

        assert_eq!(removed.len(), 1);
        assert_eq!(removed[0].id, done.id);
        assert!(registry.get(running.id).is_some());
    }

    #[test]
    fn test_list_oldest_first() {
        let registry = JobRegistry::new();
        let first = create_job(&registry);
        let second = create_job(&registry);

        let ids: Vec<_> = registry.list().iter().map(|j| j.id).collect();
        assert_eq!(ids.len(), 2);
        assert!(ids.contains(&first.id) && ids.contains(&second.id));
    }

    #[test]
    fn test_concurrent_take_completed_single_winner() {
        let registry = Arc::new(JobRegistry::new());
        let job = create_job(&registry);
        registry.complete(job.id);

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let registry = Arc::clone(&registry);
                thread::spawn(move || registry.take_completed(job.id).is_ok())
            })
            .collect();

        let winners = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|won| *won)
            .count();
        assert_eq!(winners, 1);
    }

    #[test]
    fn test_concurrent_progress_updates() {
        let registry = Arc::new(JobRegistry::new());
        let job = create_job(&registry);

        let writer = {
            let registry = Arc::clone(&registry);
            thread::spawn(move || {
                for p in 0..=100u8 {
                    registry.update_progress(job.id, p);
                }
            })
        };

        let mut last = 0;
        for _ in 0..200 {
            let now = registry.get(job.id).unwrap().progress_percent;
            assert!(now >= last);
            last = now;
        }

        writer.join().unwrap();
        assert_eq!(registry.get(job.id).unwrap().progress_percent, 100);
    }
}
