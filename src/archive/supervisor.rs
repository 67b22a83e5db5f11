//! Archive job supervisor.
//!
//! The supervisor creates jobs, runs the builder on blocking worker threads
//! and hands out finished archives. At most `max_concurrent_builds` builds
//! run at once; further jobs stay `Processing` at 0% until a worker frees up.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::Semaphore;
use tracing::{debug, error, info, warn};

use super::artifact::ArchiveArtifact;
use super::builder;
use super::job::{ArchiveJob, JobId};
use super::registry::JobRegistry;
use crate::config::ArchiveConfig;
use crate::storage::ResolvedPath;
use crate::{NimbusError, Result};

/// Orchestrates archive job lifecycle.
#[derive(Debug)]
pub struct ArchiveSupervisor {
    registry: Arc<JobRegistry>,
    scratch_dir: PathBuf,
    workers: Arc<Semaphore>,
}

impl ArchiveSupervisor {
    /// Create a supervisor writing archives into `scratch_dir`.
    ///
    /// The scratch directory is created if it doesn't exist and is kept in
    /// canonical form.
    pub fn new(scratch_dir: impl Into<PathBuf>, max_concurrent_builds: usize) -> Result<Self> {
        let scratch_dir: PathBuf = scratch_dir.into();
        if max_concurrent_builds == 0 {
            return Err(NimbusError::Config(
                "at least one archive worker is required".to_string(),
            ));
        }
        fs::create_dir_all(&scratch_dir)?;
        let scratch_dir = scratch_dir.canonicalize()?;

        Ok(Self {
            registry: Arc::new(JobRegistry::new()),
            scratch_dir,
            workers: Arc::new(Semaphore::new(max_concurrent_builds)),
        })
    }

    /// Create a supervisor from configuration.
    pub fn from_config(config: &ArchiveConfig) -> Result<Self> {
        Self::new(config.scratch_path(), config.max_concurrent_builds)
    }

    /// The job registry.
    pub fn registry(&self) -> &JobRegistry {
        &self.registry
    }

    /// Directory temporary archives are written to.
    pub fn scratch_dir(&self) -> &Path {
        &self.scratch_dir
    }

    /// Start archiving `source` in the background.
    ///
    /// Returns the new job ID without waiting for the build. Must be called
    /// from within a tokio runtime (blocking pool threads included).
    pub fn start_job(&self, source: ResolvedPath) -> Result<JobId> {
        if !source.as_path().is_dir() {
            return Err(NimbusError::SourceNotFound(source.to_string()));
        }

        let job = self.registry.create(source.into_path_buf(), &self.scratch_dir);
        let id = job.id;
        info!(
            job_id = %id,
            source = %job.source_path.display(),
            display_name = %job.display_name,
            "Archive job created"
        );

        tokio::spawn(run_job(
            Arc::clone(&self.registry),
            Arc::clone(&self.workers),
            job,
        ));

        Ok(id)
    }

    /// Current state of a job.
    pub fn status(&self, id: JobId) -> Result<ArchiveJob> {
        self.registry
            .get(id)
            .ok_or_else(|| NimbusError::NotFound("Archive job".to_string()))
    }

    /// All known jobs, oldest first.
    pub fn list(&self) -> Vec<ArchiveJob> {
        self.registry.list()
    }

    /// Take the archive of a completed job.
    ///
    /// The job is removed immediately, so a second call returns `NotFound`.
    /// The file itself is deleted when the returned artifact is dropped.
    pub fn retrieve(&self, id: JobId) -> Result<ArchiveArtifact> {
        let job = self.registry.take_completed(id)?;
        match ArchiveArtifact::from_job(job) {
            Ok(artifact) => {
                info!(job_id = %id, size = artifact.size(), "Archive retrieved");
                Ok(artifact)
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                warn!(job_id = %id, "Archive artifact vanished before retrieval");
                Err(NimbusError::NotFound("Archive file".to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Remove finished jobs older than `ttl` along with their files.
    ///
    /// Returns the number of jobs removed.
    pub fn sweep_stale(&self, ttl: Duration) -> usize {
        let ttl = chrono::Duration::from_std(ttl).unwrap_or(chrono::Duration::MAX);
        let cutoff = Utc::now().checked_sub_signed(ttl).unwrap_or(chrono::DateTime::<Utc>::MIN_UTC);

        let removed = self.registry.remove_finished_before(cutoff);
        for job in &removed {
            discard_artifact(job.id, &job.artifact_path);
        }
        removed.len()
    }

    /// Start the stale job sweep background task.
    ///
    /// Does nothing when `interval` is zero.
    pub fn start_sweep_task(self: &Arc<Self>, interval: Duration, ttl: Duration) {
        if interval.is_zero() {
            return;
        }

        let supervisor = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);

            // Skip the first immediate tick
            ticker.tick().await;

            loop {
                ticker.tick().await;

                let count = supervisor.sweep_stale(ttl);
                if count > 0 {
                    info!(removed_count = count, "Swept stale archive jobs");
                } else {
                    debug!("No stale archive jobs to sweep");
                }
            }
        });
    }
}

/// Run one job to completion: wait for a worker, build, record the outcome.
async fn run_job(registry: Arc<JobRegistry>, workers: Arc<Semaphore>, job: ArchiveJob) {
    let id = job.id;

    let _permit = match workers.acquire_owned().await {
        Ok(permit) => permit,
        Err(_) => {
            registry.fail(id, "archive workers are shut down");
            return;
        }
    };
    debug!(job_id = %id, "Archive build started");

    let source = job.source_path.clone();
    let artifact = job.artifact_path.clone();
    let progress = Arc::clone(&registry);
    let result = tokio::task::spawn_blocking(move || {
        builder::build(&source, &artifact, |percent| {
            progress.update_progress(id, percent);
        })
    })
    .await;

    match result {
        Ok(Ok(summary)) => {
            registry.complete(id);
            info!(
                job_id = %id,
                entries = summary.entries,
                bytes = summary.bytes,
                "Archive job complete"
            );
        }
        Ok(Err(e)) => {
            discard_artifact(id, &job.artifact_path);
            let detail = failure_detail(e);
            warn!(job_id = %id, error = %detail, "Archive job failed");
            registry.fail(id, detail);
        }
        Err(e) => {
            discard_artifact(id, &job.artifact_path);
            error!(job_id = %id, error = %e, "Archive worker panicked");
            registry.fail(id, "archive worker panicked");
        }
    }
}

fn failure_detail(e: NimbusError) -> String {
    match e {
        NimbusError::Build(msg) => msg,
        other => other.to_string(),
    }
}

fn discard_artifact(id: JobId, path: &Path) {
    match fs::remove_file(path) {
        Ok(()) => debug!(job_id = %id, "Discarded archive file"),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => warn!(
            job_id = %id,
            path = %path.display(),
            error = %e,
            "Failed to discard archive file"
        ),
    }
}
