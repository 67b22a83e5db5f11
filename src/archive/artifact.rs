//! Retrieved archive files.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use super::job::{ArchiveJob, JobId};

/// A finished archive handed out to exactly one caller.
///
/// The temporary file is deleted when this value is dropped, whichever way
/// the transfer ends. Keep it alive for as long as the file is being read.
#[derive(Debug)]
pub struct ArchiveArtifact {
    job_id: JobId,
    path: PathBuf,
    display_name: String,
    size: u64,
}

impl ArchiveArtifact {
    /// Take ownership of a completed job's artifact file.
    pub(crate) fn from_job(job: ArchiveJob) -> io::Result<Self> {
        let mut artifact = Self {
            job_id: job.id,
            path: job.artifact_path,
            display_name: job.display_name,
            size: 0,
        };
        // On error the guard drops here and removes whatever is left.
        artifact.size = fs::metadata(&artifact.path)?.len();
        Ok(artifact)
    }

    /// ID of the job that produced this archive.
    pub fn job_id(&self) -> JobId {
        self.job_id
    }

    /// Location of the archive file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Filename presented to the client.
    pub fn display_name(&self) -> &str {
        &self.display_name
    }

    /// Archive size in bytes.
    pub fn size(&self) -> u64 {
        self.size
    }
}

impl Drop for ArchiveArtifact {
    fn drop(&mut self) {
        match fs::remove_file(&self.path) {
            Ok(()) => tracing::debug!(job_id = %self.job_id, "Removed archive artifact"),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => tracing::warn!(
                job_id = %self.job_id,
                path = %self.path.display(),
                error = %e,
                "Failed to remove archive artifact"
            ),
        }
    }
}
