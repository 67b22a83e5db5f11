//! Archive job records.

use std::fmt;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

/// External handle of an archive job.
pub type JobId = Uuid;

/// Lifecycle state of an archive job.
///
/// A job starts in `Processing` and moves exactly once to either
/// `Complete` or `Failed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    /// The archive is being built (or waiting for a worker).
    Processing,
    /// The archive is ready for retrieval.
    Complete,
    /// The build failed; see `error_detail`.
    Failed,
}

impl JobState {
    /// Get the state name.
    pub fn as_str(&self) -> &'static str {
        match self {
            JobState::Processing => "processing",
            JobState::Complete => "complete",
            JobState::Failed => "failed",
        }
    }

    /// Whether the job has left `Processing`.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, JobState::Processing)
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One directory-to-archive task.
#[derive(Debug, Clone, Serialize)]
pub struct ArchiveJob {
    /// Job ID.
    pub id: JobId,
    /// Directory being archived.
    #[serde(skip)]
    pub source_path: PathBuf,
    /// Where the archive file is written.
    #[serde(skip)]
    pub artifact_path: PathBuf,
    /// Archive filename presented to the client.
    pub display_name: String,
    /// Current state.
    pub state: JobState,
    /// Build progress, 0-100.
    pub progress_percent: u8,
    /// Failure cause, only set when `state` is `Failed`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_detail: Option<String>,
    /// When the job was created.
    pub created_at: DateTime<Utc>,
    /// When the job left `Processing`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
}

impl ArchiveJob {
    /// Create a new job in `Processing` state.
    pub fn new(id: JobId, source_path: PathBuf, scratch_dir: &Path) -> Self {
        let display_name = display_name_for(&source_path);
        let artifact_path = artifact_path_for(scratch_dir, id, &display_name);

        Self {
            id,
            source_path,
            artifact_path,
            display_name,
            state: JobState::Processing,
            progress_percent: 0,
            error_detail: None,
            created_at: Utc::now(),
            finished_at: None,
        }
    }
}

/// Archive filename for a source directory: its base name plus `.zip`.
pub fn display_name_for(source: &Path) -> String {
    let base = source
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .filter(|n| !n.is_empty())
        .unwrap_or_else(|| "archive".to_string());
    format!("{base}.zip")
}

/// Temporary artifact location, `<scratch_dir>/<id>_<display_name>`.
pub fn artifact_path_for(scratch_dir: &Path, id: JobId, display_name: &str) -> PathBuf {
    scratch_dir.join(format!("{id}_{display_name}"))
}
