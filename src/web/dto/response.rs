//! Response DTOs for Web API.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::archive::{ArchiveJob, JobId, JobState};
use crate::storage::{EntryInfo, StorageUsage};

/// Generic API response wrapper.
#[derive(Debug, Serialize)]
pub struct ApiResponse<T: Serialize> {
    /// Response data.
    pub data: T,
}

impl<T: Serialize> ApiResponse<T> {
    /// Create a new API response.
    pub fn new(data: T) -> Self {
        Self { data }
    }
}

/// Directory listing.
#[derive(Debug, Serialize)]
pub struct DirectoryListing {
    /// Listed directory, relative to the storage root.
    pub path: String,
    /// Entries, directories first.
    pub entries: Vec<EntryInfo>,
    /// Number of entries.
    pub count: usize,
}

/// Search results.
#[derive(Debug, Serialize)]
pub struct SearchResponse {
    /// The query as received.
    pub query: String,
    /// Matching entries.
    pub results: Vec<EntryInfo>,
}

/// Storage usage totals.
#[derive(Debug, Serialize)]
pub struct UsageResponse {
    /// Bytes used by regular files.
    pub used_bytes: u64,
    /// Number of regular files.
    pub file_count: u64,
    /// Number of directories.
    pub dir_count: u64,
}

impl From<StorageUsage> for UsageResponse {
    fn from(usage: StorageUsage) -> Self {
        Self {
            used_bytes: usage.used_bytes,
            file_count: usage.file_count,
            dir_count: usage.dir_count,
        }
    }
}

/// Simple status message.
#[derive(Debug, Serialize)]
pub struct MessageResponse {
    /// Message text.
    pub message: String,
}

/// Response to an archive job creation.
#[derive(Debug, Serialize)]
pub struct StartArchiveResponse {
    /// Job ID to poll.
    pub job_id: JobId,
    /// Status endpoint for the job.
    pub status_url: String,
}

/// Archive job status.
#[derive(Debug, Serialize)]
pub struct ArchiveJobResponse {
    /// Job ID.
    pub job_id: JobId,
    /// Current state.
    pub state: JobState,
    /// Build progress, 0-100.
    pub progress_percent: u8,
    /// Failure cause.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_detail: Option<String>,
    /// Archive filename.
    pub display_name: String,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Completion timestamp.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
}

impl From<ArchiveJob> for ArchiveJobResponse {
    fn from(job: ArchiveJob) -> Self {
        Self {
            job_id: job.id,
            state: job.state,
            progress_percent: job.progress_percent,
            error_detail: job.error_detail,
            display_name: job.display_name,
            created_at: job.created_at,
            finished_at: job.finished_at,
        }
    }
}
