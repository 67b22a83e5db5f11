//! Shared helpers for the HTTP API tests.

#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use axum_test::TestServer;
use serde_json::Value;
use tempfile::TempDir;

use nimbus::web::handlers::AppState;
use nimbus::web::router::create_router;
use nimbus::{ArchiveSupervisor, StorageRoot, StorageService};

/// Maximum time to wait for an archive job.
pub const JOB_TIMEOUT: Duration = Duration::from_secs(10);

/// A test server over a temporary storage root.
pub struct TestContext {
    pub server: TestServer,
    pub storage_root: PathBuf,
    pub scratch_dir: PathBuf,
    pub archives: Arc<ArchiveSupervisor>,
    _temp: TempDir,
}

impl TestContext {
    /// Create a context with default limits.
    pub fn new() -> Self {
        Self::with_limits(1024 * 1024, 2)
    }

    /// Create a context with a given upload limit and worker count.
    pub fn with_limits(max_upload_size: u64, workers: usize) -> Self {
        let temp = TempDir::new().expect("Failed to create temp dir");
        let root = StorageRoot::open(temp.path().join("storage")).expect("Failed to open root");
        let storage_root = root.path().to_path_buf();
        let scratch_dir = temp.path().join("scratch");

        let storage = StorageService::new(root).with_max_upload_size(max_upload_size);
        let archives = Arc::new(
            ArchiveSupervisor::new(&scratch_dir, workers).expect("Failed to create supervisor"),
        );

        let app_state = Arc::new(AppState::new(storage, Arc::clone(&archives)));
        let router = create_router(app_state, &[]);
        let server = TestServer::new(router).expect("Failed to create test server");

        Self {
            server,
            storage_root,
            scratch_dir,
            archives,
            _temp: temp,
        }
    }

    /// Write a file below the storage root, creating parents.
    pub fn write_file(&self, relative: &str, content: &[u8]) {
        let path = self.storage_root.join(relative);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).unwrap();
        }
        std::fs::write(path, content).unwrap();
    }

    /// Create a directory below the storage root.
    pub fn create_dir(&self, relative: &str) {
        std::fs::create_dir_all(self.storage_root.join(relative)).unwrap();
    }

    /// Number of files currently in the scratch directory.
    pub fn scratch_file_count(&self) -> usize {
        count_files(&self.scratch_dir)
    }

    /// Start an archive job and return its ID.
    pub async fn start_archive(&self, path: &str) -> String {
        let response = self
            .server
            .post("/api/archives")
            .json(&serde_json::json!({ "path": path }))
            .await;
        response.assert_status(axum::http::StatusCode::ACCEPTED);

        let body: Value = response.json();
        body["data"]["job_id"].as_str().unwrap().to_string()
    }

    /// Poll a job until it leaves `processing`, returning every observed
    /// progress value and the final job body.
    pub async fn wait_for_job(&self, job_id: &str) -> (Vec<u64>, Value) {
        let mut observed = Vec::new();
        let deadline = tokio::time::Instant::now() + JOB_TIMEOUT;

        loop {
            let response = self.server.get(&format!("/api/archives/{job_id}")).await;
            response.assert_status_ok();
            let body: Value = response.json();
            let job = body["data"].clone();

            observed.push(job["progress_percent"].as_u64().unwrap());
            if job["state"] != "processing" {
                return (observed, job);
            }

            assert!(
                tokio::time::Instant::now() < deadline,
                "archive job {job_id} did not finish"
            );
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }
}

fn count_files(dir: &Path) -> usize {
    std::fs::read_dir(dir)
        .map(|entries| entries.filter_map(|e| e.ok()).count())
        .unwrap_or(0)
}

/// Entry names of a zip archive, sorted.
pub fn zip_entry_names(bytes: &[u8]) -> Vec<String> {
    let mut archive = zip::ZipArchive::new(std::io::Cursor::new(bytes)).unwrap();
    let mut names: Vec<String> = (0..archive.len())
        .map(|i| archive.by_index(i).unwrap().name().to_string())
        .collect();
    names.sort();
    names
}

/// Read one entry of a zip archive as a string.
pub fn zip_entry_text(bytes: &[u8], name: &str) -> String {
    use std::io::Read;

    let mut archive = zip::ZipArchive::new(std::io::Cursor::new(bytes)).unwrap();
    let mut entry = archive.by_name(name).unwrap();
    let mut text = String::new();
    entry.read_to_string(&mut text).unwrap();
    text
}
