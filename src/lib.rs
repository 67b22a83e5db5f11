//! nimbus - personal cloud storage backend
//!
//! Serves a single sandboxed storage root over HTTP and builds zip archives
//! of directories in the background.

pub mod archive;
pub mod config;
pub mod error;
pub mod logging;
pub mod storage;
pub mod web;

pub use archive::{ArchiveArtifact, ArchiveJob, ArchiveSupervisor, JobId, JobRegistry, JobState};
pub use config::Config;
pub use error::{NimbusError, Result};
pub use storage::{ResolvedPath, StorageRoot, StorageService};
