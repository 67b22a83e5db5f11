//! Background directory archiving for nimbus.
//!
//! This module provides:
//! - Zip archive building with progress reporting
//! - A concurrent registry of archive jobs
//! - A supervisor that runs builds on bounded blocking workers
//! - Scoped artifacts that delete their temporary file on drop
//!
//! Job lifecycle:
//! ```text
//! Processing --(build ok)--> Complete --(retrieved)--> [removed]
//! Processing --(build error)--> Failed
//! ```

mod artifact;
pub mod builder;
mod job;
mod registry;
mod supervisor;

pub use artifact::ArchiveArtifact;
pub use builder::{build, BuildSummary};
pub use job::{artifact_path_for, display_name_for, ArchiveJob, JobId, JobState};
pub use registry::JobRegistry;
pub use supervisor::ArchiveSupervisor;
