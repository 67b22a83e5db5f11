//! Storage module for nimbus.
//!
//! This module owns everything that touches the storage root:
//! - Sandboxed resolution of user supplied paths
//! - Listing, upload, download, deletion and directory creation
//! - Usage totals and name search

pub mod sandbox;
mod service;

pub use sandbox::{resolve, validate_component, ResolvedPath, StorageRoot};
pub use service::{DownloadTarget, EntryInfo, StorageService, StorageUsage};

/// Default maximum upload size (512MB).
pub const DEFAULT_MAX_UPLOAD_SIZE: u64 = 512 * 1024 * 1024;

/// Default maximum number of search results.
pub const DEFAULT_SEARCH_LIMIT: usize = 200;
