//! Storage service for nimbus.
//!
//! This module provides the file operations exposed to clients:
//! - Directory listing and creation
//! - Upload with size checks
//! - Download and deletion
//! - Usage totals and name search
//!
//! All user paths go through [`StorageRoot::resolve`] first.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::Serialize;
use walkdir::WalkDir;

use super::sandbox::{to_slash, validate_component, ResolvedPath, StorageRoot};
use super::{DEFAULT_MAX_UPLOAD_SIZE, DEFAULT_SEARCH_LIMIT};
use crate::{NimbusError, Result};

/// A single directory entry.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct EntryInfo {
    /// File or directory name.
    pub name: String,
    /// Path relative to the storage root, `/` separated.
    pub path: String,
    /// Whether the entry is a directory.
    pub is_dir: bool,
    /// Size in bytes (0 for directories).
    pub size: u64,
    /// Last modification time.
    pub modified: Option<DateTime<Utc>>,
}

/// Storage usage totals.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq, Default)]
pub struct StorageUsage {
    /// Total bytes of regular files.
    pub used_bytes: u64,
    /// Number of regular files.
    pub file_count: u64,
    /// Number of directories, not counting the root.
    pub dir_count: u64,
}

/// A file opened for download.
#[derive(Debug)]
pub struct DownloadTarget {
    /// Resolved path of the file.
    pub path: ResolvedPath,
    /// File name presented to the client.
    pub filename: String,
    /// File size in bytes.
    pub size: u64,
}

/// Storage service for sandboxed file operations.
#[derive(Debug, Clone)]
pub struct StorageService {
    root: StorageRoot,
    max_upload_size: u64,
}

impl StorageService {
    /// Create a new StorageService over the given root.
    pub fn new(root: StorageRoot) -> Self {
        Self {
            root,
            max_upload_size: DEFAULT_MAX_UPLOAD_SIZE,
        }
    }

    /// Set the maximum upload size in bytes.
    pub fn with_max_upload_size(mut self, max_size: u64) -> Self {
        self.max_upload_size = max_size;
        self
    }

    /// The storage root.
    pub fn root(&self) -> &StorageRoot {
        &self.root
    }

    /// Maximum upload size in bytes.
    pub fn max_upload_size(&self) -> u64 {
        self.max_upload_size
    }

    /// Resolve a user path against the root.
    pub fn resolve(&self, user_path: &str) -> Result<ResolvedPath> {
        self.root.resolve(user_path)
    }

    /// List the contents of a directory.
    ///
    /// Directories come first, then files, each sorted by name.
    pub fn list(&self, user_path: &str) -> Result<Vec<EntryInfo>> {
        let dir = self.resolve(user_path)?;
        if !dir.as_path().is_dir() {
            return Err(NimbusError::NotFound(format!("Directory: {user_path}")));
        }

        let mut entries = Vec::new();
        for entry in fs::read_dir(dir.as_path())? {
            let entry = entry?;
            let name = entry.file_name().to_string_lossy().into_owned();
            let metadata = match entry.metadata() {
                Ok(m) => m,
                // Removed between read_dir and stat
                Err(e) if e.kind() == io::ErrorKind::NotFound => continue,
                Err(e) => return Err(e.into()),
            };
            entries.push(self.entry_info(&dir, name, &metadata));
        }

        entries.sort_by(|a, b| b.is_dir.cmp(&a.is_dir).then_with(|| a.name.cmp(&b.name)));
        Ok(entries)
    }

    /// Save uploaded content into a directory.
    ///
    /// Only the base name of `filename` is used. The target directory is
    /// created if it doesn't exist, and an existing file is overwritten.
    pub fn save(&self, user_dir: &str, filename: &str, content: &[u8]) -> Result<EntryInfo> {
        if content.len() as u64 > self.max_upload_size {
            return Err(NimbusError::Validation(format!(
                "file too large (max {} bytes)",
                self.max_upload_size
            )));
        }

        let name = base_name(filename)?;
        let dir = self.resolve(user_dir)?;
        let target = dir.child(&self.root, &name)?;

        if target.as_path().is_dir() {
            return Err(NimbusError::Validation(format!(
                "a directory named {name} already exists"
            )));
        }

        fs::create_dir_all(dir.as_path())?;
        fs::write(target.as_path(), content)?;

        let metadata = fs::metadata(target.as_path())?;
        Ok(self.entry_info(&dir, name, &metadata))
    }

    /// Look up a regular file for download.
    pub fn open(&self, user_path: &str) -> Result<DownloadTarget> {
        let path = self.resolve(user_path)?;
        let metadata = match fs::metadata(path.as_path()) {
            Ok(m) if m.is_file() => m,
            Ok(_) => return Err(NimbusError::NotFound(format!("File: {user_path}"))),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(NimbusError::NotFound(format!("File: {user_path}")))
            }
            Err(e) => return Err(e.into()),
        };

        let filename = path
            .as_path()
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "download".to_string());

        Ok(DownloadTarget {
            path,
            filename,
            size: metadata.len(),
        })
    }

    /// Delete a file or a directory tree.
    ///
    /// A symlink in the final component is removed itself; its target is
    /// left alone.
    pub fn delete(&self, user_path: &str) -> Result<()> {
        let target = self.delete_target(user_path)?;
        if target == self.root.path() {
            return Err(NimbusError::Validation(
                "the storage root cannot be deleted".to_string(),
            ));
        }

        let metadata = match fs::symlink_metadata(&target) {
            Ok(m) => m,
            Err(e) if is_missing(&e) => {
                return Err(NimbusError::NotFound(format!("Path: {user_path}")))
            }
            Err(e) => return Err(e.into()),
        };

        if metadata.is_dir() {
            fs::remove_dir_all(&target)?;
        } else {
            fs::remove_file(&target)?;
        }

        let relative = target.strip_prefix(self.root.path()).unwrap_or(&target);
        tracing::info!(
            path = %to_slash(relative),
            symlink = metadata.file_type().is_symlink(),
            "Deleted"
        );
        Ok(())
    }

    /// Location to delete for `user_path`.
    ///
    /// The parent goes through the sandbox; the final component is joined
    /// without being followed.
    fn delete_target(&self, user_path: &str) -> Result<PathBuf> {
        let path = Path::new(user_path.trim_end_matches(['/', '\\']));
        match (path.file_name(), path.parent()) {
            (Some(name), Some(parent)) => {
                let parent = self.resolve(&parent.to_string_lossy())?;
                Ok(parent.as_path().join(name))
            }
            // Root, `..` or `.` at the end: nothing to keep unresolved
            _ => Ok(self.resolve(user_path)?.into_path_buf()),
        }
    }

    /// Create a directory named `name` below `user_parent`.
    pub fn mkdir(&self, user_parent: &str, name: &str) -> Result<EntryInfo> {
        let parent = self.resolve(user_parent)?;
        if !parent.as_path().is_dir() {
            return Err(NimbusError::NotFound(format!("Directory: {user_parent}")));
        }

        let name = name.trim();
        let target = parent.child(&self.root, name)?;
        if target.as_path().exists() {
            return Err(NimbusError::Validation(format!("{name} already exists")));
        }

        fs::create_dir(target.as_path())?;
        let metadata = fs::metadata(target.as_path())?;
        Ok(self.entry_info(&parent, name.to_string(), &metadata))
    }

    /// Sum up the files stored below the root.
    ///
    /// Entries that vanish during the walk are skipped.
    pub fn usage(&self) -> Result<StorageUsage> {
        let mut usage = StorageUsage::default();

        for entry in WalkDir::new(self.root.path()).min_depth(1) {
            let entry = match entry {
                Ok(e) => e,
                Err(e) if is_not_found(&e) => continue,
                Err(e) => return Err(e.into()),
            };

            if entry.file_type().is_dir() {
                usage.dir_count += 1;
            } else if entry.file_type().is_file() {
                usage.file_count += 1;
                usage.used_bytes += entry.metadata().map(|m| m.len()).unwrap_or(0);
            }
        }

        Ok(usage)
    }

    /// Find entries whose name contains `query`, case-insensitively.
    pub fn search(&self, user_path: &str, query: &str, limit: Option<usize>) -> Result<Vec<EntryInfo>> {
        let query = query.trim().to_lowercase();
        if query.is_empty() {
            return Err(NimbusError::Validation("search query must not be empty".to_string()));
        }

        let base = self.resolve(user_path)?;
        if !base.as_path().is_dir() {
            return Err(NimbusError::NotFound(format!("Directory: {user_path}")));
        }

        let limit = limit.unwrap_or(DEFAULT_SEARCH_LIMIT);
        let mut results = Vec::new();

        for entry in WalkDir::new(base.as_path()).min_depth(1).sort_by_file_name() {
            let entry = match entry {
                Ok(e) => e,
                Err(e) if is_not_found(&e) => continue,
                Err(e) => return Err(e.into()),
            };

            let name = entry.file_name().to_string_lossy();
            if !name.to_lowercase().contains(&query) {
                continue;
            }

            let metadata = match entry.metadata() {
                Ok(m) => m,
                Err(e) if is_not_found(&e) => continue,
                Err(e) => return Err(e.into()),
            };

            let parent = entry.path().parent().unwrap_or(self.root.path());
            results.push(self.entry_info_at(parent, name.into_owned(), &metadata));

            if results.len() >= limit {
                break;
            }
        }

        Ok(results)
    }

    fn entry_info(&self, dir: &ResolvedPath, name: String, metadata: &fs::Metadata) -> EntryInfo {
        self.entry_info_at(dir.as_path(), name, metadata)
    }

    fn entry_info_at(&self, dir: &Path, name: String, metadata: &fs::Metadata) -> EntryInfo {
        let relative_dir = dir
            .strip_prefix(self.root.path())
            .map(to_slash)
            .unwrap_or_default();
        let path = if relative_dir.is_empty() {
            name.clone()
        } else {
            format!("{relative_dir}/{name}")
        };

        EntryInfo {
            path,
            is_dir: metadata.is_dir(),
            size: if metadata.is_dir() { 0 } else { metadata.len() },
            modified: metadata.modified().ok().map(DateTime::<Utc>::from),
            name,
        }
    }
}

/// Reduce an uploaded filename to its base name.
fn base_name(filename: &str) -> Result<String> {
    let name = filename
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or_default()
        .trim();
    validate_component(name)?;
    Ok(name.to_string())
}

fn is_missing(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        io::ErrorKind::NotFound | io::ErrorKind::NotADirectory
    )
}

fn is_not_found(e: &walkdir::Error) -> bool {
    e.io_error()
        .map(|io| io.kind() == io::ErrorKind::NotFound)
        .unwrap_or(false)
}
