//! Directory to zip archive builder.
//!
//! The builder walks the source tree twice: once to count regular files for
//! progress reporting, and once to write them. Entries are stored relative
//! to the source directory with `/` separators, deflate compressed.
//! Directories never get their own entries and symbolic links are not
//! followed.
//!
//! The count is a best-effort estimate. Files added between the two walks
//! are still archived and progress is clamped at 100.

use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;

use walkdir::WalkDir;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

use crate::storage::sandbox::to_slash;
use crate::{NimbusError, Result};

/// Outcome of a successful build.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BuildSummary {
    /// Number of file entries written.
    pub entries: u64,
    /// Uncompressed bytes written.
    pub bytes: u64,
}

/// Count regular files below `source`.
pub fn count_files(source: &Path) -> Result<u64> {
    let mut total = 0;
    for entry in WalkDir::new(source).min_depth(1) {
        if entry?.file_type().is_file() {
            total += 1;
        }
    }
    Ok(total)
}

/// Progress for `processed` out of `total` files, clamped to 100.
pub fn progress_percent(processed: u64, total: u64) -> u8 {
    if total == 0 {
        return 100;
    }
    (processed.saturating_mul(100) / total).min(100) as u8
}

/// Build a zip archive of `source` at `artifact`.
///
/// `on_progress` is called after every file with the current percentage.
/// This does blocking I/O and belongs on a blocking worker thread. On
/// error a partially written `artifact` may remain; the caller discards it.
pub fn build<F>(source: &Path, artifact: &Path, mut on_progress: F) -> Result<BuildSummary>
where
    F: FnMut(u8),
{
    if !source.is_dir() {
        return Err(NimbusError::SourceNotFound(source.display().to_string()));
    }

    let total = count_files(source)?;

    let file = File::create(artifact)
        .map_err(|e| build_error(&format!("create {}", artifact.display()), e))?;
    let mut zip = ZipWriter::new(BufWriter::new(file));
    let mut summary = BuildSummary::default();

    if total > 0 {
        let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
        let mut processed = 0u64;

        for entry in WalkDir::new(source).min_depth(1).sort_by_file_name() {
            let entry = entry?;
            if !entry.file_type().is_file() {
                continue;
            }

            let relative = entry
                .path()
                .strip_prefix(source)
                .map(to_slash)
                .map_err(|_| NimbusError::Build(format!("{} is outside the source", entry.path().display())))?;

            let mut input =
                File::open(entry.path()).map_err(|e| build_error(&relative, e))?;
            let size = input.metadata().map(|m| m.len()).unwrap_or(0);

            zip.start_file(relative.as_str(), options.large_file(size >= u64::from(u32::MAX)))?;
            let written = io::copy(&mut input, &mut zip).map_err(|e| build_error(&relative, e))?;

            processed += 1;
            summary.entries += 1;
            summary.bytes += written;
            on_progress(progress_percent(processed, total));
        }
    }

    let mut writer = zip.finish()?;
    writer
        .flush()
        .map_err(|e| build_error(&format!("write {}", artifact.display()), e))?;

    if total == 0 {
        on_progress(100);
    }

    Ok(summary)
}

fn build_error(context: &str, e: io::Error) -> NimbusError {
    NimbusError::Build(format!("{context}: {e}"))
}
