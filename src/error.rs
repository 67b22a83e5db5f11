//! Error types for nimbus.

use thiserror::Error;

/// Common error type for nimbus.
#[derive(Error, Debug)]
pub enum NimbusError {
    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A user supplied path resolved outside of the storage root.
    #[error("path escapes storage root: {0}")]
    PathEscape(String),

    /// The directory to archive does not exist or is not a directory.
    #[error("source directory not found: {0}")]
    SourceNotFound(String),

    /// Resource not found.
    #[error("{0} not found")]
    NotFound(String),

    /// The requested artifact is not available yet.
    #[error("not ready: {0}")]
    NotReady(String),

    /// Archive build failure.
    #[error("archive build failed: {0}")]
    Build(String),

    /// Validation error for user input.
    #[error("validation error: {0}")]
    Validation(String),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),
}

impl From<walkdir::Error> for NimbusError {
    fn from(e: walkdir::Error) -> Self {
        let path = e
            .path()
            .map(|p| p.display().to_string())
            .unwrap_or_default();
        match e.into_io_error() {
            Some(io) if path.is_empty() => NimbusError::Build(io.to_string()),
            Some(io) => NimbusError::Build(format!("{path}: {io}")),
            None => NimbusError::Build(format!("filesystem loop detected at {path}")),
        }
    }
}

impl From<zip::result::ZipError> for NimbusError {
    fn from(e: zip::result::ZipError) -> Self {
        NimbusError::Build(e.to_string())
    }
}

/// Result type alias for nimbus operations.
pub type Result<T> = std::result::Result<T, NimbusError>;
