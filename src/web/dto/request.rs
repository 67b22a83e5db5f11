//! Request DTOs for Web API.

use serde::Deserialize;
use validator::Validate;

use super::validation::{no_control_chars, not_empty_trimmed};

/// Query carrying a storage path.
#[derive(Debug, Default, Deserialize)]
pub struct PathQuery {
    /// Path relative to the storage root (empty = root).
    #[serde(default)]
    pub path: String,
}

/// Search query parameters.
#[derive(Debug, Deserialize)]
pub struct SearchQuery {
    /// Text to look for in entry names.
    pub q: String,
    /// Directory to search below (empty = root).
    #[serde(default)]
    pub path: String,
    /// Maximum number of results.
    #[serde(default)]
    pub limit: Option<usize>,
}

/// Directory creation request.
#[derive(Debug, Deserialize, Validate)]
pub struct MkdirRequest {
    /// Parent directory (empty = root).
    #[serde(default)]
    pub path: String,
    /// Name of the new directory.
    #[validate(
        length(min = 1, max = 255, message = "Name must be 1-255 characters"),
        custom(function = "not_empty_trimmed"),
        custom(function = "no_control_chars")
    )]
    pub name: String,
}

/// Archive job creation request.
#[derive(Debug, Deserialize, Validate)]
pub struct StartArchiveRequest {
    /// Directory to archive (empty = root).
    #[serde(default)]
    #[validate(
        length(max = 4096, message = "Path is too long"),
        custom(function = "no_control_chars")
    )]
    pub path: String,
}
