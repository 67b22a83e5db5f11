//! Sandboxed path resolution.
//!
//! Every user supplied path is resolved against the storage root and
//! canonicalized before it is compared with the root. Symbolic links are
//! followed while resolving, so a link pointing outside of the root is
//! rejected the same way a `..` traversal is.
//!
//! Targets do not have to exist: the existing part of the path is resolved
//! on disk and the rest is normalized lexically.

use std::fmt;
use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};

use crate::{NimbusError, Result};

/// The directory that bounds every user accessible path.
#[derive(Debug, Clone)]
pub struct StorageRoot {
    /// Canonical absolute path of the root.
    path: PathBuf,
}

impl StorageRoot {
    /// Open a storage root, creating the directory if it doesn't exist.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        fs::create_dir_all(path)?;
        let path = path.canonicalize()?;

        if !path.is_dir() {
            return Err(NimbusError::Config(format!(
                "storage root {} is not a directory",
                path.display()
            )));
        }

        Ok(Self { path })
    }

    /// Canonical path of the root.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Resolve a user supplied path against this root.
    pub fn resolve(&self, user_path: &str) -> Result<ResolvedPath> {
        resolve(&self.path, user_path)
    }

    /// Whether the existing directory `path` is the root or lies below it.
    ///
    /// Both sides are compared in canonical form, so aliases through
    /// symlinks are detected.
    pub fn contains(&self, path: &Path) -> Result<bool> {
        Ok(path.canonicalize()?.starts_with(&self.path))
    }

    /// The root itself as a resolved path.
    pub fn as_resolved(&self) -> ResolvedPath {
        ResolvedPath(self.path.clone())
    }

    /// Path of `resolved` relative to the root, `/` separated.
    ///
    /// Returns an empty string for the root itself.
    pub fn relative(&self, resolved: &ResolvedPath) -> String {
        to_slash(resolved.0.strip_prefix(&self.path).unwrap_or(Path::new("")))
    }
}

/// A canonical absolute path proven to lie within the storage root.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ResolvedPath(PathBuf);

impl ResolvedPath {
    /// Borrow the underlying path.
    pub fn as_path(&self) -> &Path {
        &self.0
    }

    /// Take ownership of the underlying path.
    pub fn into_path_buf(self) -> PathBuf {
        self.0
    }

    /// Resolve a single child name below this path.
    ///
    /// The name must be one normal path component.
    pub fn child(&self, root: &StorageRoot, name: &str) -> Result<ResolvedPath> {
        validate_component(name)?;
        let relative = root.relative(self);
        if relative.is_empty() {
            root.resolve(name)
        } else {
            root.resolve(&format!("{relative}/{name}"))
        }
    }
}

impl AsRef<Path> for ResolvedPath {
    fn as_ref(&self) -> &Path {
        &self.0
    }
}

impl fmt::Display for ResolvedPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.display())
    }
}

/// Resolve `user_path` against the canonical `root`.
///
/// Leading separators are stripped, so an absolute looking path is still
/// interpreted relative to the root. The result is rejected with
/// [`NimbusError::PathEscape`] when its canonical form is not the root or
/// below it.
pub fn resolve(root: &Path, user_path: &str) -> Result<ResolvedPath> {
    if user_path.contains('\0') {
        return Err(NimbusError::PathEscape(user_path.escape_default().to_string()));
    }

    let escape = || NimbusError::PathEscape(user_path.to_string());
    let relative = user_path.trim_start_matches(['/', '\\']);

    let mut current = root.to_path_buf();
    // Once a component is missing, nothing below it can exist either.
    let mut on_disk = true;

    for component in Path::new(relative).components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if current == root {
                    return Err(escape());
                }
                current.pop();
            }
            Component::Normal(name) => {
                let next = current.join(name);
                if on_disk {
                    match fs::symlink_metadata(&next) {
                        Ok(meta) if meta.file_type().is_symlink() => {
                            current = match next.canonicalize() {
                                Ok(target) => target,
                                Err(e) if e.kind() == io::ErrorKind::NotFound => {
                                    return Err(escape());
                                }
                                Err(e) => return Err(e.into()),
                            };
                        }
                        Ok(_) => current = next,
                        // A regular file in the middle of the path
                        Err(e)
                            if e.kind() == io::ErrorKind::NotFound
                                || e.kind() == io::ErrorKind::NotADirectory =>
                        {
                            on_disk = false;
                            current = next;
                        }
                        Err(e) => return Err(e.into()),
                    }
                } else {
                    current = next;
                }
            }
            Component::RootDir | Component::Prefix(_) => return Err(escape()),
        }
    }

    if current.starts_with(root) {
        Ok(ResolvedPath(current))
    } else {
        Err(escape())
    }
}

/// Check that `name` is a single, normal path component.
pub fn validate_component(name: &str) -> Result<()> {
    let trimmed = name.trim();
    if trimmed.is_empty() || trimmed == "." || trimmed == ".." {
        return Err(NimbusError::Validation(format!("invalid name: {name:?}")));
    }
    if name.contains(['/', '\\', '\0']) {
        return Err(NimbusError::Validation(format!(
            "name must not contain path separators: {name:?}"
        )));
    }
    Ok(())
}

/// Render a relative path with `/` separators.
pub(crate) fn to_slash(path: &Path) -> String {
    path.components()
        .filter_map(|c| match c {
            Component::Normal(name) => Some(name.to_string_lossy().into_owned()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("/")
}
