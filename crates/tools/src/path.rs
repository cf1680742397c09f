//! Path validation: file tools only touch paths inside the working directory.

use std::path::{Component, Path, PathBuf};

#[derive(Debug, thiserror::Error)]
pub enum PathValidationError {
    #[error("Path '{path}' is outside the working directory")]
    OutsideWorkDir { path: String },

    #[error("Path traversal detected in '{path}'")]
    PathTraversal { path: String },

    #[error("Path must not be empty")]
    Empty,
}

/// Resolve `raw` against `work_dir`.
///
/// Relative paths are joined onto the working directory. Absolute paths must
/// already point inside it. `..` components are refused outright.
pub fn resolve_in_work_dir(work_dir: &Path, raw: &str) -> Result<PathBuf, PathValidationError> {
    if raw.trim().is_empty() {
        return Err(PathValidationError::Empty);
    }

    let input = Path::new(raw);
    if input.components().any(|c| matches!(c, Component::ParentDir)) {
        return Err(PathValidationError::PathTraversal { path: raw.into() });
    }

    let root = work_dir
        .canonicalize()
        .unwrap_or_else(|_| work_dir.to_path_buf());

    if input.is_absolute() {
        let resolved = canonical_or_parent(input);
        if resolved.starts_with(&root) || input.starts_with(work_dir) {
            return Ok(resolved);
        }
        return Err(PathValidationError::OutsideWorkDir { path: raw.into() });
    }

    Ok(root.join(input))
}

/// Canonicalize the path, or its parent when the file does not exist yet.
fn canonical_or_parent(path: &Path) -> PathBuf {
    if let Ok(canonical) = path.canonicalize() {
        return canonical;
    }
    match (path.parent(), path.file_name()) {
        (Some(parent), Some(name)) => parent
            .canonicalize()
            .map(|p| p.join(name))
            .unwrap_or_else(|_| path.to_path_buf()),
        _ => path.to_path_buf(),
    }
}
