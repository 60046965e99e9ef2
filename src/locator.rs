//! Artifact lookup
//!
//! Finds the compiled entry artifact (e.g. `Main.class`) somewhere under the
//! build-output root and turns its path into the reference handed to the
//! launcher (e.g. `com.acme.Main`).

use std::path::{Component, Path, PathBuf};

use thiserror::Error;
use tracing::trace;

/// Why an artifact could not be located
#[derive(Debug, Error)]
pub enum LocateError {
    /// The build-output root itself does not exist
    #[error("no build output found at {}", .0.display())]
    RootMissing(PathBuf),

    /// The root exists but holds no matching file
    #[error("no entry '{name}' found under {}", .root.display())]
    NotFound { root: PathBuf, name: String },

    #[error("failed to search {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// File name an entry is stored under: `name.extension`.
///
/// The extension is not appended twice, and an empty extension means the
/// name is used as-is.
pub fn artifact_file_name(logical_name: &str, extension: &str) -> String {
    let extension = extension.trim_start_matches('.');
    if extension.is_empty() || logical_name.ends_with(&format!(".{}", extension)) {
        logical_name.to_string()
    } else {
        format!("{}.{}", logical_name, extension)
    }
}

/// Search `root` recursively for the artifact of `logical_name`.
///
/// Directory entries are visited in sorted order, files before descending,
/// so the first match is deterministic.
pub fn locate(root: &Path, logical_name: &str, extension: &str) -> Result<PathBuf, LocateError> {
    if !root.is_dir() {
        return Err(LocateError::RootMissing(root.to_path_buf()));
    }
    let file_name = artifact_file_name(logical_name, extension);
    find_file(root, &file_name)?.ok_or_else(|| LocateError::NotFound {
        root: root.to_path_buf(),
        name: file_name,
    })
}

fn find_file(dir: &Path, file_name: &str) -> Result<Option<PathBuf>, LocateError> {
    let io_err = |source: std::io::Error| LocateError::Io { path: dir.to_path_buf(), source };

    let mut entries = Vec::new();
    for entry in std::fs::read_dir(dir).map_err(io_err)? {
        entries.push(entry.map_err(io_err)?);
    }
    entries.sort_by_key(|e| e.file_name());

    let mut subdirs = Vec::new();
    for entry in entries {
        let path = entry.path();
        let file_type = entry.file_type().map_err(io_err)?;
        if file_type.is_dir() {
            subdirs.push(path);
        } else if entry.file_name().to_str() == Some(file_name) {
            trace!(path = %path.display(), "artifact found");
            return Ok(Some(path));
        }
    }

    for subdir in subdirs {
        if let Some(found) = find_file(&subdir, file_name)? {
            return Ok(Some(found));
        }
    }
    Ok(None)
}

/// The launcher reference for an artifact: its path relative to `root`,
/// extension stripped, components joined with `.`.
///
/// `root/com/acme/Main.class` becomes `com.acme.Main`.
pub fn executable_ref(root: &Path, artifact: &Path) -> String {
    let relative = artifact.strip_prefix(root).unwrap_or(artifact);
    let stem = relative.with_extension("");
    stem.components()
        .filter_map(|c| match c {
            Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join(".")
}
