//! Fixture materialization
//!
//! Every scenario builds from its own full copy of the fixture application so
//! that concurrent builds never see each other's files (the build tool may
//! write into the source directory).

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, warn};
use uuid::Uuid;
use walkdir::WalkDir;

#[derive(Debug, Error)]
pub enum FixtureError {
    #[error("Fixture directory not found: {0}")]
    NotFound(PathBuf),

    #[error("Failed to walk fixture {path}: {source}")]
    Walk {
        path: PathBuf,
        #[source]
        source: walkdir::Error,
    },

    #[error("Failed to copy {path}: {source}")]
    Copy {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Copies a fixture directory into a new, uniquely named temporary directory
/// and returns its path. The caller owns the copy and must remove it.
pub fn copy_to_temp(fixture: &Path) -> Result<PathBuf, FixtureError> {
    copy_into(fixture, &std::env::temp_dir())
}

/// Copies a fixture into a uniquely named directory under `parent`.
pub fn copy_into(fixture: &Path, parent: &Path) -> Result<PathBuf, FixtureError> {
    let target = parent.join(format!("smokepack-source-{}", Uuid::new_v4()));
    if let Err(e) = copy_tree(fixture, &target) {
        // partial copies are never handed to the caller
        if let Err(cleanup) = remove_source(&target) {
            warn!(
                path = %target.display(),
                error = %cleanup,
                "Failed to remove partial fixture copy"
            );
        }
        return Err(e);
    }
    Ok(target)
}

/// Recursively copies `source` into `target`, creating `target`.
pub fn copy_tree(source: &Path, target: &Path) -> Result<(), FixtureError> {
    if !source.is_dir() {
        return Err(FixtureError::NotFound(source.to_path_buf()));
    }

    debug!(from = %source.display(), to = %target.display(), "Copying fixture");

    for entry in WalkDir::new(source).follow_links(true) {
        let entry = entry.map_err(|e| FixtureError::Walk {
            path: source.to_path_buf(),
            source: e,
        })?;

        let relative = entry
            .path()
            .strip_prefix(source)
            .unwrap_or_else(|_| entry.path());
        let destination = target.join(relative);

        let result = if entry.file_type().is_dir() {
            fs::create_dir_all(&destination)
        } else {
            fs::copy(entry.path(), &destination).map(|_| ())
        };

        result.map_err(|e| FixtureError::Copy {
            path: entry.path().to_path_buf(),
            source: e,
        })?;
    }

    Ok(())
}

/// Removes a materialized source directory. A directory that is already gone
/// counts as removed.
pub fn remove_source(path: &Path) -> io::Result<()> {
    match fs::remove_dir_all(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e),
    }
}
