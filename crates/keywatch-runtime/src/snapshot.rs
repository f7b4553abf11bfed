//! The JSON snapshot store file.
//!
//! Cron-style CLI invocations compose across processes by loading the whole
//! in-memory store at startup and writing it back after each mutating step.
//! Writes go to a sibling temp file first and land with a rename, so a crash
//! mid-write never leaves a truncated store behind.

use std::fs;
use std::path::Path;

use thiserror::Error;
use tracing::info;

use keywatch_core::adapters::memory::MemoryStore;

#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("failed to read store file {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },

    #[error("failed to write store file {path}: {source}")]
    Write {
        path: String,
        source: std::io::Error,
    },

    #[error("store file {path} is not a valid snapshot: {source}")]
    Corrupt {
        path: String,
        source: serde_json::Error,
    },
}

/// Creates an empty snapshot at `path`. Fails if one already exists, so a
/// typo in `KEYWATCH_STORE` cannot wipe real data.
pub fn init(path: &Path) -> Result<(), SnapshotError> {
    if path.exists() {
        return Err(SnapshotError::Write {
            path: path.display().to_string(),
            source: std::io::Error::new(
                std::io::ErrorKind::AlreadyExists,
                "store file already exists",
            ),
        });
    }
    save(path, &MemoryStore::new())?;
    info!(path = %path.display(), "initialized empty store");
    Ok(())
}

/// Loads the store from `path`.
pub fn load(path: &Path) -> Result<MemoryStore, SnapshotError> {
    let text = fs::read_to_string(path).map_err(|source| SnapshotError::Read {
        path: path.display().to_string(),
        source,
    })?;
    serde_json::from_str(&text).map_err(|source| SnapshotError::Corrupt {
        path: path.display().to_string(),
        source,
    })
}

/// Writes the store back to `path` atomically.
pub fn save(path: &Path, store: &MemoryStore) -> Result<(), SnapshotError> {
    let write_err = |source| SnapshotError::Write {
        path: path.display().to_string(),
        source,
    };

    let json = serde_json::to_string_pretty(store).map_err(|source| SnapshotError::Corrupt {
        path: path.display().to_string(),
        source,
    })?;

    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    fs::write(&tmp, json).map_err(write_err)?;
    fs::rename(&tmp, path).map_err(write_err)?;
    Ok(())
}
