//! Atomic snapshot I/O shared by the persistent stores.
//!
//! Snapshots are versioned JSON documents written with temp file + fsync +
//! rename so a crash mid-write never leaves a torn file behind.

use crate::error::{InsightError, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs::{self, File};
use std::io::Write;
use std::path::Path;

/// Current snapshot schema version.
pub const SNAPSHOT_VERSION: u32 = 1;

/// Writes `bytes` to `path` atomically.
///
/// Uses temp file + fsync + rename, then fsyncs the parent directory on
/// Unix for crash safety.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }

    let tmp_path = path.with_extension("tmp");

    {
        let mut file = File::create(&tmp_path)?;
        file.write_all(bytes)?;
        file.sync_all()?;
    }

    fs::rename(&tmp_path, path)?;

    #[cfg(unix)]
    {
        if let Some(parent) = path.parent() {
            if let Ok(dir_file) = File::open(parent) {
                let _ = dir_file.sync_all();
            }
        }
    }

    Ok(())
}

/// Serializes `value` as pretty JSON and writes it atomically.
pub fn save_snapshot<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let json = serde_json::to_vec_pretty(value)?;
    write_atomic(path, &json)
}

/// Loads a snapshot, returning `None` when the file does not exist.
///
/// An unreadable or undecodable file is a `SnapshotCorrupt` error; callers
/// that prefer to continue with empty state handle it there.
pub fn load_snapshot<T: DeserializeOwned>(path: &Path) -> Result<Option<T>> {
    if !path.exists() {
        return Ok(None);
    }

    let content = fs::read_to_string(path)?;
    serde_json::from_str(&content)
        .map(Some)
        .map_err(|e| InsightError::SnapshotCorrupt {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })
}

/// Validates a snapshot's schema version.
pub fn check_version(path: &Path, version: u32) -> Result<()> {
    if version != SNAPSHOT_VERSION {
        return Err(InsightError::SnapshotCorrupt {
            path: path.to_path_buf(),
            reason: format!(
                "unsupported snapshot version {} (expected {})",
                version, SNAPSHOT_VERSION
            ),
        });
    }
    Ok(())
}
