//! State Store
//!
//! Durable home of the [`RecordSet`] between runs.
//!
//! ## File layout
//!
//! ```json
//! {
//!   "version": 2,
//!   "saved_at": "2024-01-15T11:00:00Z",
//!   "clients": {
//!     "alice": {
//!       "baseline_received": 2210, "baseline_sent": 1841,
//!       "accumulated_received": 500, "accumulated_sent": 600,
//!       "last_real_address": "203.0.113.7:51234", "last_virtual_address": "10.8.0.6",
//!       "session_start": "2024-01-15T10:30:00Z", "session_id": 7,
//!       "last_seen": "2024-01-15T10:59:58Z"
//!     }
//!   }
//! }
//! ```
//!
//! Loading is all-or-nothing: a missing, unreadable, malformed or
//! other-version file loads as an empty set. Saving goes through a temporary
//! file in the target directory which is fsynced and renamed over the target.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::{debug, info, warn};

use crate::models::RecordSet;

/// Bumped whenever the record layout changes; any other value is rejected.
pub const STATE_VERSION: u32 = 2;

#[derive(Debug, Serialize, Deserialize)]
struct StateFile {
    version: u32,
    saved_at: DateTime<Utc>,
    clients: RecordSet,
}

/// Only the version, so a foreign layout is rejected before its body is parsed.
#[derive(Debug, Deserialize)]
struct VersionHeader {
    version: Option<u32>,
}

/// Load records from `path`, or an empty set if there is nothing usable there
pub fn load(path: &Path) -> RecordSet {
    match try_load(path) {
        Ok(Some(records)) => {
            info!(
                path = %path.display(),
                clients = records.len(),
                "Loaded persisted state"
            );
            records
        }
        Ok(None) => RecordSet::new(),
        Err(e) => {
            warn!(
                path = %path.display(),
                error = %e,
                "Ignoring unusable state file, starting from empty state"
            );
            RecordSet::new()
        }
    }
}

/// `Ok(None)` for a missing file or a version mismatch, `Err` for anything unreadable.
fn try_load(path: &Path) -> Result<Option<RecordSet>> {
    let content = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            debug!(path = %path.display(), "No state file yet");
            return Ok(None);
        }
        Err(e) => {
            return Err(e).with_context(|| format!("Failed to read state file: {}", path.display()))
        }
    };

    let header: VersionHeader = serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse state file: {}", path.display()))?;
    if header.version != Some(STATE_VERSION) {
        info!(
            path = %path.display(),
            found = ?header.version,
            expected = STATE_VERSION,
            "State file version mismatch, starting from empty state"
        );
        return Ok(None);
    }

    let state: StateFile = serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse state file: {}", path.display()))?;
    Ok(Some(state.clients))
}

/// Atomically replace `path` with the current records
pub fn save(path: &Path, records: &RecordSet) -> Result<()> {
    stage(path, records)?.commit()
}

/// Write and fsync the records to a temporary file next to `path` without
/// touching `path` itself. Dropping the result discards the temporary file.
pub fn stage(path: &Path, records: &RecordSet) -> Result<StagedSave> {
    let directory = parent_directory(path);
    fs::create_dir_all(&directory)
        .with_context(|| format!("Failed to create state directory: {}", directory.display()))?;

    let state = StateFile {
        version: STATE_VERSION,
        saved_at: Utc::now(),
        clients: records.clone(),
    };

    let mut temp = NamedTempFile::new_in(&directory)
        .with_context(|| format!("Failed to create temporary file in {}", directory.display()))?;
    {
        let mut writer = BufWriter::new(temp.as_file_mut());
        serde_json::to_writer(&mut writer, &state).context("Failed to serialize state")?;
        writer.flush().context("Failed to flush state file")?;
    }
    temp.as_file()
        .sync_all()
        .context("Failed to sync state file to disk")?;

    Ok(StagedSave {
        temp,
        target: path.to_path_buf(),
        directory,
    })
}

/// A fully written state file waiting to be renamed over its target.
#[derive(Debug)]
pub struct StagedSave {
    temp: NamedTempFile,
    target: PathBuf,
    directory: PathBuf,
}

impl StagedSave {
    #[cfg(test)]
    fn temp_path(&self) -> &Path {
        self.temp.path()
    }

    pub fn commit(self) -> Result<()> {
        self.temp
            .persist(&self.target)
            .map_err(|e| e.error)
            .with_context(|| format!("Failed to replace state file: {}", self.target.display()))?;

        // Make the rename itself durable; not every platform can open a directory
        if let Ok(dir) = File::open(&self.directory) {
            let _ = dir.sync_all();
        }

        debug!(path = %self.target.display(), "State saved");
        Ok(())
    }
}

fn parent_directory(path: &Path) -> PathBuf {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    }
}
