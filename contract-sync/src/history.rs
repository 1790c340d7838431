//! Run history: one JSON line per orchestration run in `history.jsonl`.
//!
//! The file rotates by size using the scheme
//!   history.jsonl → history.jsonl.1 → … → history.jsonl.<max_files>
//!
//! Rotation and append run under `history.lock`, separate from the run lock,
//! so a scheduled run and a manual one never interleave the rename chain.

use std::fs;
use std::io::{self, BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use contract_sync_core::config::HistorySettings;
use contract_sync_core::types::Fingerprint;

use crate::error::{store_io, StoreError};
use crate::lock;
use crate::orchestrator::{SyncReport, SyncResult, SyncResultKind, SyncState};

const LOCK_TIMEOUT: Duration = Duration::from_secs(10);
const LOCK_STALE_AFTER: Duration = Duration::from_secs(60);

/// One line of `history.jsonl`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub started_at: DateTime<Utc>,
    pub duration_ms: u64,
    pub result: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fingerprint: Option<Fingerprint>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub previous: Option<Fingerprint>,
    #[serde(default)]
    pub forced: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default)]
    pub states: Vec<String>,
}

impl HistoryEntry {
    pub fn from_report(report: &SyncReport) -> Self {
        let (previous, forced) = match &report.result {
            SyncResult::Regenerated {
                previous, forced, ..
            } => (previous.clone(), *forced),
            _ => (None, false),
        };
        Self {
            started_at: report.started_at,
            duration_ms: u64::try_from(report.duration_ms).unwrap_or(u64::MAX),
            result: report.result.kind().to_string(),
            fingerprint: report.result.fingerprint().cloned(),
            previous,
            forced,
            error: report.result.error_message(),
            states: report.states.iter().map(state_name).collect(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.result == SyncResultKind::Unchanged.to_string()
            || self.result == SyncResultKind::Regenerated.to_string()
    }
}

fn state_name(state: &SyncState) -> String {
    format!("{state:?}").to_lowercase()
}

/// Append `entry` to `path`, rotating first when the file is over the limit.
pub fn append(
    path: &Path,
    entry: &HistoryEntry,
    settings: &HistorySettings,
) -> Result<(), StoreError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| store_io(parent, e))?;
    }
    let _guard = lock::acquire_file(&lock_path(path), LOCK_TIMEOUT, LOCK_STALE_AFTER)?;
    match rotate_if_needed(path, settings.max_bytes, settings.max_files) {
        Ok(true) => tracing::info!("rotated {}", path.display()),
        Ok(false) => {}
        Err(err) => return Err(store_io(path, err)),
    }

    let mut line = serde_json::to_string(entry)?;
    line.push('\n');
    let mut file = fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|e| store_io(path, e))?;
    file.write_all(line.as_bytes())
        .map_err(|e| store_io(path, e))
}

/// Last `limit` entries of the live file, oldest first.
///
/// Lines that fail to parse are skipped with a warning.
pub fn read_recent(path: &Path, limit: usize) -> Result<Vec<HistoryEntry>, StoreError> {
    let file = match fs::File::open(path) {
        Ok(file) => file,
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(err) => return Err(store_io(path, err)),
    };

    let mut entries = Vec::new();
    for (n, line) in BufReader::new(file).lines().enumerate() {
        let line = line.map_err(|e| store_io(path, e))?;
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<HistoryEntry>(&line) {
            Ok(entry) => entries.push(entry),
            Err(err) => tracing::warn!("{}:{}: skipping entry: {err}", path.display(), n + 1),
        }
    }
    let start = entries.len().saturating_sub(limit);
    Ok(entries.split_off(start))
}

/// Rotate `path` if its size is at least `max_bytes`.
///
/// Returns `true` if rotation occurred. Missing files are not an error.
pub fn rotate_if_needed(path: &Path, max_bytes: u64, max_files: usize) -> io::Result<bool> {
    let size = match fs::metadata(path) {
        Ok(meta) => meta.len(),
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(false),
        Err(err) => return Err(err),
    };

    if size < max_bytes {
        return Ok(false);
    }

    let oldest = numbered_path(path, max_files);
    if oldest.exists() {
        fs::remove_file(&oldest)?;
    }

    for n in (1..max_files).rev() {
        let src = numbered_path(path, n);
        if src.exists() {
            fs::rename(&src, numbered_path(path, n + 1))?;
        }
    }

    fs::rename(path, numbered_path(path, 1))?;
    Ok(true)
}

fn lock_path(history: &Path) -> PathBuf {
    history.with_extension("lock")
}

fn numbered_path(base: &Path, n: usize) -> PathBuf {
    let name = base
        .file_name()
        .and_then(|s| s.to_str())
        .unwrap_or("history.jsonl");
    base.with_file_name(format!("{name}.{n}"))
}

// ─── Tests ────────────────────────────────────────────────────────────────────
