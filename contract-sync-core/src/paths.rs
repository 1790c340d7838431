//! State directory layout.
//!
//! ```text
//! <state_dir>/
//!   record.json                   current ContractRecord
//!   contracts/<fingerprint>.json  snapshot of the applied contract
//!   sync.lock                     exclusive run lock
//!   history.jsonl                 one line per orchestration run
//!   history.lock                  guards history rotation and append
//! ```
//!
//! Staging and rollback directories are siblings of the output so that
//! promotion is a same-filesystem rename.

use std::ffi::OsString;
use std::path::{Path, PathBuf};

use crate::types::Fingerprint;

pub const DEFAULT_STATE_DIR: &str = ".contract-sync";
pub const RECORD_FILE: &str = "record.json";
pub const CONTRACTS_DIR: &str = "contracts";
pub const LOCK_FILE: &str = "sync.lock";
pub const HISTORY_FILE: &str = "history.jsonl";

pub fn record_path(state_dir: &Path) -> PathBuf {
    state_dir.join(RECORD_FILE)
}

pub fn contracts_dir(state_dir: &Path) -> PathBuf {
    state_dir.join(CONTRACTS_DIR)
}

pub fn snapshot_path(state_dir: &Path, fingerprint: &Fingerprint) -> PathBuf {
    contracts_dir(state_dir).join(format!("{}.json", fingerprint.0))
}

pub fn lock_path(state_dir: &Path) -> PathBuf {
    state_dir.join(LOCK_FILE)
}

pub fn history_path(state_dir: &Path) -> PathBuf {
    state_dir.join(HISTORY_FILE)
}

/// `<parent>/.<name>.staging`
pub fn staging_path(output: &Path) -> PathBuf {
    hidden_sibling(output, "staging")
}

/// `<parent>/.<name>.previous`
pub fn previous_path(output: &Path) -> PathBuf {
    hidden_sibling(output, "previous")
}

fn hidden_sibling(output: &Path, suffix: &str) -> PathBuf {
    let mut name = OsString::from(".");
    name.push(output.file_name().unwrap_or(output.as_os_str()));
    name.push(".");
    name.push(suffix);
    output.with_file_name(name)
}
