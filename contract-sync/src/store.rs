//! Contract store — the single source of truth for "what was last applied".
//!
//! [`FileContractStore`] persists under the state directory:
//! `contracts/<fingerprint>.json` (canonical snapshot) first, then
//! `record.json`, both with the `.tmp` + rename pattern. A reader therefore
//! sees either the old record or the complete new one, and any record it sees
//! has its snapshot on disk.
//!
//! [`MemoryContractStore`] implements the same contract in-process.

use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use contract_sync_core::config::LockSettings;
use contract_sync_core::paths;
use contract_sync_core::types::{ContractRecord, Fingerprint};

use crate::error::{store_io, LockError, StoreError};
use crate::lock::{self, MemoryLock, StoreLock};

/// Persistence for the last applied contract.
pub trait ContractStore {
    /// The last committed record, or `None` if never synced.
    fn current(&self) -> Result<Option<ContractRecord>, StoreError>;

    /// Atomically replace the current record, together with the canonical
    /// snapshot of the contract it was built from. On failure the previous
    /// record stays intact.
    fn commit(&self, record: &ContractRecord, snapshot: &str) -> Result<(), StoreError>;

    /// Put back the record that was current before a commit whose artifact
    /// could not be promoted (`None` removes the record).
    fn restore(&self, previous: Option<&ContractRecord>) -> Result<(), StoreError>;

    /// Canonical snapshot stored for `fingerprint`, if any.
    fn snapshot(&self, fingerprint: &Fingerprint) -> Result<Option<String>, StoreError>;

    /// Drop snapshots of every fingerprint except `keep`.
    fn prune(&self, keep: &Fingerprint) -> Result<(), StoreError>;

    /// Take the exclusive run lock for this store.
    fn lock(&self) -> Result<StoreLock, LockError>;
}

// ---------------------------------------------------------------------------
// File store
// ---------------------------------------------------------------------------

/// JSON store rooted at a state directory.
#[derive(Debug, Clone)]
pub struct FileContractStore {
    state_dir: PathBuf,
    lock_timeout: Duration,
    stale_after: Duration,
}

impl FileContractStore {
    pub fn new(state_dir: impl Into<PathBuf>, settings: &LockSettings) -> Self {
        Self {
            state_dir: state_dir.into(),
            lock_timeout: settings.timeout(),
            stale_after: settings.stale_after(),
        }
    }

    pub fn state_dir(&self) -> &Path {
        &self.state_dir
    }

    fn record_path(&self) -> PathBuf {
        paths::record_path(&self.state_dir)
    }

    fn write_record(&self, record: &ContractRecord) -> Result<(), StoreError> {
        let json = serde_json::to_string_pretty(record)?;
        write_atomic(&self.record_path(), json.as_bytes())
    }
}

impl ContractStore for FileContractStore {
    fn current(&self) -> Result<Option<ContractRecord>, StoreError> {
        let path = self.record_path();
        let contents = match std::fs::read_to_string(&path) {
            Ok(contents) => contents,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(store_io(path, err)),
        };
        serde_json::from_str(&contents)
            .map(Some)
            .map_err(|source| StoreError::Corrupt { path, source })
    }

    fn commit(&self, record: &ContractRecord, snapshot: &str) -> Result<(), StoreError> {
        let snapshot_path = paths::snapshot_path(&self.state_dir, &record.fingerprint);
        write_atomic(&snapshot_path, snapshot.as_bytes())?;
        self.write_record(record)?;
        tracing::info!(
            "committed contract {} to {}",
            record.fingerprint.short(),
            self.record_path().display()
        );
        Ok(())
    }

    fn restore(&self, previous: Option<&ContractRecord>) -> Result<(), StoreError> {
        match previous {
            Some(record) => self.write_record(record),
            None => {
                let path = self.record_path();
                match std::fs::remove_file(&path) {
                    Ok(()) => Ok(()),
                    Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
                    Err(err) => Err(store_io(path, err)),
                }
            }
        }
    }

    fn snapshot(&self, fingerprint: &Fingerprint) -> Result<Option<String>, StoreError> {
        let path = paths::snapshot_path(&self.state_dir, fingerprint);
        match std::fs::read_to_string(&path) {
            Ok(contents) => Ok(Some(contents)),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
            Err(err) => Err(store_io(path, err)),
        }
    }

    fn prune(&self, keep: &Fingerprint) -> Result<(), StoreError> {
        let dir = paths::contracts_dir(&self.state_dir);
        let entries = match std::fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(()),
            Err(err) => return Err(store_io(dir, err)),
        };
        let keep_name = format!("{}.json", keep.0);
        for entry in entries {
            let entry = entry.map_err(|e| store_io(&dir, e))?;
            if entry.file_name().to_string_lossy() == keep_name {
                continue;
            }
            let path = entry.path();
            if let Err(err) = std::fs::remove_file(&path) {
                tracing::warn!("could not prune {}: {err}", path.display());
            }
        }
        Ok(())
    }

    fn lock(&self) -> Result<StoreLock, LockError> {
        lock::acquire_file(
            &paths::lock_path(&self.state_dir),
            self.lock_timeout,
            self.stale_after,
        )
    }
}

/// Write `bytes` to `<path>.tmp`, restrict permissions, then rename over `path`.
///
/// `.tmp` is always a sibling of the target, so the rename never crosses
/// filesystems.
pub(crate) fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), StoreError> {
    let Some(dir) = path.parent() else {
        return Err(store_io(path, std::io::Error::other("path has no parent")));
    };
    std::fs::create_dir_all(dir).map_err(|e| store_io(dir, e))?;

    let mut tmp_name = path.file_name().unwrap_or_default().to_os_string();
    tmp_name.push(".tmp");
    let tmp = path.with_file_name(tmp_name);

    std::fs::write(&tmp, bytes).map_err(|e| store_io(&tmp, e))?;
    set_file_permissions(&tmp)?;
    if let Err(e) = std::fs::rename(&tmp, path) {
        let _ = std::fs::remove_file(&tmp);
        return Err(store_io(path, e));
    }
    Ok(())
}

#[cfg(unix)]
fn set_file_permissions(path: &Path) -> Result<(), StoreError> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))
        .map_err(|e| store_io(path, e))
}

#[cfg(not(unix))]
fn set_file_permissions(_path: &Path) -> Result<(), StoreError> {
    Ok(())
}

// ---------------------------------------------------------------------------
// Memory store
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
struct MemoryState {
    record: Option<ContractRecord>,
    snapshots: HashMap<Fingerprint, String>,
}

/// In-process store. Clones share state and lock.
#[derive(Debug, Clone)]
pub struct MemoryContractStore {
    state: Arc<Mutex<MemoryState>>,
    lock: MemoryLock,
    lock_timeout: Duration,
}

impl Default for MemoryContractStore {
    fn default() -> Self {
        Self::new(LockSettings::default().timeout())
    }
}

impl MemoryContractStore {
    pub fn new(lock_timeout: Duration) -> Self {
        Self {
            state: Arc::default(),
            lock: MemoryLock::default(),
            lock_timeout,
        }
    }

    fn with_state<T>(&self, f: impl FnOnce(&mut MemoryState) -> T) -> T {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut state)
    }
}

impl ContractStore for MemoryContractStore {
    fn current(&self) -> Result<Option<ContractRecord>, StoreError> {
        Ok(self.with_state(|s| s.record.clone()))
    }

    fn commit(&self, record: &ContractRecord, snapshot: &str) -> Result<(), StoreError> {
        self.with_state(|s| {
            s.snapshots
                .insert(record.fingerprint.clone(), snapshot.to_string());
            s.record = Some(record.clone());
        });
        Ok(())
    }

    fn restore(&self, previous: Option<&ContractRecord>) -> Result<(), StoreError> {
        self.with_state(|s| s.record = previous.cloned());
        Ok(())
    }

    fn snapshot(&self, fingerprint: &Fingerprint) -> Result<Option<String>, StoreError> {
        Ok(self.with_state(|s| s.snapshots.get(fingerprint).cloned()))
    }

    fn prune(&self, keep: &Fingerprint) -> Result<(), StoreError> {
        self.with_state(|s| s.snapshots.retain(|fp, _| fp == keep));
        Ok(())
    }

    fn lock(&self) -> Result<StoreLock, LockError> {
        self.lock.acquire(self.lock_timeout)
    }
}
