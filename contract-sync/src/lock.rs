//! Exclusive run lock.
//!
//! At most one run may be between "compare" and "commit" for a given store.
//! The guard releases on drop, so every exit path (including `?` and panics
//! unwinding through the orchestrator) gives the lock back.
//!
//! File locks are `create_new` lock files holding an owner token. While the
//! guard is alive a heartbeat thread keeps touching the file, so only a lock
//! whose holder died stops being refreshed and ages past `stale_after`.
//! Breaking a stale lock happens under a short-lived `<lock>.break` file:
//! the breaker re-checks staleness while holding it, so two waiters can never
//! both remove a lock and one of them delete the other's fresh one.
//! Release only removes the file if it still carries our token.

use std::fs::OpenOptions;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::{Arc, Condvar, Mutex, PoisonError};
use std::thread::{sleep, JoinHandle};
use std::time::{Duration, Instant, SystemTime};

use chrono::Utc;
use filetime::FileTime;

use crate::error::{lock_io, LockError};

const POLL_INTERVAL: Duration = Duration::from_millis(50);
const MIN_HEARTBEAT: Duration = Duration::from_millis(10);

/// RAII guard for the run lock.
#[must_use = "the lock is released as soon as the guard is dropped"]
pub struct StoreLock {
    release: Option<Box<dyn FnOnce() + Send>>,
}

impl StoreLock {
    pub(crate) fn new(release: impl FnOnce() + Send + 'static) -> Self {
        Self {
            release: Some(Box::new(release)),
        }
    }
}

impl Drop for StoreLock {
    fn drop(&mut self) {
        if let Some(release) = self.release.take() {
            release();
        }
    }
}

impl std::fmt::Debug for StoreLock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoreLock")
            .field("held", &self.release.is_some())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// File lock
// ---------------------------------------------------------------------------

/// Take the lock file at `path`, waiting up to `timeout`.
pub fn acquire_file(
    path: &Path,
    timeout: Duration,
    stale_after: Duration,
) -> Result<StoreLock, LockError> {
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir).map_err(|e| lock_io(dir, e))?;
    }

    let token = format!(
        "pid={} at={} nonce={}",
        std::process::id(),
        Utc::now().to_rfc3339(),
        Utc::now().timestamp_nanos_opt().unwrap_or_default()
    );
    let started = Instant::now();

    loop {
        match OpenOptions::new().write(true).create_new(true).open(path) {
            Ok(mut file) => {
                if let Err(e) = file.write_all(token.as_bytes()) {
                    let _ = std::fs::remove_file(path);
                    return Err(lock_io(path, e));
                }
                drop(file);
                tracing::debug!("acquired lock {}", path.display());
                return hold(path.to_path_buf(), token, heartbeat_interval(stale_after));
            }
            Err(err) if err.kind() == ErrorKind::AlreadyExists => {
                if is_stale(path, stale_after) && break_stale(path, stale_after)? {
                    continue;
                }
                let waited = started.elapsed();
                if waited >= timeout {
                    return Err(LockError::Contended {
                        path: path.to_path_buf(),
                        holder: read_holder(path),
                        waited,
                    });
                }
                sleep(POLL_INTERVAL.min(timeout - waited));
            }
            Err(err) => return Err(lock_io(path, err)),
        }
    }
}

fn heartbeat_interval(stale_after: Duration) -> Duration {
    (stale_after / 4).max(MIN_HEARTBEAT)
}

/// Start the heartbeat and wrap both it and the lock file in a guard.
fn hold(path: PathBuf, token: String, every: Duration) -> Result<StoreLock, LockError> {
    let (stop, stopped) = mpsc::channel::<()>();
    let beat_path = path.clone();
    let beat_token = token.clone();
    let spawned = std::thread::Builder::new()
        .name("contract-sync-lock".to_string())
        .spawn(move || heartbeat(&beat_path, &beat_token, every, &stopped));
    let handle: JoinHandle<()> = match spawned {
        Ok(handle) => handle,
        Err(e) => {
            release_file(&path, &token);
            return Err(lock_io(&path, e));
        }
    };

    Ok(StoreLock::new(move || {
        drop(stop);
        if handle.join().is_err() {
            tracing::warn!("lock heartbeat for {} panicked", path.display());
        }
        release_file(&path, &token);
    }))
}

fn heartbeat(path: &Path, token: &str, every: Duration, stopped: &mpsc::Receiver<()>) {
    loop {
        match stopped.recv_timeout(every) {
            Err(RecvTimeoutError::Timeout) => {}
            Ok(()) | Err(RecvTimeoutError::Disconnected) => return,
        }
        match std::fs::read_to_string(path) {
            Ok(contents) if contents == token => {
                if let Err(err) = filetime::set_file_mtime(path, FileTime::now()) {
                    tracing::warn!("failed to refresh lock {}: {err}", path.display());
                }
            }
            Ok(_) => {
                tracing::warn!("lock {} was taken over by another run", path.display());
                return;
            }
            Err(err) => {
                tracing::warn!("lost lock {}: {err}", path.display());
                return;
            }
        }
    }
}

/// Remove `path` if it is still stale once we hold the breaker file.
///
/// Returns `true` when the lock was removed and acquisition should retry
/// right away.
fn break_stale(path: &Path, stale_after: Duration) -> Result<bool, LockError> {
    let breaker = breaker_path(path);
    match OpenOptions::new().write(true).create_new(true).open(&breaker) {
        Ok(_) => {}
        Err(err) if err.kind() == ErrorKind::AlreadyExists => {
            // A breaker that died mid-break leaves its file behind.
            if is_stale(&breaker, stale_after) {
                let _ = std::fs::remove_file(&breaker);
            }
            return Ok(false);
        }
        Err(err) => return Err(lock_io(&breaker, err)),
    }

    let broken = if is_stale(path, stale_after) {
        tracing::warn!(
            "breaking stale lock {} ({})",
            path.display(),
            read_holder(path)
        );
        match std::fs::remove_file(path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(true),
            Err(e) => Err(lock_io(path, e)),
        }
    } else {
        Ok(false)
    };

    if let Err(err) = std::fs::remove_file(&breaker) {
        tracing::warn!("failed to remove {}: {err}", breaker.display());
    }
    broken
}

fn breaker_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().unwrap_or(path.as_os_str()).to_os_string();
    name.push(".break");
    path.with_file_name(name)
}

fn release_file(path: &Path, token: &str) {
    match std::fs::read_to_string(path) {
        Ok(contents) if contents == token => {
            if let Err(err) = std::fs::remove_file(path) {
                tracing::warn!("failed to release lock {}: {err}", path.display());
            } else {
                tracing::debug!("released lock {}", path.display());
            }
        }
        Ok(_) => tracing::warn!(
            "lock {} was taken over by another run; leaving it",
            path.display()
        ),
        Err(err) if err.kind() == ErrorKind::NotFound => {}
        Err(err) => tracing::warn!("failed to read lock {}: {err}", path.display()),
    }
}

fn is_stale(path: &Path, stale_after: Duration) -> bool {
    let Ok(modified) = std::fs::metadata(path).and_then(|m| m.modified()) else {
        return false;
    };
    SystemTime::now()
        .duration_since(modified)
        .map(|age| age > stale_after)
        .unwrap_or(false)
}

fn read_holder(path: &Path) -> String {
    std::fs::read_to_string(path)
        .ok()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| "unknown holder".to_string())
}

// ---------------------------------------------------------------------------
// In-process lock
// ---------------------------------------------------------------------------

/// Lock shared by clones of an in-memory store.
#[derive(Debug, Clone, Default)]
pub struct MemoryLock {
    state: Arc<(Mutex<bool>, Condvar)>,
}

impl MemoryLock {
    pub fn acquire(&self, timeout: Duration) -> Result<StoreLock, LockError> {
        let (held, cvar) = &*self.state;
        let started = Instant::now();
        let mut guard = held.lock().unwrap_or_else(PoisonError::into_inner);
        while *guard {
            let waited = started.elapsed();
            if waited >= timeout {
                return Err(LockError::Contended {
                    path: PathBuf::from("<memory>"),
                    holder: "in-process run".to_string(),
                    waited,
                });
            }
            guard = cvar
                .wait_timeout(guard, timeout - waited)
                .unwrap_or_else(PoisonError::into_inner)
                .0;
        }
        *guard = true;
        drop(guard);

        let state = self.state.clone();
        Ok(StoreLock::new(move || {
            let (held, cvar) = &*state;
            *held.lock().unwrap_or_else(PoisonError::into_inner) = false;
            cvar.notify_one();
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use filetime::{set_file_mtime, FileTime};
    use tempfile::TempDir;

    const SHORT: Duration = Duration::from_millis(120);
    const LONG: Duration = Duration::from_secs(600);

    #[test]
    fn second_file_lock_times_out_while_first_is_held() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("sync.lock");
        let first = acquire_file(&path, SHORT, LONG).expect("first");
        let err = acquire_file(&path, SHORT, LONG).unwrap_err();
        match err {
            LockError::Contended { holder, waited, .. } => {
                assert!(holder.contains(&format!("pid={}", std::process::id())));
                assert!(waited >= SHORT);
            }
            other => panic!("unexpected error: {other}"),
        }
        drop(first);
        let _again = acquire_file(&path, SHORT, LONG).expect("after release");
    }

    #[test]
    fn drop_removes_lock_file() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("state").join("sync.lock");
        {
            let _guard = acquire_file(&path, SHORT, LONG).expect("acquire");
            assert!(path.exists());
        }
        assert!(!path.exists());
    }

    #[test]
    fn stale_lock_is_broken() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("sync.lock");
        std::fs::write(&path, "pid=1 at=long-ago").unwrap();
        let old = FileTime::from_system_time(SystemTime::now() - Duration::from_secs(3600));
        set_file_mtime(&path, old).unwrap();

        let _guard =
            acquire_file(&path, SHORT, Duration::from_secs(60)).expect("stale lock broken");
        let holder = std::fs::read_to_string(&path).unwrap();
        assert!(holder.contains(&format!("pid={}", std::process::id())));
    }

    #[test]
    fn held_lock_is_refreshed_past_stale_after() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("sync.lock");
        let stale_after = Duration::from_millis(300);
        let _held = acquire_file(&path, SHORT, stale_after).expect("first");

        std::thread::sleep(Duration::from_millis(1_000));

        let err = acquire_file(&path, SHORT, stale_after).unwrap_err();
        assert!(matches!(err, LockError::Contended { .. }), "{err}");
    }

    #[test]
    fn racing_waiters_break_a_stale_lock_once() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("sync.lock");
        std::fs::write(&path, "pid=1 at=long-ago").unwrap();
        let old = FileTime::from_system_time(SystemTime::now() - Duration::from_secs(3600));
        set_file_mtime(&path, old).unwrap();

        let barrier = std::sync::Barrier::new(8);
        let results: Vec<Result<StoreLock, LockError>> = std::thread::scope(|s| {
            let handles: Vec<_> = (0..8)
                .map(|_| {
                    s.spawn(|| {
                        barrier.wait();
                        acquire_file(&path, Duration::from_millis(300), Duration::from_secs(60))
                    })
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });

        let held = results.iter().filter(|r| r.is_ok()).count();
        assert_eq!(held, 1, "exactly one waiter may own the lock");
        assert!(!breaker_path(&path).exists());
    }

    #[test]
    fn abandoned_breaker_file_is_cleared() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("sync.lock");
        let old = FileTime::from_system_time(SystemTime::now() - Duration::from_secs(3600));
        std::fs::write(&path, "pid=1").unwrap();
        set_file_mtime(&path, old).unwrap();
        std::fs::write(breaker_path(&path), "").unwrap();
        set_file_mtime(breaker_path(&path), old).unwrap();

        let _guard = acquire_file(&path, Duration::from_secs(2), Duration::from_secs(60))
            .expect("stale lock broken after clearing the breaker");
    }

    #[test]
    fn release_leaves_a_lock_taken_over_by_someone_else() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("sync.lock");
        let guard = acquire_file(&path, SHORT, LONG).expect("acquire");
        std::fs::write(&path, "pid=other").unwrap();
        drop(guard);
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "pid=other");
    }

    #[test]
    fn memory_lock_waits_for_release() {
        let lock = MemoryLock::default();
        let first = lock.acquire(SHORT).expect("first");
        assert!(lock.acquire(SHORT).is_err());

        let other = lock.clone();
        let waiter = std::thread::spawn(move || other.acquire(Duration::from_secs(5)).is_ok());
        std::thread::sleep(Duration::from_millis(50));
        drop(first);
        assert!(waiter.join().unwrap(), "waiter should get the lock after release");
    }
}
