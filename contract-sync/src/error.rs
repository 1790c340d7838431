//! Error types for contract-sync.
//!
//! Each collaborator of the orchestrator has its own error. None of them
//! escape [`crate::SyncOrchestrator::run`]; they are folded into a
//! [`crate::SyncResult`] there.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Retrieval of a contract document failed.
#[derive(Debug, Error)]
pub enum FetchError {
    /// DNS, connect, TLS or timeout failure before a response arrived.
    #[error("request to {url} failed: {message}")]
    Transport { url: String, message: String },

    /// The server answered with a non-2xx status.
    #[error("{url} answered HTTP {status}")]
    Status { url: String, status: u16 },

    /// Local source could not be read.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Payload exceeded the configured size limit.
    #[error("contract from {location} exceeds {limit} bytes")]
    TooLarge { location: String, limit: u64 },

    /// Payload is not a decodable contract document.
    #[error("malformed contract from {location}: {reason}")]
    Malformed { location: String, reason: String },
}

/// The persisted record could not be read or written.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("record JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A record file exists but does not parse.
    #[error("corrupt record at {path}: {source}")]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// A state file guarded by its own lock (run history) stayed locked.
    #[error("lock error: {0}")]
    Lock(#[from] LockError),
}

/// The run lock could not be taken.
#[derive(Debug, Error)]
pub enum LockError {
    /// Another run held the lock for the whole wait.
    #[error("another sync holds {path} ({holder}); gave up after {}ms", .waited.as_millis())]
    Contended {
        path: PathBuf,
        holder: String,
        waited: Duration,
    },

    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// The external generator did not produce a usable client.
#[derive(Debug, Error)]
pub enum GenerationError {
    /// The generator program could not be started.
    #[error("could not start generator `{program}`: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    /// The generator ran and reported failure.
    #[error("generator `{program}` failed ({}): {stderr}", exit_label(.code))]
    Failed {
        program: String,
        code: Option<i32>,
        stderr: String,
    },

    /// The generator claimed success but left nothing behind.
    #[error("generator produced no output at {path}")]
    MissingOutput { path: PathBuf },

    /// Staging or promotion I/O.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

fn exit_label(code: &Option<i32>) -> String {
    match code {
        Some(code) => format!("exit code {code}"),
        None => "terminated by signal".to_string(),
    }
}

/// Everything that can go wrong after a contract was fetched.
///
/// Reported to callers as the `generation-failed` outcome.
#[derive(Debug, Error)]
pub enum ApplyError {
    #[error(transparent)]
    Generation(#[from] GenerationError),

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("lock error: {0}")]
    Lock(#[from] LockError),
}

pub(crate) fn store_io(path: impl Into<PathBuf>, source: std::io::Error) -> StoreError {
    StoreError::Io {
        path: path.into(),
        source,
    }
}

pub(crate) fn generation_io(path: impl Into<PathBuf>, source: std::io::Error) -> GenerationError {
    GenerationError::Io {
        path: path.into(),
        source,
    }
}

pub(crate) fn lock_io(path: impl Into<PathBuf>, source: std::io::Error) -> LockError {
    LockError::Io {
        path: path.into(),
        source,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generation_failure_message_includes_exit_code() {
        let err = GenerationError::Failed {
            program: "openapi-python-client".into(),
            code: Some(2),
            stderr: "bad schema".into(),
        };
        assert_eq!(
            err.to_string(),
            "generator `openapi-python-client` failed (exit code 2): bad schema"
        );
    }

    #[test]
    fn signal_termination_is_labelled() {
        let err = GenerationError::Failed {
            program: "gen".into(),
            code: None,
            stderr: String::new(),
        };
        assert!(err.to_string().contains("terminated by signal"));
    }
}
