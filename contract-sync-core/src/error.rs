//! Error types for contract-sync-core.

use std::path::PathBuf;

use thiserror::Error;

/// All errors that can arise while locating, loading or validating
/// configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Underlying I/O failure, with the path that was being accessed.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// YAML parse error on load; includes file path and line context from serde_yaml.
    #[error("failed to parse config at {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    /// YAML serialization error (write path).
    #[error("YAML serialization error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// A required field was neither in the file nor supplied as an override.
    #[error("missing required setting `{0}`")]
    Missing(&'static str),

    /// A field was present but unusable.
    #[error("invalid setting `{field}`: {reason}")]
    Invalid { field: &'static str, reason: String },

    /// `--env` / `CONTRACT_SYNC_ENV` named a profile the file does not define.
    #[error("unknown environment profile `{name}` (defined: {available})")]
    UnknownProfile { name: String, available: String },

    /// A `${NAME}` reference in a setting points at an unset variable.
    #[error("`{field}` references unset environment variable `{var}`")]
    UnsetVariable { field: String, var: String },

    /// Refusing to overwrite an existing config file.
    #[error("config already exists at {path}")]
    AlreadyExists { path: PathBuf },
}

pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> ConfigError {
    ConfigError::Io {
        path: path.into(),
        source,
    }
}
