//! Domain types shared by the sync pipeline, the scheduler and the CLI.
//!
//! All path fields use `PathBuf`; never `&str` or `String` for filesystem paths.
//! Persisted types are serializable via serde (JSON for the record, YAML for
//! configuration).

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Newtypes
// ---------------------------------------------------------------------------

/// Content-derived identity of a contract document (lowercase hex SHA-256).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Fingerprint(pub String);

impl Fingerprint {
    /// First 12 hex characters, for log lines and tables.
    pub fn short(&self) -> &str {
        let end = self.0.len().min(12);
        &self.0[..end]
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<String> for Fingerprint {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for Fingerprint {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

// ---------------------------------------------------------------------------
// Source location
// ---------------------------------------------------------------------------

/// Where a contract document is retrieved from.
///
/// `http://` and `https://` strings are remote; `file://` strings and bare
/// paths are local files.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub enum SourceLocation {
    Http(String),
    File(PathBuf),
}

impl SourceLocation {
    /// Resolve a relative file location against `base`. Remote and absolute
    /// locations are returned unchanged.
    pub fn resolve_against(self, base: &Path) -> Self {
        match self {
            SourceLocation::File(path) if path.is_relative() => {
                SourceLocation::File(base.join(path))
            }
            other => other,
        }
    }

    pub fn is_remote(&self) -> bool {
        matches!(self, SourceLocation::Http(_))
    }
}

impl fmt::Display for SourceLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceLocation::Http(url) => f.write_str(url),
            SourceLocation::File(path) => write!(f, "{}", path.display()),
        }
    }
}

impl FromStr for SourceLocation {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if trimmed.is_empty() {
            return Err("source location is empty".to_string());
        }
        let lower = trimmed.to_ascii_lowercase();
        if lower.starts_with("http://") || lower.starts_with("https://") {
            return Ok(SourceLocation::Http(trimmed.to_string()));
        }
        if let Some(path) = trimmed.strip_prefix("file://") {
            if path.is_empty() {
                return Err(format!("invalid file location '{trimmed}'"));
            }
            return Ok(SourceLocation::File(PathBuf::from(path)));
        }
        if let Some((scheme, _)) = trimmed.split_once("://") {
            return Err(format!(
                "unsupported scheme '{scheme}'; expected http, https or file"
            ));
        }
        Ok(SourceLocation::File(PathBuf::from(trimmed)))
    }
}

impl TryFrom<String> for SourceLocation {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<SourceLocation> for String {
    fn from(location: SourceLocation) -> Self {
        location.to_string()
    }
}

// ---------------------------------------------------------------------------
// Persisted record
// ---------------------------------------------------------------------------

/// Reference to a generated client tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactRef {
    /// Location of the generated output.
    pub path: PathBuf,
    /// Number of regular files in the tree.
    pub files: usize,
    /// Tree digest over sorted relative paths and file contents.
    pub digest: Fingerprint,
}

/// The last successfully applied contract.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContractRecord {
    pub fingerprint: Fingerprint,
    pub source: SourceLocation,
    pub retrieved_at: DateTime<Utc>,
    pub applied_at: DateTime<Utc>,
    pub artifact: ArtifactRef,
    /// `info.version` of the applied document, when present.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_version: Option<String>,
}

// ---------------------------------------------------------------------------
// Document format
// ---------------------------------------------------------------------------

/// Expected encoding of the contract payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum DocumentFormat {
    /// JSON first, YAML as a fallback.
    #[default]
    Auto,
    Json,
    Yaml,
}

impl fmt::Display for DocumentFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DocumentFormat::Auto => write!(f, "auto"),
            DocumentFormat::Json => write!(f, "json"),
            DocumentFormat::Yaml => write!(f, "yaml"),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_remote_locations() {
        let loc: SourceLocation = "https://api.example.com/openapi.json".parse().unwrap();
        assert_eq!(
            loc,
            SourceLocation::Http("https://api.example.com/openapi.json".to_string())
        );
        assert!(loc.is_remote());
    }

    #[test]
    fn parses_file_scheme_and_bare_paths() {
        let a: SourceLocation = "file:///tmp/openapi.yaml".parse().unwrap();
        assert_eq!(a, SourceLocation::File(PathBuf::from("/tmp/openapi.yaml")));
        let b: SourceLocation = "specs/openapi.json".parse().unwrap();
        assert_eq!(b, SourceLocation::File(PathBuf::from("specs/openapi.json")));
    }

    #[test]
    fn rejects_unknown_scheme_and_empty() {
        assert!("ftp://host/spec.json".parse::<SourceLocation>().is_err());
        assert!("   ".parse::<SourceLocation>().is_err());
    }

    #[test]
    fn relative_file_resolves_against_base() {
        let loc = SourceLocation::File(PathBuf::from("openapi.json"));
        let resolved = loc.resolve_against(Path::new("/srv/project"));
        assert_eq!(
            resolved,
            SourceLocation::File(PathBuf::from("/srv/project/openapi.json"))
        );
    }

    #[test]
    fn fingerprint_short_is_prefix() {
        let fp = Fingerprint::from("0123456789abcdef0123");
        assert_eq!(fp.short(), "0123456789ab");
        assert_eq!(Fingerprint::from("abc").short(), "abc");
    }

    #[test]
    fn record_serde_roundtrip_keeps_location_as_string() {
        let now = Utc::now();
        let record = ContractRecord {
            fingerprint: Fingerprint::from("h1"),
            source: SourceLocation::Http("https://example.com/openapi.json".into()),
            retrieved_at: now,
            applied_at: now,
            artifact: ArtifactRef {
                path: PathBuf::from("client"),
                files: 3,
                digest: Fingerprint::from("d1"),
            },
            api_version: None,
        };
        let json = serde_json::to_string(&record).expect("serialize");
        assert!(json.contains(r#""source":"https://example.com/openapi.json""#));
        assert!(!json.contains("api_version"));
        let back: ContractRecord = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(back, record);
    }
}
