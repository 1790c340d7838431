//! Status of the live generated output against the applied record.
//!
//! Precedence:
//! 1. `NeverSynced` (no record)
//! 2. `Missing` (record exists, output path does not)
//! 3. `Modified` (output tree digest differs from the recorded one)
//! 4. `Current`

use std::io::ErrorKind;

use chrono::{DateTime, Utc};
use serde::Serialize;

use contract_sync_core::types::{ContractRecord, Fingerprint};

use crate::artifact;
use crate::error::StoreError;
use crate::store::ContractStore;

/// How the live output relates to what the store says was applied.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "kebab-case")]
pub enum ArtifactStatus {
    NeverSynced,
    Current,
    Modified { expected: Fingerprint, actual: Fingerprint },
    Missing,
}

impl ArtifactStatus {
    pub fn label(&self) -> &'static str {
        match self {
            ArtifactStatus::NeverSynced => "never-synced",
            ArtifactStatus::Current => "current",
            ArtifactStatus::Modified { .. } => "modified",
            ArtifactStatus::Missing => "missing",
        }
    }
}

/// Record plus the status derived from it.
#[derive(Debug, Clone, Serialize)]
pub struct StatusReport {
    pub record: Option<ContractRecord>,
    pub status: ArtifactStatus,
}

/// Read the current record and compare the live output against it.
///
/// An output tree that exists but cannot be read is reported as `Modified`
/// with an empty actual digest.
pub fn check(store: &dyn ContractStore) -> Result<StatusReport, StoreError> {
    let record = store.current()?;
    let status = match &record {
        None => ArtifactStatus::NeverSynced,
        Some(record) => classify(record),
    };
    Ok(StatusReport { record, status })
}

fn classify(record: &ContractRecord) -> ArtifactStatus {
    match std::fs::symlink_metadata(&record.artifact.path) {
        Err(err) if err.kind() == ErrorKind::NotFound => return ArtifactStatus::Missing,
        _ => {}
    }
    match artifact::describe(&record.artifact.path) {
        Ok(live) if live.digest == record.artifact.digest => ArtifactStatus::Current,
        Ok(live) => ArtifactStatus::Modified {
            expected: record.artifact.digest.clone(),
            actual: live.digest,
        },
        Err(err) => {
            tracing::warn!(
                "could not read {}: {err}",
                record.artifact.path.display()
            );
            ArtifactStatus::Modified {
                expected: record.artifact.digest.clone(),
                actual: Fingerprint(String::new()),
            }
        }
    }
}

/// Format age from a chrono timestamp (record `applied_at`).
pub fn format_datetime_age(timestamp: DateTime<Utc>) -> String {
    let now = Utc::now();
    let age = now.signed_duration_since(timestamp).num_seconds().max(0) as u64;
    format_seconds(age)
}

fn format_seconds(seconds: u64) -> String {
    if seconds < 60 {
        return format!("{seconds}s");
    }
    if seconds < 60 * 60 {
        return format!("{}m", seconds / 60);
    }
    if seconds < 60 * 60 * 24 {
        return format!("{}h", seconds / (60 * 60));
    }
    format!("{}d", seconds / (60 * 60 * 24))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::path::Path;

    use contract_sync_core::types::{ArtifactRef, SourceLocation};
    use rstest::rstest;
    use tempfile::TempDir;

    use crate::store::MemoryContractStore;

    fn applied(store: &MemoryContractStore, output: &Path) {
        let artifact = artifact::describe(output).expect("describe");
        let record = ContractRecord {
            fingerprint: Fingerprint::from("abc"),
            source: SourceLocation::Http("https://api.example.com/openapi.json".into()),
            retrieved_at: Utc::now(),
            applied_at: Utc::now(),
            artifact: ArtifactRef {
                path: output.to_path_buf(),
                ..artifact
            },
            api_version: None,
        };
        store.commit(&record, "{}\n").expect("commit");
    }

    #[test]
    fn empty_store_is_never_synced() {
        let store = MemoryContractStore::default();
        let report = check(&store).unwrap();
        assert_eq!(report.status, ArtifactStatus::NeverSynced);
        assert!(report.record.is_none());
    }

    #[test]
    fn untouched_output_is_current() {
        let tmp = TempDir::new().unwrap();
        let output = tmp.path().join("client");
        fs::create_dir_all(&output).unwrap();
        fs::write(output.join("api.py"), "A").unwrap();
        let store = MemoryContractStore::default();
        applied(&store, &output);

        assert_eq!(check(&store).unwrap().status, ArtifactStatus::Current);
    }

    #[test]
    fn edited_output_is_modified() {
        let tmp = TempDir::new().unwrap();
        let output = tmp.path().join("client");
        fs::create_dir_all(&output).unwrap();
        fs::write(output.join("api.py"), "A").unwrap();
        let store = MemoryContractStore::default();
        applied(&store, &output);

        fs::write(output.join("api.py"), "hand edit").unwrap();
        let status = check(&store).unwrap().status;
        assert_eq!(status.label(), "modified");
    }

    #[test]
    fn deleted_output_is_missing() {
        let tmp = TempDir::new().unwrap();
        let output = tmp.path().join("client");
        fs::create_dir_all(&output).unwrap();
        fs::write(output.join("api.py"), "A").unwrap();
        let store = MemoryContractStore::default();
        applied(&store, &output);

        fs::remove_dir_all(&output).unwrap();
        assert_eq!(check(&store).unwrap().status, ArtifactStatus::Missing);
    }

    #[rstest]
    #[case(5, "5s")]
    #[case(125, "2m")]
    #[case(3 * 3600 + 10, "3h")]
    #[case(2 * 86400, "2d")]
    fn ages_use_largest_unit(#[case] seconds: u64, #[case] expected: &str) {
        assert_eq!(format_seconds(seconds), expected);
    }
}
