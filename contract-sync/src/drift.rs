//! Drift detection: does the candidate differ from what was last applied?
//!
//! Content-based only. Timestamps and source location never count, so
//! re-fetching an unchanged document never causes regeneration.

use contract_sync_core::types::{ContractRecord, Fingerprint};

use crate::contract::Contract;

/// Why a run should (or should not) regenerate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Drift {
    /// Nothing has been applied yet.
    NeverSynced,
    /// Candidate fingerprint differs from the applied one.
    Changed {
        previous: Fingerprint,
        candidate: Fingerprint,
    },
    /// Same content as the applied contract.
    None,
}

impl Drift {
    pub fn requires_generation(&self) -> bool {
        !matches!(self, Drift::None)
    }
}

/// Classify `candidate` against the current record.
pub fn detect(candidate: &Contract, current: Option<&ContractRecord>) -> Drift {
    match current {
        None => Drift::NeverSynced,
        Some(record) if record.fingerprint == *candidate.fingerprint() => Drift::None,
        Some(record) => Drift::Changed {
            previous: record.fingerprint.clone(),
            candidate: candidate.fingerprint().clone(),
        },
    }
}

/// `true` when `current` is absent or its fingerprint differs from the candidate's.
pub fn has_drift(candidate: &Contract, current: Option<&ContractRecord>) -> bool {
    detect(candidate, current).requires_generation()
}
