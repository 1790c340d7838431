//! Dry-run unified diff support for `contract-sync diff`.

use similar::TextDiff;

use contract_sync_core::types::Fingerprint;

use crate::contract::Contract;
use crate::error::StoreError;
use crate::store::ContractStore;

/// Candidate compared against the applied snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContractDiff {
    pub applied: Option<Fingerprint>,
    pub candidate: Fingerprint,
    /// Empty when both fingerprints match.
    pub unified_diff: String,
}

impl ContractDiff {
    pub fn has_changes(&self) -> bool {
        self.applied.as_ref() != Some(&self.candidate)
    }
}

/// Compare `candidate` with the stored snapshot of the applied contract.
///
/// Nothing is written. With no applied contract the whole candidate shows as
/// added. A record whose snapshot has gone missing diffs against empty text.
pub fn diff_contract(
    store: &dyn ContractStore,
    candidate: &Contract,
) -> Result<ContractDiff, StoreError> {
    let applied = store.current()?.map(|r| r.fingerprint);

    let old = match &applied {
        Some(fp) => store.snapshot(fp)?.unwrap_or_default(),
        None => String::new(),
    };
    let new = candidate.canonical_pretty();

    let unified_diff = if applied.as_ref() == Some(candidate.fingerprint()) {
        String::new()
    } else {
        let old_header = match &applied {
            Some(fp) => format!("applied/{}", fp.short()),
            None => "applied/none".to_string(),
        };
        let new_header = format!("candidate/{}", candidate.fingerprint().short());
        TextDiff::from_lines(&old, &new)
            .unified_diff()
            .header(&old_header, &new_header)
            .context_radius(3)
            .to_string()
    };

    Ok(ContractDiff {
        applied,
        candidate: candidate.fingerprint().clone(),
        unified_diff,
    })
}
