//! Sync orchestration: fetch → compare → generate → commit → promote.
//!
//! ```text
//! Idle → Fetching → Comparing → Generating → Committing → Idle
//!           │           │            │            │
//!           └───────────┴────────────┴────────────┴──→ Idle (with failure)
//! ```
//!
//! 1. Fetch the candidate. Failure ends the run as `fetch-failed`; nothing
//!    is touched. The lock is not taken for this step.
//! 2. Take the store lock, load the current record, detect drift. No drift
//!    (and no `force`) ends the run as `unchanged` without generating.
//! 3. Generate into the staging location next to the output.
//! 4. Commit the new record, then promote staging to the live output. If
//!    promotion fails the store is rolled back to the previous record.
//!
//! Any failure in 2–4 ends the run as `generation-failed`; staged output is
//! discarded and the store keeps its previous record. The lock is released
//! on every path when the guard drops.

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::Serialize;

use contract_sync_core::paths;
use contract_sync_core::types::{ArtifactRef, ContractRecord, Fingerprint, SourceLocation};

use crate::artifact;
use crate::contract::Contract;
use crate::drift::{self, Drift};
use crate::error::{ApplyError, FetchError};
use crate::fetcher::ContractFetcher;
use crate::generator::ClientGenerator;
use crate::store::ContractStore;

// ---------------------------------------------------------------------------
// Outcome types
// ---------------------------------------------------------------------------

/// Orchestrator state, recorded in visiting order on every run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncState {
    Idle,
    Fetching,
    Comparing,
    Generating,
    Committing,
}

/// What happened in one run.
#[derive(Debug)]
pub enum SyncResult {
    /// Candidate matches the applied contract; the generator was not run.
    Unchanged { fingerprint: Fingerprint },
    /// A new client was generated, committed and promoted.
    Regenerated {
        record: ContractRecord,
        previous: Option<Fingerprint>,
        forced: bool,
    },
    /// The candidate could not be retrieved or decoded.
    FetchFailed { error: FetchError },
    /// Lock, generation, commit or promotion failed; the store is unchanged.
    GenerationFailed { error: ApplyError },
}

/// Stable names for [`SyncResult`] variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum SyncResultKind {
    Unchanged,
    Regenerated,
    FetchFailed,
    GenerationFailed,
}

impl SyncResultKind {
    pub fn is_success(self) -> bool {
        matches!(self, SyncResultKind::Unchanged | SyncResultKind::Regenerated)
    }
}

impl fmt::Display for SyncResultKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SyncResultKind::Unchanged => write!(f, "unchanged"),
            SyncResultKind::Regenerated => write!(f, "regenerated"),
            SyncResultKind::FetchFailed => write!(f, "fetch-failed"),
            SyncResultKind::GenerationFailed => write!(f, "generation-failed"),
        }
    }
}

impl SyncResult {
    pub fn kind(&self) -> SyncResultKind {
        match self {
            SyncResult::Unchanged { .. } => SyncResultKind::Unchanged,
            SyncResult::Regenerated { .. } => SyncResultKind::Regenerated,
            SyncResult::FetchFailed { .. } => SyncResultKind::FetchFailed,
            SyncResult::GenerationFailed { .. } => SyncResultKind::GenerationFailed,
        }
    }

    /// Fingerprint the store holds for this run's source after the run, when known.
    pub fn fingerprint(&self) -> Option<&Fingerprint> {
        match self {
            SyncResult::Unchanged { fingerprint } => Some(fingerprint),
            SyncResult::Regenerated { record, .. } => Some(&record.fingerprint),
            _ => None,
        }
    }

    /// Message of the underlying error for failed runs.
    pub fn error_message(&self) -> Option<String> {
        match self {
            SyncResult::FetchFailed { error } => Some(error.to_string()),
            SyncResult::GenerationFailed { error } => Some(error.to_string()),
            _ => None,
        }
    }
}

/// One orchestration run: its result plus the states it went through.
#[derive(Debug)]
pub struct SyncReport {
    pub result: SyncResult,
    pub states: Vec<SyncState>,
    pub started_at: DateTime<Utc>,
    pub duration_ms: u128,
}

/// Per-run switches.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncOptions {
    /// Regenerate even when no drift is detected.
    pub force: bool,
}

// ---------------------------------------------------------------------------
// Orchestrator
// ---------------------------------------------------------------------------

/// Sequences one contract source, one store, one generator and one output.
pub struct SyncOrchestrator<'a> {
    fetcher: &'a dyn ContractFetcher,
    store: &'a dyn ContractStore,
    generator: &'a dyn ClientGenerator,
    source: SourceLocation,
    output: PathBuf,
}

impl<'a> SyncOrchestrator<'a> {
    pub fn new(
        fetcher: &'a dyn ContractFetcher,
        store: &'a dyn ContractStore,
        generator: &'a dyn ClientGenerator,
        source: SourceLocation,
        output: impl Into<PathBuf>,
    ) -> Self {
        Self {
            fetcher,
            store,
            generator,
            source,
            output: output.into(),
        }
    }

    pub fn source(&self) -> &SourceLocation {
        &self.source
    }

    pub fn output(&self) -> &Path {
        &self.output
    }

    /// Run once. Never fails: every error is folded into the returned result.
    pub fn run(&self, options: SyncOptions) -> SyncReport {
        let mut trace = Trace::start();

        trace.enter(SyncState::Fetching);
        let candidate = match self.fetcher.fetch(&self.source) {
            Ok(candidate) => candidate,
            Err(error) => {
                tracing::warn!("fetch from {} failed: {error}", self.source);
                return trace.finish(SyncResult::FetchFailed { error });
            }
        };
        tracing::info!(
            "fetched contract {} from {}",
            candidate.fingerprint().short(),
            self.source
        );

        let result = match self.apply(&candidate, options, &mut trace) {
            Ok(result) => result,
            Err(error) => {
                tracing::warn!("sync of {} failed: {error}", self.output.display());
                SyncResult::GenerationFailed { error }
            }
        };
        trace.finish(result)
    }

    fn apply(
        &self,
        candidate: &Contract,
        options: SyncOptions,
        trace: &mut Trace,
    ) -> Result<SyncResult, ApplyError> {
        trace.enter(SyncState::Comparing);
        let _lock = self.store.lock()?;
        let current = self.store.current()?;

        let drift = drift::detect(candidate, current.as_ref());
        if !drift.requires_generation() && !options.force {
            tracing::info!(
                "contract {} unchanged; skipping generation",
                candidate.fingerprint().short()
            );
            return Ok(SyncResult::Unchanged {
                fingerprint: candidate.fingerprint().clone(),
            });
        }
        log_drift(&drift, options);

        trace.enter(SyncState::Generating);
        let staging = Staging::prepare(&self.output)?;
        let generated = self.generator.generate(candidate, staging.path())?;

        trace.enter(SyncState::Committing);
        let record = ContractRecord {
            fingerprint: candidate.fingerprint().clone(),
            source: candidate.source().clone(),
            retrieved_at: candidate.retrieved_at(),
            applied_at: Utc::now(),
            artifact: ArtifactRef {
                path: self.output.clone(),
                ..generated
            },
            api_version: candidate.api_version().map(str::to_string),
        };
        self.store.commit(&record, &candidate.canonical_pretty())?;

        if let Err(err) = artifact::promote(staging.path(), &self.output) {
            if let Err(restore) = self.store.restore(current.as_ref()) {
                tracing::error!("could not roll back record after failed promotion: {restore}");
            }
            return Err(err.into());
        }

        if let Err(err) = self.store.prune(&record.fingerprint) {
            tracing::warn!("could not prune old snapshots: {err}");
        }

        tracing::info!(
            "regenerated {} from contract {} ({} files)",
            self.output.display(),
            record.fingerprint.short(),
            record.artifact.files
        );
        Ok(SyncResult::Regenerated {
            previous: current.map(|r| r.fingerprint),
            record,
            forced: options.force,
        })
    }
}

fn log_drift(drift: &Drift, options: SyncOptions) {
    match drift {
        Drift::NeverSynced => tracing::info!("no applied contract yet; generating"),
        Drift::Changed {
            previous,
            candidate,
        } => tracing::info!(
            "contract drift {} -> {}; regenerating",
            previous.short(),
            candidate.short()
        ),
        Drift::None if options.force => {
            tracing::info!("no drift; regenerating because --force was given")
        }
        Drift::None => {}
    }
}

/// Staging directory that is discarded on drop unless it has been promoted.
struct Staging {
    path: PathBuf,
}

impl Staging {
    fn prepare(output: &Path) -> Result<Self, ApplyError> {
        let path = artifact::prepare_staging(output)?;
        debug_assert_eq!(path, paths::staging_path(output));
        Ok(Self { path })
    }

    fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for Staging {
    fn drop(&mut self) {
        if std::fs::symlink_metadata(&self.path).is_ok() {
            artifact::discard(&self.path);
        }
    }
}

struct Trace {
    states: Vec<SyncState>,
    started_at: DateTime<Utc>,
    started: Instant,
}

impl Trace {
    fn start() -> Self {
        Self {
            states: vec![SyncState::Idle],
            started_at: Utc::now(),
            started: Instant::now(),
        }
    }

    fn enter(&mut self, state: SyncState) {
        tracing::debug!("sync state -> {state:?}");
        self.states.push(state);
    }

    fn finish(mut self, result: SyncResult) -> SyncReport {
        self.enter(SyncState::Idle);
        SyncReport {
            result,
            states: self.states,
            started_at: self.started_at,
            duration_ms: self.started.elapsed().as_millis(),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
