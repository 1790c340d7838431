//! Shared sync pipeline entrypoint used by CLI and scheduler.

use contract_sync_core::config::SyncConfig;
use contract_sync_core::paths;

use crate::contract::Contract;
use crate::diff::{diff_contract, ContractDiff};
use crate::error::{FetchError, StoreError};
use crate::fetcher::{ContractFetcher, LocationFetcher};
use crate::generator::CommandGenerator;
use crate::history::{self, HistoryEntry};
use crate::orchestrator::{SyncOptions, SyncOrchestrator, SyncReport};
use crate::status::{self, StatusReport};
use crate::store::FileContractStore;

/// Concrete components for one configured client.
#[derive(Clone)]
pub struct Pipeline {
    config: SyncConfig,
    fetcher: LocationFetcher,
    store: FileContractStore,
    generator: CommandGenerator,
}

impl Pipeline {
    pub fn new(config: SyncConfig) -> Self {
        let fetcher = LocationFetcher::new(&config.fetch, config.format);
        let store = FileContractStore::new(&config.state_dir, &config.lock);
        let generator = CommandGenerator::from_settings(&config.generator, &config.root);
        Self {
            config,
            fetcher,
            store,
            generator,
        }
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    pub fn store(&self) -> &FileContractStore {
        &self.store
    }

    /// Run the orchestrator once and record the run in the history file.
    ///
    /// History write failures are logged; they never change the run result.
    pub fn sync(&self, options: SyncOptions) -> SyncReport {
        let orchestrator = SyncOrchestrator::new(
            &self.fetcher,
            &self.store,
            &self.generator,
            self.config.source.clone(),
            &self.config.output,
        );
        let report = orchestrator.run(options);

        let entry = HistoryEntry::from_report(&report);
        let path = paths::history_path(&self.config.state_dir);
        if let Err(err) = history::append(&path, &entry, &self.config.history) {
            tracing::warn!("could not append to {}: {err}", path.display());
        }
        report
    }

    /// Fetch the configured source without touching any state.
    pub fn fetch(&self) -> Result<Contract, FetchError> {
        self.fetcher.fetch(&self.config.source)
    }

    /// Fetch and diff against the applied snapshot. Nothing is written.
    pub fn diff(&self) -> Result<ContractDiff, PipelineError> {
        let candidate = self.fetch()?;
        Ok(diff_contract(&self.store, &candidate)?)
    }

    pub fn status(&self) -> Result<StatusReport, StoreError> {
        status::check(&self.store)
    }

    pub fn recent_runs(&self, limit: usize) -> Result<Vec<HistoryEntry>, StoreError> {
        history::read_recent(&paths::history_path(&self.config.state_dir), limit)
    }
}

/// Failure of a read-only pipeline operation.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error(transparent)]
    Store(#[from] StoreError),
}
