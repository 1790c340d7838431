//! # contract-sync
//!
//! Drift-gated client regeneration from a remote API contract.
//!
//! A run fetches the contract, compares its content fingerprint with the one
//! recorded for the applied contract, and only when they differ runs the
//! client generator into a staging directory, commits the new record and
//! promotes the generated tree. See [`orchestrator`] for the exact sequence.
//!
//! Use [`Pipeline`] to run against a resolved
//! [`SyncConfig`](contract_sync_core::SyncConfig), or assemble a
//! [`SyncOrchestrator`] from your own fetcher, store and generator.

pub mod artifact;
pub mod contract;
pub mod diff;
pub mod drift;
pub mod error;
pub mod fetcher;
pub mod generator;
pub mod history;
pub mod lock;
pub mod orchestrator;
pub mod pipeline;
pub mod status;
pub mod store;

pub use contract::Contract;
pub use drift::{has_drift, Drift};
pub use error::{ApplyError, FetchError, GenerationError, LockError, StoreError};
pub use fetcher::{ContractFetcher, LocationFetcher};
pub use generator::{ClientGenerator, CommandGenerator};
pub use orchestrator::{
    SyncOptions, SyncOrchestrator, SyncReport, SyncResult, SyncResultKind, SyncState,
};
pub use pipeline::{Pipeline, PipelineError};
pub use status::{ArtifactStatus, StatusReport};
pub use store::{ContractStore, FileContractStore, MemoryContractStore};
