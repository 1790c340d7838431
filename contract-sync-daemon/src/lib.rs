//! Scheduled runner for `contract-sync watch`.
//!
//! Runs one sync per tick on a Tokio runtime. The blocking orchestration
//! executes on the blocking pool; overlapping runs from other processes are
//! serialized by the store lock.

mod error;
mod runtime;
pub mod schedule;

pub use error::DaemonError;
pub use runtime::{init_tracing, run, run_with, start_blocking, LogFormat, WatchSummary};
pub use schedule::SchedulePolicy;
