//! `contract-sync watch` — scheduled syncs in the foreground.

use std::num::NonZeroUsize;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Args;

use contract_sync_core::config::Overrides;
use contract_sync_daemon::start_blocking;

use super::ConfigArg;

/// Arguments for `contract-sync watch`.
#[derive(Args, Debug)]
pub struct WatchArgs {
    /// Seconds between runs after a success, overriding `schedule.interval_secs`.
    #[arg(long, value_name = "SECS")]
    pub interval: Option<u64>,

    /// Stop after this many runs (at least 1).
    #[arg(long, value_name = "N")]
    pub max_runs: Option<NonZeroUsize>,

    #[command(flatten)]
    pub config: ConfigArg,

    /// Print the run summary as JSON on exit.
    #[arg(long)]
    pub json: bool,
}

impl WatchArgs {
    pub fn run(self) -> Result<ExitCode> {
        let config = self.config.load(Overrides {
            interval_secs: self.interval,
            ..Overrides::default()
        })?;

        let summary = start_blocking(config, self.max_runs.map(NonZeroUsize::get))
            .context("watch exited with error")?;

        if self.json {
            println!(
                "{}",
                serde_json::to_string_pretty(&summary)
                    .context("failed to serialize watch summary")?
            );
        } else {
            println!(
                "{} runs: {} regenerated, {} unchanged, {} fetch-failed, {} generation-failed",
                summary.runs,
                summary.regenerated,
                summary.unchanged,
                summary.fetch_failed,
                summary.generation_failed
            );
        }
        Ok(ExitCode::SUCCESS)
    }
}
