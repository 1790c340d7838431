//! `contract-sync diff` — unified diff of the applied contract against the current one.

use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;

use contract_sync::{Pipeline, PipelineError};
use contract_sync_core::config::Overrides;
use contract_sync_core::types::SourceLocation;

use super::{ConfigArg, EXIT_FETCH_FAILED};

/// Arguments for `contract-sync diff`.
#[derive(Args, Debug)]
pub struct DiffArgs {
    /// Contract location, overriding the configured one.
    #[arg(long, value_name = "LOCATION")]
    pub source: Option<SourceLocation>,

    #[command(flatten)]
    pub config: ConfigArg,
}

impl DiffArgs {
    pub fn run(self) -> Result<ExitCode> {
        let config = self.config.load(Overrides {
            source: self.source,
            ..Overrides::default()
        })?;
        let pipeline = Pipeline::new(config);

        let diff = match pipeline.diff() {
            Ok(diff) => diff,
            Err(PipelineError::Fetch(err)) => {
                eprintln!("{} fetch failed: {err}", "✗".red().bold());
                return Ok(ExitCode::from(EXIT_FETCH_FAILED));
            }
            Err(err) => return Err(err).context("diff failed"),
        };

        if !diff.has_changes() {
            println!("No differences (contract {}).", diff.candidate.short());
            return Ok(ExitCode::SUCCESS);
        }

        print!("{}", diff.unified_diff);
        if !diff.unified_diff.ends_with('\n') {
            println!();
        }
        Ok(ExitCode::SUCCESS)
    }
}
