//! `contract-sync init [--source <loc>] [--output <path>] [--force]`

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Args;

use contract_sync_core::config::write_template_at;
use contract_sync_core::types::SourceLocation;

/// Write a starter configuration file.
#[derive(Args, Debug)]
pub struct InitArgs {
    /// Contract location (http(s) URL, file:// URL or path).
    #[arg(long, value_name = "LOCATION")]
    pub source: Option<SourceLocation>,

    /// Directory the generated client is promoted to.
    #[arg(long, value_name = "PATH")]
    pub output: Option<PathBuf>,

    /// Overwrite an existing contract-sync.yaml.
    #[arg(long)]
    pub force: bool,
}

impl InitArgs {
    pub fn run(self) -> Result<ExitCode> {
        let cwd = std::env::current_dir().context("could not determine current directory")?;
        let path = write_template_at(&cwd, self.source, self.output, self.force)
            .context("failed to write configuration")?;

        println!("✓ Wrote {}", path.display());
        println!("  Edit `generator.command` to match your client generator, then run `contract-sync sync`.");
        Ok(ExitCode::SUCCESS)
    }
}
