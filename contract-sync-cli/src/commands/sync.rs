//! `contract-sync sync` — one drift-gated regeneration run.

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{ArgAction, Args};
use colored::Colorize;
use serde::Serialize;

use contract_sync::{Pipeline, SyncOptions, SyncReport, SyncResult, SyncState};
use contract_sync_core::config::Overrides;
use contract_sync_core::types::SourceLocation;

use super::{display_path, exit_code, generator_argv, ConfigArg};

/// Arguments for `contract-sync sync`.
#[derive(Args, Debug)]
pub struct SyncArgs {
    /// Regenerate even when the contract fingerprint is unchanged.
    #[arg(long)]
    pub force: bool,

    /// Contract location, overriding the configured one.
    #[arg(long, value_name = "LOCATION")]
    pub source: Option<SourceLocation>,

    /// Output directory, overriding the configured one.
    #[arg(long, value_name = "PATH")]
    pub output: Option<PathBuf>,

    /// Generator command with {input} and {output} placeholders. A single
    /// value is split on whitespace; repeat the flag once per argument to
    /// pass arguments containing spaces.
    #[arg(
        long,
        value_name = "COMMAND",
        action = ArgAction::Append,
        allow_hyphen_values = true
    )]
    pub generator: Vec<String>,

    #[command(flatten)]
    pub config: ConfigArg,

    /// Emit machine-readable JSON.
    #[arg(long)]
    pub json: bool,
}

impl SyncArgs {
    pub fn run(self) -> Result<ExitCode> {
        let config = self.config.load(Overrides {
            source: self.source,
            output: self.output,
            generator: generator_argv(self.generator),
            ..Overrides::default()
        })?;
        let root = config.root.clone();

        let report = Pipeline::new(config).sync(SyncOptions { force: self.force });

        if self.json {
            let payload = SyncReportJson::from_report(&report);
            println!(
                "{}",
                serde_json::to_string_pretty(&payload).context("failed to serialize sync JSON")?
            );
        } else {
            print_report(&report, &root);
        }

        Ok(ExitCode::from(exit_code(report.result.kind())))
    }
}

#[derive(Serialize)]
struct SyncReportJson {
    result: String,
    fingerprint: Option<String>,
    previous: Option<String>,
    forced: bool,
    output: Option<PathBuf>,
    files: Option<usize>,
    error: Option<String>,
    states: Vec<SyncState>,
    started_at: String,
    duration_ms: u128,
}

impl SyncReportJson {
    fn from_report(report: &SyncReport) -> Self {
        let (previous, forced, output, files) = match &report.result {
            SyncResult::Regenerated {
                record,
                previous,
                forced,
            } => (
                previous.as_ref().map(|fp| fp.0.clone()),
                *forced,
                Some(record.artifact.path.clone()),
                Some(record.artifact.files),
            ),
            _ => (None, false, None, None),
        };
        Self {
            result: report.result.kind().to_string(),
            fingerprint: report.result.fingerprint().map(|fp| fp.0.clone()),
            previous,
            forced,
            output,
            files,
            error: report.result.error_message(),
            states: report.states.clone(),
            started_at: report.started_at.to_rfc3339(),
            duration_ms: report.duration_ms,
        }
    }
}

fn print_report(report: &SyncReport, root: &std::path::Path) {
    match &report.result {
        SyncResult::Unchanged { fingerprint } => {
            println!(
                "{} contract {} unchanged — nothing to do",
                "·".bright_black(),
                fingerprint.short()
            );
        }
        SyncResult::Regenerated {
            record,
            previous,
            forced,
        } => {
            let from = previous
                .as_ref()
                .map(|fp| format!("{} → ", fp.short()))
                .unwrap_or_default();
            let note = if *forced { " (forced)" } else { "" };
            println!(
                "{} regenerated {} from contract {from}{}{note}",
                "✓".green().bold(),
                display_path(&record.artifact.path, root),
                record.fingerprint.short(),
            );
            println!(
                "  {} files, digest {}",
                record.artifact.files,
                record.artifact.digest.short()
            );
        }
        SyncResult::FetchFailed { error } => {
            eprintln!("{} fetch failed: {error}", "✗".red().bold());
        }
        SyncResult::GenerationFailed { error } => {
            eprintln!("{} generation failed: {error}", "✗".red().bold());
            eprintln!("  previous client and record left in place");
        }
    }
}
