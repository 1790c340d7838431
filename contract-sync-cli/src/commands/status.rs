//! `contract-sync status` — applied contract and generated-client health.

use std::process::ExitCode;

use anyhow::{Context, Result};
use chrono::{DateTime, Local, Utc};
use clap::Args;
use colored::Colorize;
use serde::Serialize;
use tabled::{settings::Style, Table, Tabled};

use contract_sync::history::HistoryEntry;
use contract_sync::status::format_datetime_age;
use contract_sync::{ArtifactStatus, Pipeline};
use contract_sync_core::config::Overrides;
use contract_sync_core::ContractRecord;

use super::{display_path, ConfigArg};

const RECENT_RUNS: usize = 5;

/// Arguments for `contract-sync status`.
#[derive(Args, Debug)]
pub struct StatusArgs {
    #[command(flatten)]
    pub config: ConfigArg,

    /// Emit machine-readable JSON.
    #[arg(long)]
    pub json: bool,
}

impl StatusArgs {
    pub fn run(self) -> Result<ExitCode> {
        let config = self.config.load(Overrides::default())?;
        let root = config.root.clone();
        let pipeline = Pipeline::new(config);

        let report = pipeline.status().context("failed to read contract record")?;
        let runs = pipeline
            .recent_runs(RECENT_RUNS)
            .context("failed to read run history")?;

        if self.json {
            let payload = StatusJson {
                profile: pipeline.config().profile.as_deref(),
                source: pipeline.config().source.to_string(),
                output: pipeline.config().output.display().to_string(),
                status: report.status.label(),
                detail: &report.status,
                record: report.record.as_ref(),
                recent_runs: &runs,
            };
            println!(
                "{}",
                serde_json::to_string_pretty(&payload)
                    .context("failed to serialize status JSON")?
            );
            return Ok(ExitCode::SUCCESS);
        }

        let profile = pipeline
            .config()
            .profile
            .as_deref()
            .map(|p| format!(" [{p}]"))
            .unwrap_or_default();
        println!(
            "contract-sync v{}{profile} | {} → {}",
            env!("CARGO_PKG_VERSION"),
            pipeline.config().source,
            display_path(&pipeline.config().output, &root),
        );
        println!(
            "{} {}",
            status_indicator(&report.status),
            status_label(&report.status).bold()
        );
        if let Some(record) = &report.record {
            println!("{}", record_table(record, &root));
        }
        print_runs(&runs);
        if !matches!(report.status, ArtifactStatus::Current) {
            println!("Run 'contract-sync sync --force' to regenerate the client.");
        }
        Ok(ExitCode::SUCCESS)
    }
}

#[derive(Serialize)]
struct StatusJson<'a> {
    profile: Option<&'a str>,
    source: String,
    output: String,
    status: &'static str,
    detail: &'a ArtifactStatus,
    record: Option<&'a ContractRecord>,
    recent_runs: &'a [HistoryEntry],
}

#[derive(Tabled)]
struct FieldRow {
    #[tabled(rename = "field")]
    field: &'static str,
    #[tabled(rename = "value")]
    value: String,
}

#[derive(Tabled)]
struct RunRow {
    #[tabled(rename = "started")]
    started: String,
    #[tabled(rename = "result")]
    result: String,
    #[tabled(rename = "fingerprint")]
    fingerprint: String,
    #[tabled(rename = "ms")]
    duration_ms: u64,
}

fn record_table(record: &ContractRecord, root: &std::path::Path) -> Table {
    let rows = vec![
        FieldRow {
            field: "fingerprint",
            value: record.fingerprint.0.clone(),
        },
        FieldRow {
            field: "api version",
            value: record.api_version.clone().unwrap_or_else(|| "-".to_string()),
        },
        FieldRow {
            field: "source",
            value: record.source.to_string(),
        },
        FieldRow {
            field: "retrieved",
            value: timestamp(record.retrieved_at),
        },
        FieldRow {
            field: "applied",
            value: timestamp(record.applied_at),
        },
        FieldRow {
            field: "output",
            value: format!(
                "{} ({} files)",
                display_path(&record.artifact.path, root),
                record.artifact.files
            ),
        },
    ];
    let mut table = Table::new(rows);
    table.with(Style::rounded());
    table
}

fn timestamp(at: DateTime<Utc>) -> String {
    format!(
        "{} ({} ago)",
        at.with_timezone(&Local).format("%Y-%m-%d %H:%M:%S"),
        format_datetime_age(at)
    )
}

fn print_runs(runs: &[HistoryEntry]) {
    if runs.is_empty() {
        println!("No runs recorded yet.");
        return;
    }
    let rows: Vec<RunRow> = runs
        .iter()
        .rev()
        .map(|run| RunRow {
            started: format!("{} ago", format_datetime_age(run.started_at)),
            result: if run.is_success() {
                run.result.clone()
            } else {
                format!("{} ✗", run.result)
            },
            fingerprint: run
                .fingerprint
                .as_ref()
                .map(|fp| fp.short().to_string())
                .unwrap_or_else(|| "-".to_string()),
            duration_ms: run.duration_ms,
        })
        .collect();
    let mut table = Table::new(rows);
    table.with(Style::rounded());
    println!("Recent runs");
    println!("{table}");
}

fn status_label(status: &ArtifactStatus) -> &'static str {
    match status {
        ArtifactStatus::NeverSynced => "NEVER SYNCED",
        ArtifactStatus::Current => "CURRENT",
        ArtifactStatus::Modified { .. } => "MODIFIED",
        ArtifactStatus::Missing => "MISSING",
    }
}

fn status_indicator(status: &ArtifactStatus) -> String {
    match status {
        ArtifactStatus::NeverSynced => "■".bright_black().bold().to_string(),
        ArtifactStatus::Current => "■".green().bold().to_string(),
        ArtifactStatus::Modified { .. } => "■".yellow().bold().to_string(),
        ArtifactStatus::Missing => "■".red().bold().to_string(),
    }
}
