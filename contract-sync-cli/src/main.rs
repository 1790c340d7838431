//! contract-sync — keep a generated API client in step with its contract.
//!
//! # Usage
//!
//! ```text
//! contract-sync init [--source <loc>] [--output <path>] [--force]
//! contract-sync sync [--force] [--source <loc>] [--output <path>] [--generator <cmd>] [--json]
//! contract-sync status [--json]
//! contract-sync diff [--source <loc>]
//! contract-sync watch [--interval <secs>] [--max-runs <n>] [--json]
//! ```
//!
//! Every command except `init` accepts `--config <file>`.

mod commands;

use std::process::ExitCode;

use clap::{Parser, Subcommand};
use colored::Colorize;

use commands::{
    diff::DiffArgs, init::InitArgs, status::StatusArgs, sync::SyncArgs, watch::WatchArgs,
};
use contract_sync_daemon::{init_tracing, LogFormat};

// ---------------------------------------------------------------------------
// CLI entry point
// ---------------------------------------------------------------------------

#[derive(Parser, Debug)]
#[command(
    name = "contract-sync",
    version,
    about = "Regenerate an API client only when its OpenAPI contract changes",
    long_about = None,
)]
struct Cli {
    /// Emit log lines as JSON on stderr.
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Write a starter contract-sync.yaml in the current directory.
    Init(InitArgs),

    /// Fetch the contract and regenerate the client if it drifted.
    Sync(SyncArgs),

    /// Show the applied contract and whether the generated client still matches it.
    Status(StatusArgs),

    /// Show a unified diff between the applied contract and the current one.
    Diff(DiffArgs),

    /// Sync on an interval until interrupted.
    Watch(WatchArgs),
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

fn main() -> ExitCode {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) => {
            let _ = err.print();
            return if err.use_stderr() {
                ExitCode::from(commands::EXIT_ERROR)
            } else {
                ExitCode::SUCCESS
            };
        }
    };

    init_tracing(if cli.log_json {
        LogFormat::Json
    } else {
        LogFormat::Text
    });

    let result = match cli.command {
        Commands::Init(args) => args.run(),
        Commands::Sync(args) => args.run(),
        Commands::Status(args) => args.run(),
        Commands::Diff(args) => args.run(),
        Commands::Watch(args) => args.run(),
    };

    match result {
        Ok(code) => code,
        Err(err) => {
            eprintln!("{} {err:#}", "error:".red().bold());
            ExitCode::from(commands::EXIT_ERROR)
        }
    }
}
