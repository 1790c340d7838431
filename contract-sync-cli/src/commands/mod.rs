pub mod diff;
pub mod init;
pub mod status;
pub mod sync;
pub mod watch;

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Args;

use contract_sync::SyncResultKind;
use contract_sync_core::config::{self, Overrides, SyncConfig};

/// Configuration or usage error.
pub const EXIT_ERROR: u8 = 1;
pub const EXIT_FETCH_FAILED: u8 = 2;
pub const EXIT_GENERATION_FAILED: u8 = 3;

pub fn exit_code(kind: SyncResultKind) -> u8 {
    match kind {
        SyncResultKind::Unchanged | SyncResultKind::Regenerated => 0,
        SyncResultKind::FetchFailed => EXIT_FETCH_FAILED,
        SyncResultKind::GenerationFailed => EXIT_GENERATION_FAILED,
    }
}

/// `--config` and `--env` shared by every command that reads configuration.
#[derive(Args, Debug, Clone, Default)]
pub struct ConfigArg {
    /// Path to contract-sync.yaml (default: $CONTRACT_SYNC_CONFIG, then ./contract-sync.yaml).
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Profile from the config's `profiles:` section (default: $CONTRACT_SYNC_ENV).
    #[arg(long = "env", value_name = "NAME")]
    pub profile: Option<String>,
}

impl ConfigArg {
    /// Resolve configuration. Relative override paths are taken from the
    /// current directory, not the config file's.
    pub fn load(&self, overrides: Overrides) -> Result<SyncConfig> {
        let cwd = std::env::current_dir().context("could not determine current directory")?;
        let overrides = Overrides {
            source: overrides.source.map(|s| s.resolve_against(&cwd)),
            output: overrides.output.map(|o| cwd.join(o)),
            profile: overrides.profile.or_else(|| self.profile.clone()),
            ..overrides
        };
        config::load(&cwd, self.config.as_deref(), overrides)
            .context("could not load configuration (run `contract-sync init` to create one)")
    }
}

/// Turn `--generator` values into argv.
///
/// A single value is split on whitespace; repeating the flag passes each
/// value through as one argument, spaces included.
pub fn generator_argv(values: Vec<String>) -> Option<Vec<String>> {
    match values.len() {
        0 => None,
        1 => Some(config::split_command(&values[0])),
        _ => Some(values),
    }
}

pub fn display_path(path: &Path, root: &Path) -> String {
    path.strip_prefix(root)
        .unwrap_or(path)
        .display()
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exit_codes_distinguish_failures() {
        assert_eq!(exit_code(SyncResultKind::Unchanged), 0);
        assert_eq!(exit_code(SyncResultKind::Regenerated), 0);
        assert_eq!(exit_code(SyncResultKind::FetchFailed), 2);
        assert_eq!(exit_code(SyncResultKind::GenerationFailed), 3);
    }

    fn args(values: &[&str]) -> Vec<String> {
        values.iter().map(|v| v.to_string()).collect()
    }

    #[test]
    fn single_generator_value_splits_on_whitespace() {
        assert_eq!(
            generator_argv(args(&["gen  --in {input} --out {output}"])).unwrap(),
            vec!["gen", "--in", "{input}", "--out", "{output}"]
        );
    }

    #[test]
    fn repeated_generator_values_keep_their_spaces() {
        assert_eq!(
            generator_argv(args(&["gen", "--title", "My API", "{input}", "{output}"])).unwrap(),
            vec!["gen", "--title", "My API", "{input}", "{output}"]
        );
    }

    #[test]
    fn absent_generator_flag_is_no_override() {
        assert_eq!(generator_argv(Vec::new()), None);
    }
}
