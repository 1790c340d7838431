//! Client generator interface and the process-backed implementation.
//!
//! The orchestrator treats generation as a black box: contract in, tree at
//! `output` out, or an error. Partial output after an error is never used.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use contract_sync_core::config::{GeneratorSettings, INPUT_PLACEHOLDER, OUTPUT_PLACEHOLDER};
use contract_sync_core::types::ArtifactRef;

use crate::artifact;
use crate::contract::Contract;
use crate::error::{generation_io, GenerationError};

const STDERR_TAIL_LINES: usize = 20;

/// Turns a contract into generated client sources at `output`.
pub trait ClientGenerator {
    /// Short label for logs.
    fn name(&self) -> &str;

    fn generate(&self, contract: &Contract, output: &Path) -> Result<ArtifactRef, GenerationError>;
}

/// Runs an external generator program from an argv template.
#[derive(Debug, Clone)]
pub struct CommandGenerator {
    command: Vec<String>,
    working_dir: PathBuf,
}

impl CommandGenerator {
    pub fn new(command: Vec<String>, working_dir: impl Into<PathBuf>) -> Self {
        Self {
            command,
            working_dir: working_dir.into(),
        }
    }

    /// Build from settings; `root` is used when no working dir is configured.
    pub fn from_settings(settings: &GeneratorSettings, root: &Path) -> Self {
        let dir = settings
            .working_dir
            .clone()
            .unwrap_or_else(|| root.to_path_buf());
        Self::new(settings.command.clone(), dir)
    }

    fn program(&self) -> &str {
        self.command.first().map(String::as_str).unwrap_or_default()
    }

    fn render_args(&self, input: &Path, output: &Path) -> Vec<String> {
        let input = input.to_string_lossy();
        let output = output.to_string_lossy();
        self.command
            .iter()
            .skip(1)
            .map(|arg| {
                arg.replace(INPUT_PLACEHOLDER, &input)
                    .replace(OUTPUT_PLACEHOLDER, &output)
            })
            .collect()
    }
}

impl ClientGenerator for CommandGenerator {
    fn name(&self) -> &str {
        self.program()
    }

    fn generate(&self, contract: &Contract, output: &Path) -> Result<ArtifactRef, GenerationError> {
        let program = self.program().to_string();

        // The input file lives outside the staging tree so it never ends up
        // in the generated client.
        let mut input = tempfile::Builder::new()
            .prefix("contract-")
            .suffix(&format!(".{}", contract.encoding().extension()))
            .tempfile()
            .map_err(|e| generation_io(std::env::temp_dir(), e))?;
        input
            .write_all(contract.raw())
            .and_then(|()| input.flush())
            .map_err(|e| generation_io(input.path(), e))?;

        let args = self.render_args(input.path(), output);
        tracing::info!("running generator: {program} {}", args.join(" "));

        let result = Command::new(&program)
            .args(&args)
            .current_dir(&self.working_dir)
            .stdin(Stdio::null())
            .output()
            .map_err(|source| GenerationError::Spawn {
                program: program.clone(),
                source,
            })?;

        for line in String::from_utf8_lossy(&result.stdout).lines() {
            tracing::debug!("[{program}] {line}");
        }

        if !result.status.success() {
            return Err(GenerationError::Failed {
                program,
                code: result.status.code(),
                stderr: tail(&String::from_utf8_lossy(&result.stderr), STDERR_TAIL_LINES),
            });
        }

        if !artifact::has_content(output) {
            return Err(GenerationError::MissingOutput {
                path: output.to_path_buf(),
            });
        }

        artifact::describe(output)
    }
}

fn tail(text: &str, lines: usize) -> String {
    let all: Vec<&str> = text.trim_end().lines().collect();
    let start = all.len().saturating_sub(lines);
    all[start..].join("\n")
}
