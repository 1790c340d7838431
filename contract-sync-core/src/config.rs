//! YAML configuration for a synced client.
//!
//! # Lookup order
//!
//! 1. `--config <file>` (explicit path)
//! 2. `$CONTRACT_SYNC_CONFIG`
//! 3. `<cwd>/contract-sync.yaml`
//! 4. `<user config dir>/contract-sync/contract-sync.yaml`
//!
//! Relative paths inside the file (output, state dir, file sources) resolve
//! against the directory that contains it. Without any file, everything is
//! resolved against the current directory and the required settings must be
//! supplied as [`Overrides`].
//!
//! # Precedence
//!
//! Command-line flags, then `CONTRACT_SYNC_*` environment variables (see
//! [`Environment`]), then the selected entry of `profiles:`, then the
//! top-level values of the file. A selected profile without its own
//! `state_dir` keeps its state in `<state_dir>/<profile>`, so `dev` and
//! `prod` never share a record.
//!
//! Header values under `fetch.headers` may reference environment variables
//! as `${NAME}`; an unset variable is a configuration error.
//!
//! # API pattern
//!
//! As with the rest of the workspace, functions that touch the environment
//! have an `_at` form taking explicit inputs; tests only call `_at`.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{io_err, ConfigError};
use crate::paths;
use crate::types::{DocumentFormat, SourceLocation};

pub const CONFIG_FILE_NAME: &str = "contract-sync.yaml";
pub const CONFIG_ENV_VAR: &str = "CONTRACT_SYNC_CONFIG";
pub const SOURCE_ENV_VAR: &str = "CONTRACT_SYNC_SOURCE";
pub const OUTPUT_ENV_VAR: &str = "CONTRACT_SYNC_OUTPUT";
pub const GENERATOR_ENV_VAR: &str = "CONTRACT_SYNC_GENERATOR";
pub const INTERVAL_ENV_VAR: &str = "CONTRACT_SYNC_INTERVAL_SECS";
pub const PROFILE_ENV_VAR: &str = "CONTRACT_SYNC_ENV";

/// Placeholder replaced with the path of the contract file handed to the generator.
pub const INPUT_PLACEHOLDER: &str = "{input}";
/// Placeholder replaced with the staging directory the generator must write into.
pub const OUTPUT_PLACEHOLDER: &str = "{output}";

// ---------------------------------------------------------------------------
// 1. File schema
// ---------------------------------------------------------------------------

/// Contract retrieval settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FetchSettings {
    pub timeout_secs: u64,
    pub max_bytes: u64,
    /// Extra request headers for remote sources (API keys, client ids).
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub headers: BTreeMap<String, String>,
}

impl Default for FetchSettings {
    fn default() -> Self {
        Self {
            timeout_secs: 30,
            max_bytes: 16 * 1024 * 1024,
            headers: BTreeMap::new(),
        }
    }
}

impl FetchSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// External generator invocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct GeneratorSettings {
    /// argv template; `{input}` and `{output}` are substituted per run.
    pub command: Vec<String>,
    /// Working directory for the generator process (defaults to the config root).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub working_dir: Option<PathBuf>,
}

/// Run lock settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LockSettings {
    pub timeout_secs: u64,
    pub stale_after_secs: u64,
}

impl Default for LockSettings {
    fn default() -> Self {
        Self {
            timeout_secs: 30,
            stale_after_secs: 15 * 60,
        }
    }
}

impl LockSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn stale_after(&self) -> Duration {
        Duration::from_secs(self.stale_after_secs)
    }
}

/// Scheduled (`watch`) runs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScheduleSettings {
    pub interval_secs: u64,
    pub retry_base_secs: u64,
    pub max_backoff_secs: u64,
}

impl Default for ScheduleSettings {
    fn default() -> Self {
        Self {
            interval_secs: 60 * 60,
            retry_base_secs: 60,
            max_backoff_secs: 6 * 60 * 60,
        }
    }
}

/// Run history file rotation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HistorySettings {
    pub max_bytes: u64,
    pub max_files: usize,
}

impl Default for HistorySettings {
    fn default() -> Self {
        Self {
            max_bytes: 1024 * 1024,
            max_files: 5,
        }
    }
}

/// Named environment (`dev`, `prod`, ...) layered over the top-level values.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(default, deny_unknown_fields)]
pub struct Profile {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<SourceLocation>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state_dir: Option<PathBuf>,
    /// Replaces `generator.command` as a whole.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub generator: Option<Vec<String>>,
    /// Merged over `fetch.headers`, profile values winning.
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub headers: BTreeMap<String, String>,
}

/// On-disk `contract-sync.yaml` as written by users.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(default, deny_unknown_fields)]
pub struct ConfigFile {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<SourceLocation>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state_dir: Option<PathBuf>,
    pub format: DocumentFormat,
    pub fetch: FetchSettings,
    pub generator: GeneratorSettings,
    pub lock: LockSettings,
    pub schedule: ScheduleSettings,
    pub history: HistorySettings,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub profiles: BTreeMap<String, Profile>,
}

/// Values that take precedence over the file (flags, environment variables).
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub source: Option<SourceLocation>,
    pub output: Option<PathBuf>,
    pub generator: Option<Vec<String>>,
    pub interval_secs: Option<u64>,
    /// Name of the `profiles:` entry to apply.
    pub profile: Option<String>,
}

impl Overrides {
    /// Fill every unset field from `fallback`.
    pub fn or(self, fallback: Overrides) -> Overrides {
        Overrides {
            source: self.source.or(fallback.source),
            output: self.output.or(fallback.output),
            generator: self.generator.or(fallback.generator),
            interval_secs: self.interval_secs.or(fallback.interval_secs),
            profile: self.profile.or(fallback.profile),
        }
    }
}

/// Snapshot of environment variables used while resolving configuration.
///
/// Tests build one from pairs; [`load`] captures the process environment.
/// Empty values count as unset.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Environment {
    vars: BTreeMap<String, String>,
}

impl Environment {
    pub fn from_process() -> Self {
        std::env::vars_os()
            .filter_map(|(k, v)| Some((k.into_string().ok()?, v.into_string().ok()?)))
            .collect()
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.vars
            .get(name)
            .map(String::as_str)
            .filter(|v| !v.trim().is_empty())
    }

    /// Settings supplied as `CONTRACT_SYNC_*` variables.
    ///
    /// `CONTRACT_SYNC_GENERATOR` is split on whitespace like `--generator`.
    pub fn overrides(&self) -> Result<Overrides, ConfigError> {
        let source = self
            .get(SOURCE_ENV_VAR)
            .map(|raw| {
                raw.parse::<SourceLocation>()
                    .map_err(|reason| ConfigError::Invalid {
                        field: SOURCE_ENV_VAR,
                        reason,
                    })
            })
            .transpose()?;
        let interval_secs = self
            .get(INTERVAL_ENV_VAR)
            .map(|raw| {
                raw.trim()
                    .parse::<u64>()
                    .map_err(|e| ConfigError::Invalid {
                        field: INTERVAL_ENV_VAR,
                        reason: e.to_string(),
                    })
            })
            .transpose()?;
        Ok(Overrides {
            source,
            output: self.get(OUTPUT_ENV_VAR).map(PathBuf::from),
            generator: self.get(GENERATOR_ENV_VAR).map(split_command),
            interval_secs,
            profile: self.get(PROFILE_ENV_VAR).map(|p| p.trim().to_string()),
        })
    }

    fn config_path(&self) -> Option<PathBuf> {
        self.get(CONFIG_ENV_VAR).map(PathBuf::from)
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Environment {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            vars: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

/// Split a one-line generator command into argv on whitespace.
pub fn split_command(command: &str) -> Vec<String> {
    command.split_whitespace().map(str::to_string).collect()
}

// ---------------------------------------------------------------------------
// 2. Resolved configuration
// ---------------------------------------------------------------------------

/// Fully resolved settings for one synced client. All paths are absolute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncConfig {
    /// Directory relative paths were resolved against.
    pub root: PathBuf,
    /// File the settings came from, if any.
    pub config_path: Option<PathBuf>,
    /// Applied `profiles:` entry, if any.
    pub profile: Option<String>,
    pub source: SourceLocation,
    pub output: PathBuf,
    pub state_dir: PathBuf,
    pub format: DocumentFormat,
    pub fetch: FetchSettings,
    pub generator: GeneratorSettings,
    pub lock: LockSettings,
    pub schedule: ScheduleSettings,
    pub history: HistorySettings,
}

impl SyncConfig {
    /// Merge a parsed file (if any) with overrides and validate the result.
    ///
    /// `env` is only consulted for `${NAME}` references in header values;
    /// `CONTRACT_SYNC_*` overrides are expected to be folded into `overrides`.
    pub fn resolve(
        file: Option<(PathBuf, ConfigFile)>,
        cwd: &Path,
        overrides: Overrides,
        env: &Environment,
    ) -> Result<Self, ConfigError> {
        let (config_path, file) = match file {
            Some((path, file)) => (Some(path), file),
            None => (None, ConfigFile::default()),
        };
        let root = config_path
            .as_deref()
            .and_then(Path::parent)
            .map(Path::to_path_buf)
            .unwrap_or_else(|| cwd.to_path_buf());

        let profile_name = overrides.profile;
        let profile = match profile_name.as_deref() {
            Some(name) => select_profile(&file.profiles, name)?.clone(),
            None => Profile::default(),
        };

        let source = overrides
            .source
            .or(profile.source)
            .or(file.source)
            .ok_or(ConfigError::Missing("source"))?
            .resolve_against(&root);

        let output = overrides
            .output
            .or(profile.output)
            .or(file.output)
            .ok_or(ConfigError::Missing("output"))?;
        if output.as_os_str().is_empty() || output.file_name().is_none() {
            return Err(ConfigError::Invalid {
                field: "output",
                reason: format!("'{}' does not name a directory", output.display()),
            });
        }
        let output = root.join(output);

        let base_state = root.join(
            file.state_dir
                .unwrap_or_else(|| PathBuf::from(paths::DEFAULT_STATE_DIR)),
        );
        let state_dir = match (profile.state_dir, profile_name.as_deref()) {
            (Some(dir), _) => root.join(dir),
            (None, Some(name)) => base_state.join(name),
            (None, None) => base_state,
        };
        if output.starts_with(&state_dir) || state_dir.starts_with(&output) {
            return Err(ConfigError::Invalid {
                field: "state_dir",
                reason: "state directory and output must not contain each other".to_string(),
            });
        }

        let mut generator = file.generator;
        if let Some(command) = overrides.generator.or(profile.generator) {
            generator.command = command;
        }
        validate_generator(&generator)?;
        generator.working_dir = generator.working_dir.map(|dir| root.join(dir));

        let mut fetch = file.fetch;
        fetch.headers.extend(profile.headers);
        fetch.headers = expand_headers(fetch.headers, env)?;

        let mut schedule = file.schedule;
        if let Some(interval) = overrides.interval_secs {
            schedule.interval_secs = interval;
        }

        positive("fetch.timeout_secs", fetch.timeout_secs)?;
        positive("fetch.max_bytes", fetch.max_bytes)?;
        positive("schedule.interval_secs", schedule.interval_secs)?;
        positive("schedule.retry_base_secs", schedule.retry_base_secs)?;
        if schedule.max_backoff_secs < schedule.retry_base_secs {
            return Err(ConfigError::Invalid {
                field: "schedule.max_backoff_secs",
                reason: "must be at least schedule.retry_base_secs".to_string(),
            });
        }
        if file.history.max_files == 0 {
            return Err(ConfigError::Invalid {
                field: "history.max_files",
                reason: "must keep at least one rotated file".to_string(),
            });
        }

        Ok(Self {
            root,
            config_path,
            profile: profile_name,
            source,
            output,
            state_dir,
            format: file.format,
            fetch,
            generator,
            lock: file.lock,
            schedule,
            history: file.history,
        })
    }
}

fn select_profile<'a>(
    profiles: &'a BTreeMap<String, Profile>,
    name: &str,
) -> Result<&'a Profile, ConfigError> {
    let valid = !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    if !valid {
        return Err(ConfigError::Invalid {
            field: "profile",
            reason: format!("'{name}' may only contain letters, digits, '-' and '_'"),
        });
    }
    profiles.get(name).ok_or_else(|| ConfigError::UnknownProfile {
        name: name.to_string(),
        available: if profiles.is_empty() {
            "none".to_string()
        } else {
            profiles.keys().cloned().collect::<Vec<_>>().join(", ")
        },
    })
}

fn expand_headers(
    headers: BTreeMap<String, String>,
    env: &Environment,
) -> Result<BTreeMap<String, String>, ConfigError> {
    headers
        .into_iter()
        .map(|(name, value)| match expand_vars(&value, env) {
            Ok(value) => Ok((name, value)),
            Err(var) => Err(ConfigError::UnsetVariable {
                field: format!("fetch.headers.{name}"),
                var,
            }),
        })
        .collect()
}

/// Replace `${NAME}` with the variable's value. Returns the first unset name.
fn expand_vars(value: &str, env: &Environment) -> Result<String, String> {
    let mut out = String::with_capacity(value.len());
    let mut rest = value;
    while let Some(start) = rest.find("${") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        let Some(end) = after.find('}') else {
            out.push_str(&rest[start..]);
            return Ok(out);
        };
        let name = &after[..end];
        out.push_str(env.get(name).ok_or_else(|| name.to_string())?);
        rest = &after[end + 1..];
    }
    out.push_str(rest);
    Ok(out)
}

fn validate_generator(generator: &GeneratorSettings) -> Result<(), ConfigError> {
    let Some(program) = generator.command.first() else {
        return Err(ConfigError::Missing("generator.command"));
    };
    if program.trim().is_empty() {
        return Err(ConfigError::Invalid {
            field: "generator.command",
            reason: "program name is empty".to_string(),
        });
    }
    for placeholder in [INPUT_PLACEHOLDER, OUTPUT_PLACEHOLDER] {
        if !generator.command.iter().any(|arg| arg.contains(placeholder)) {
            return Err(ConfigError::Invalid {
                field: "generator.command",
                reason: format!("no argument references {placeholder}"),
            });
        }
    }
    Ok(())
}

fn positive(field: &'static str, value: u64) -> Result<(), ConfigError> {
    if value == 0 {
        return Err(ConfigError::Invalid {
            field,
            reason: "must be greater than zero".to_string(),
        });
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// 3. Locate + load
// ---------------------------------------------------------------------------

/// Pick the config file to use, or `None` when there is none.
///
/// An explicit path must exist; the implicit candidates are skipped when absent.
pub fn locate_at(
    cwd: &Path,
    explicit: Option<&Path>,
    env_value: Option<PathBuf>,
    user_config_dir: Option<&Path>,
) -> Result<Option<PathBuf>, ConfigError> {
    if let Some(path) = explicit.map(Path::to_path_buf).or(env_value) {
        let path = cwd.join(path);
        if !path.is_file() {
            return Err(io_err(
                path,
                std::io::Error::new(std::io::ErrorKind::NotFound, "config file not found"),
            ));
        }
        return Ok(Some(path));
    }

    let local = cwd.join(CONFIG_FILE_NAME);
    if local.is_file() {
        return Ok(Some(local));
    }

    if let Some(dir) = user_config_dir {
        let user = dir.join("contract-sync").join(CONFIG_FILE_NAME);
        if user.is_file() {
            return Ok(Some(user));
        }
    }
    Ok(None)
}

/// Parse a config file.
pub fn load_file(path: &Path) -> Result<ConfigFile, ConfigError> {
    let contents = std::fs::read_to_string(path).map_err(|e| io_err(path, e))?;
    serde_yaml::from_str(&contents).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

/// Locate, load and resolve configuration with explicit inputs.
///
/// `CONTRACT_SYNC_*` values from `env` fill in whatever `overrides` leaves
/// unset; relative ones resolve against `cwd`, like flags.
pub fn load_at(
    cwd: &Path,
    explicit: Option<&Path>,
    env: &Environment,
    user_config_dir: Option<&Path>,
    overrides: Overrides,
) -> Result<SyncConfig, ConfigError> {
    let file = match locate_at(cwd, explicit, env.config_path(), user_config_dir)? {
        Some(path) => {
            let parsed = load_file(&path)?;
            Some((path, parsed))
        }
        None => None,
    };
    let from_env = env.overrides()?;
    let from_env = Overrides {
        source: from_env.source.map(|s| s.resolve_against(cwd)),
        output: from_env.output.map(|o| cwd.join(o)),
        ..from_env
    };
    SyncConfig::resolve(file, cwd, overrides.or(from_env), env)
}

/// `load_at` convenience wrapper reading the process environment.
pub fn load(
    cwd: &Path,
    explicit: Option<&Path>,
    overrides: Overrides,
) -> Result<SyncConfig, ConfigError> {
    let user_dir = dirs::config_dir();
    load_at(
        cwd,
        explicit,
        &Environment::from_process(),
        user_dir.as_deref(),
        overrides,
    )
}

// ---------------------------------------------------------------------------
// 4. Scaffold
// ---------------------------------------------------------------------------

/// Write a starter `contract-sync.yaml` into `dir`.
///
/// Fails with [`ConfigError::AlreadyExists`] unless `overwrite` is set.
pub fn write_template_at(
    dir: &Path,
    source: Option<SourceLocation>,
    output: Option<PathBuf>,
    overwrite: bool,
) -> Result<PathBuf, ConfigError> {
    let path = dir.join(CONFIG_FILE_NAME);
    if path.exists() && !overwrite {
        return Err(ConfigError::AlreadyExists { path });
    }

    let file = ConfigFile {
        source: Some(source.unwrap_or_else(|| {
            SourceLocation::Http("https://api.example.com/openapi.json".to_string())
        })),
        output: Some(output.unwrap_or_else(|| PathBuf::from("client"))),
        generator: GeneratorSettings {
            command: vec![
                "openapi-python-client".to_string(),
                "generate".to_string(),
                "--path".to_string(),
                INPUT_PLACEHOLDER.to_string(),
                "--output-path".to_string(),
                OUTPUT_PLACEHOLDER.to_string(),
                "--overwrite".to_string(),
            ],
            working_dir: None,
        },
        ..ConfigFile::default()
    };

    std::fs::create_dir_all(dir).map_err(|e| io_err(dir, e))?;
    let yaml = serde_yaml::to_string(&file)?;
    let tmp = path.with_extension("yaml.tmp");
    std::fs::write(&tmp, yaml).map_err(|e| io_err(&tmp, e))?;
    std::fs::rename(&tmp, &path).map_err(|e| io_err(&path, e))?;
    Ok(path)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
