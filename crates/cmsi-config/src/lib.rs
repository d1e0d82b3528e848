//! Configuration for the CMSI trainer.
//!
//! TOML file + `CMSI_` environment overrides (figment), scenario file
//! parsing by extension, and translation of the configured out-of-service
//! zones into a `cmsi_core` policy.

use std::path::{Path, PathBuf};

use directories::ProjectDirs;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use cmsi_core::{CoreError, DeviceKind, DomainConfig, ScenarioDefinition, StaticOutOfService, ZoneId};

// ── Error ───────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config loading failed: {0}")]
    Figment(Box<figment::Error>),

    #[error("failed to parse {format} scenario {}: {message}", .path.display())]
    Parse {
        path: PathBuf,
        format: &'static str,
        message: String,
    },

    #[error("unsupported scenario file {}: expected .json, .yaml, .yml or .toml", .path.display())]
    UnsupportedFormat { path: PathBuf },

    #[error(transparent)]
    Scenario(#[from] CoreError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        Self::Figment(Box::new(err))
    }
}

// ── TOML config structs ─────────────────────────────────────────────

/// Top-level TOML configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct Config {
    /// Output defaults for the CLI.
    #[serde(default)]
    pub defaults: Defaults,

    /// Regulatory behavior of the simulated unit.
    #[serde(default)]
    pub domain: DomainConfig,

    /// Scenario playback defaults.
    #[serde(default)]
    pub runner: RunnerDefaults,

    /// Zones administratively out of service.
    #[serde(default)]
    pub out_of_service: Vec<OutOfServiceEntry>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct Defaults {
    #[serde(default = "default_output")]
    pub output: String,

    #[serde(default = "default_color")]
    pub color: String,
}

impl Default for Defaults {
    fn default() -> Self {
        Self {
            output: default_output(),
            color: default_color(),
        }
    }
}

fn default_output() -> String {
    "table".into()
}
fn default_color() -> String {
    "auto".into()
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct RunnerDefaults {
    /// Simulate the trainee resetting the unit this many seconds after the
    /// scenario reaches its reset point.
    pub auto_reset_after_secs: Option<u64>,

    /// Give up on a run after this many seconds.
    pub timeout_secs: Option<u64>,
}

/// One `[[out_of_service]]` entry.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct OutOfServiceEntry {
    pub kind: DeviceKind,
    pub zone: ZoneId,
}

impl Config {
    /// Out-of-service policy for the scenario runner.
    pub fn out_of_service_policy(&self) -> StaticOutOfService {
        StaticOutOfService::new(
            self.out_of_service
                .iter()
                .map(|entry| (entry.kind, entry.zone.clone())),
        )
    }
}

// ── Config file path ────────────────────────────────────────────────

/// Resolve the config file path via XDG / platform conventions.
pub fn config_path() -> PathBuf {
    ProjectDirs::from("org", "cmsi", "cmsi").map_or_else(
        || {
            let mut p = dirs_fallback();
            p.push("config.toml");
            p
        },
        |dirs| dirs.config_dir().join("config.toml"),
    )
}

fn dirs_fallback() -> PathBuf {
    let mut p = PathBuf::from(std::env::var("HOME").unwrap_or_else(|_| ".".into()));
    p.push(".config");
    p.push("cmsi");
    p
}

// ── Config loading ──────────────────────────────────────────────────

/// Load the full Config from file + environment. `path` overrides the
/// platform config location.
pub fn load_config(path: Option<&Path>) -> Result<Config, ConfigError> {
    let path = path.map_or_else(config_path, Path::to_path_buf);
    debug!(path = %path.display(), "loading config");

    let figment = Figment::new()
        .merge(Serialized::defaults(Config::default()))
        .merge(Toml::file(&path))
        .merge(Env::prefixed("CMSI_").split("__"));

    let config: Config = figment.extract()?;
    Ok(config)
}

/// Annotated starter file written by `cmsi config init`.
pub const DEFAULT_CONFIG_TEMPLATE: &str = r#"# CMSI trainer configuration.
# Every key can be overridden from the environment, e.g.
# CMSI_DOMAIN__EVAC_DELAY_MS=60000.

[defaults]
output = "table"   # table | json | yaml | plain
color = "auto"     # auto | always | never

[domain]
# Temporization between a manual call point latching and general evacuation.
evac_delay_ms = 300000
# Whether an operator acknowledgement suspends the temporization.
process_ack_required = true
# Whether an automatic detector forces immediate evacuation.
evac_on_dai = false
# Whether active automatic detectors block a system reset.
reset_requires_dai_clear = true

[runner]
# auto_reset_after_secs = 5
# timeout_secs = 600

# [[out_of_service]]
# kind = "DM"
# zone = "ZF3"
"#;

/// Write [`DEFAULT_CONFIG_TEMPLATE`] to `path` unless a file is already
/// there. Returns whether the file was written.
pub fn write_default_config(path: &Path) -> Result<bool, ConfigError> {
    if path.exists() {
        return Ok(false);
    }
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, DEFAULT_CONFIG_TEMPLATE)?;
    Ok(true)
}

// ── Scenario files ──────────────────────────────────────────────────

/// Parse a scenario from `contents`, the format chosen by `path`'s
/// extension, and validate it.
pub fn parse_scenario(path: &Path, contents: &str) -> Result<ScenarioDefinition, ConfigError> {
    let extension = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(str::to_ascii_lowercase);

    let parse_error = |format: &'static str, message: String| ConfigError::Parse {
        path: path.to_path_buf(),
        format,
        message,
    };

    let scenario: ScenarioDefinition = match extension.as_deref() {
        Some("json") => {
            serde_json::from_str(contents).map_err(|e| parse_error("JSON", e.to_string()))?
        }
        Some("yaml" | "yml") => {
            serde_yaml::from_str(contents).map_err(|e| parse_error("YAML", e.to_string()))?
        }
        Some("toml") => toml::from_str(contents).map_err(|e| parse_error("TOML", e.to_string()))?,
        _ => {
            return Err(ConfigError::UnsupportedFormat {
                path: path.to_path_buf(),
            });
        }
    };

    scenario.validate()?;
    debug!(
        scenario = %scenario.id,
        events = scenario.events.len(),
        "scenario parsed"
    );
    Ok(scenario)
}

/// Read, parse and validate a scenario file.
pub fn load_scenario(path: &Path) -> Result<ScenarioDefinition, ConfigError> {
    let contents = std::fs::read_to_string(path)?;
    parse_scenario(path, &contents)
}
