//! CLI error types with miette diagnostics.
//!
//! Maps `ConfigError` and `CoreError` into user-facing errors with
//! actionable help text and stable exit codes.

use std::path::PathBuf;

use miette::Diagnostic;
use thiserror::Error;

use cmsi_config::ConfigError;
use cmsi_core::CoreError;

pub mod exit_code {
    pub const GENERAL: i32 = 1;
    pub const USAGE: i32 = 2;
    pub const CONFIG: i32 = 3;
    pub const NOT_FOUND: i32 = 4;
    pub const INVALID_SCENARIO: i32 = 5;
    pub const TIMEOUT: i32 = 8;
    pub const INTERRUPTED: i32 = 130;
}

#[derive(Debug, Error, Diagnostic)]
pub enum CliError {
    // ── Scenario files ───────────────────────────────────────────────

    #[error("Scenario file {} not found", .path.display())]
    #[diagnostic(
        code(cmsi::scenario_not_found),
        help("Check the path. Try: cmsi plan <FILE> to inspect a scenario without running it")
    )]
    ScenarioNotFound { path: PathBuf },

    #[error("Unsupported scenario file {}", .path.display())]
    #[diagnostic(
        code(cmsi::unsupported_format),
        help("Scenario files must end in .json, .yaml, .yml or .toml")
    )]
    UnsupportedFormat { path: PathBuf },

    #[error("Could not parse {format} scenario {}", .path.display())]
    #[diagnostic(code(cmsi::scenario_parse), help("{message}"))]
    ScenarioParse {
        path: PathBuf,
        format: &'static str,
        message: String,
    },

    #[error("Scenario '{scenario}' is invalid: {reason}")]
    #[diagnostic(code(cmsi::invalid_scenario))]
    InvalidScenario { scenario: String, reason: String },

    // ── Run ──────────────────────────────────────────────────────────

    #[error("Scenario did not complete within {seconds}s")]
    #[diagnostic(
        code(cmsi::timeout),
        help(
            "A scripted SYSTEM_RESET only completes once the unit is reset.\n\
             Try: --auto-reset-after <SECS> to simulate the trainee"
        )
    )]
    Timeout { seconds: u64 },

    #[error("Run interrupted")]
    #[diagnostic(code(cmsi::interrupted))]
    Interrupted,

    #[error("{0}")]
    #[diagnostic(code(cmsi::core))]
    Core(CoreError),

    // ── Validation ───────────────────────────────────────────────────

    #[error("Invalid value for {field}: {reason}")]
    #[diagnostic(code(cmsi::validation))]
    Validation { field: String, reason: String },

    // ── Configuration ────────────────────────────────────────────────

    #[error("Configuration error: {message}")]
    #[diagnostic(
        code(cmsi::config),
        help(
            "Check the config file and CMSI_* environment variables.\n\
             Try: cmsi config path"
        )
    )]
    Config { message: String },

    #[error("Config file already exists at {}", .path.display())]
    #[diagnostic(
        code(cmsi::config_exists),
        help("Pass --force to overwrite it")
    )]
    ConfigExists { path: PathBuf },

    // ── IO / Serialization ───────────────────────────────────────────

    #[error(transparent)]
    #[diagnostic(code(cmsi::io))]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    #[diagnostic(code(cmsi::json))]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    #[diagnostic(code(cmsi::yaml))]
    Yaml(#[from] serde_yaml::Error),
}

impl CliError {
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::ScenarioNotFound { .. } => exit_code::NOT_FOUND,
            Self::UnsupportedFormat { .. }
            | Self::ScenarioParse { .. }
            | Self::InvalidScenario { .. } => exit_code::INVALID_SCENARIO,
            Self::Timeout { .. } => exit_code::TIMEOUT,
            Self::Interrupted => exit_code::INTERRUPTED,
            Self::Validation { .. } | Self::ConfigExists { .. } => exit_code::USAGE,
            Self::Config { .. } => exit_code::CONFIG,
            Self::Core(_) | Self::Io(_) | Self::Json(_) | Self::Yaml(_) => exit_code::GENERAL,
        }
    }

    /// Attach the scenario path to a loader error.
    pub fn from_scenario_load(path: PathBuf, err: ConfigError) -> Self {
        match err {
            ConfigError::Io(io) if io.kind() == std::io::ErrorKind::NotFound => {
                Self::ScenarioNotFound { path }
            }
            other => other.into(),
        }
    }
}

impl From<ConfigError> for CliError {
    fn from(err: ConfigError) -> Self {
        match err {
            ConfigError::Parse {
                path,
                format,
                message,
            } => Self::ScenarioParse {
                path,
                format,
                message,
            },
            ConfigError::UnsupportedFormat { path } => Self::UnsupportedFormat { path },
            ConfigError::Scenario(core) => core.into(),
            ConfigError::Io(io) => Self::Io(io),
            ConfigError::Figment(e) => Self::Config {
                message: e.to_string(),
            },
        }
    }
}

impl From<CoreError> for CliError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::InvalidScenario { scenario, reason } => {
                Self::InvalidScenario { scenario, reason }
            }
            other => Self::Core(other),
        }
    }
}
