//! Subcommand handlers.

pub mod config_cmd;
pub mod plan;
pub mod run;

use std::path::{Path, PathBuf};

use clap::ValueEnum;
use tracing::warn;

use cmsi_config::Config;
use cmsi_core::ScenarioDefinition;

use crate::cli::{ColorMode, GlobalOpts, OutputFormat};
use crate::error::CliError;

/// Resolved global settings shared by every handler.
#[derive(Debug)]
pub struct Ctx {
    pub config: Config,
    pub config_path: PathBuf,
    pub output: OutputFormat,
    pub color: bool,
    pub quiet: bool,
}

impl Ctx {
    /// Flags win over the config file's `[defaults]`.
    pub fn resolve(global: &GlobalOpts, config: Config) -> Self {
        let output = global.output.unwrap_or_else(|| {
            parse_default("defaults.output", &config.defaults.output, OutputFormat::Table)
        });
        let color = global
            .color
            .unwrap_or_else(|| parse_default("defaults.color", &config.defaults.color, ColorMode::Auto));
        let config_path = global
            .config
            .clone()
            .unwrap_or_else(cmsi_config::config_path);

        Self {
            config,
            config_path,
            output,
            color: crate::output::should_color(color),
            quiet: global.quiet,
        }
    }
}

fn parse_default<T: ValueEnum>(key: &str, raw: &str, fallback: T) -> T {
    T::from_str(raw, true).unwrap_or_else(|_| {
        warn!(key, value = raw, "ignoring unrecognized config default");
        fallback
    })
}

/// Read, parse and validate a scenario file.
pub fn load_scenario(path: &Path) -> Result<ScenarioDefinition, CliError> {
    cmsi_config::load_scenario(path).map_err(|e| CliError::from_scenario_load(path.to_path_buf(), e))
}
