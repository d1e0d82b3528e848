//! Clap derive structures for the `cmsi` CLI.
//!
//! Defines the command tree, global flags, and shared value enums. Kept
//! free of workspace imports so `build.rs` can include it for man pages.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

// ── Top-Level CLI ────────────────────────────────────────────────────

/// cmsi -- fire-safety control unit trainer
#[derive(Debug, Parser)]
#[command(
    name = "cmsi",
    version,
    about = "Replay fire-safety training scenarios against a simulated control unit",
    long_about = "Simulates a fire-safety control unit (CMSI): manual call points,\n\
        automatic detectors, the evacuation countdown and its acknowledgement,\n\
        and the system reset. Scenario files script what happens and when.",
    propagate_version = true,
    subcommand_required = true,
    arg_required_else_help = true
)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalOpts,

    #[command(subcommand)]
    pub command: Command,
}

// ── Global Options ───────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct GlobalOpts {
    /// Config file (defaults to the platform config directory)
    #[arg(long, env = "CMSI_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// Output format [default: from config, else table]
    #[arg(long, short = 'o', env = "CMSI_OUTPUT", global = true)]
    pub output: Option<OutputFormat>,

    /// When to use color output [default: from config, else auto]
    #[arg(long, global = true)]
    pub color: Option<ColorMode>,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(long, short = 'v', action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(long, short = 'q', global = true)]
    pub quiet: bool,
}

// ── Output & Color Enums ─────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Pretty table (default, interactive)
    Table,
    /// Pretty-printed JSON
    Json,
    /// Compact single-line JSON
    JsonCompact,
    /// YAML
    Yaml,
    /// Plain text, one value per line (scripting)
    Plain,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ColorMode {
    /// Auto-detect (color if terminal is interactive)
    Auto,
    /// Always emit color codes
    Always,
    /// Never emit color codes
    Never,
}

// ── Top-Level Command Enum ───────────────────────────────────────────

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Play a scenario against a fresh control unit, printing the journal
    #[command(alias = "r")]
    Run(RunArgs),

    /// Show the expanded timeline of a scenario without running it
    #[command(alias = "p")]
    Plan(PlanArgs),

    /// Manage the CLI configuration
    Config(ConfigArgs),

    /// Generate shell completions
    Completions(CompletionsArgs),
}

// ── Run ──────────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct RunArgs {
    /// Scenario file (.json, .yaml, .yml or .toml)
    pub file: PathBuf,

    /// Once the scenario waits for a system reset, clear the allowed
    /// devices and reset the unit after this many seconds
    #[arg(long, value_name = "SECS")]
    pub auto_reset_after: Option<u64>,

    /// Stop the run after this many seconds
    #[arg(long, value_name = "SECS")]
    pub timeout: Option<u64>,

    /// Override the evacuation countdown in milliseconds
    #[arg(long, value_name = "MS")]
    pub evac_delay_ms: Option<u64>,

    /// Force immediate evacuation on detector activation
    #[arg(long)]
    pub evac_on_dai: bool,

    /// Mark a zone out of service, as KIND:ZONE (e.g. DM:ZF3). Repeatable.
    #[arg(long = "out-of-service", value_name = "KIND:ZONE")]
    pub out_of_service: Vec<String>,
}

// ── Plan ─────────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct PlanArgs {
    /// Scenario file (.json, .yaml, .yml or .toml)
    pub file: PathBuf,
}

// ── Config ───────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommand,
}

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Show the effective configuration (file + environment)
    Show,

    /// Print the config file path
    Path,

    /// Write an annotated starter config file
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

// ── Completions ──────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct CompletionsArgs {
    /// Shell to generate completions for
    pub shell: clap_complete::Shell,
}
