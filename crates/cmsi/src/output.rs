//! Output formatting: table, JSON, YAML, plain.
//!
//! Renders data in the format selected by `--output`. Table uses `tabled`,
//! structured formats use serde, plain emits one line per item.

use std::io::{self, IsTerminal, Write};

use owo_colors::OwoColorize;
use tabled::{Table, Tabled, settings::Style};

use cmsi_core::{LogEvent, LogSource};

use crate::cli::{ColorMode, OutputFormat};
use crate::error::CliError;

// ── Color helpers ────────────────────────────────────────────────────

/// Determine whether color output should be enabled.
pub fn should_color(mode: ColorMode) -> bool {
    match mode {
        ColorMode::Always => true,
        ColorMode::Never => false,
        ColorMode::Auto => io::stdout().is_terminal() && std::env::var("NO_COLOR").is_err(),
    }
}

/// Pad `source` to a fixed width and color it by subsystem.
fn paint_source(source: LogSource, color: bool) -> String {
    let label = format!("{:<14}", source.to_string());
    if !color {
        return label;
    }
    match source {
        LogSource::ManualCallPoint => label.red().to_string(),
        LogSource::Detector => label.magenta().to_string(),
        LogSource::Unit => label.yellow().to_string(),
        LogSource::Diffusion | LogSource::Actuator => label.cyan().to_string(),
        LogSource::Trainer | LogSource::Trainee => label.green().to_string(),
        LogSource::ManualOperator => label.bright_red().to_string(),
    }
}

/// One journal line: `12:00:01.250  CMSI  evacuation_pending  message`.
pub fn format_log_line(event: &LogEvent, color: bool) -> String {
    let time = event.timestamp.format("%H:%M:%S%.3f").to_string();
    let kind = format!("{:<26}", event.kind.to_string());
    if color {
        format!(
            "{}  {}{}  {}",
            time.dimmed(),
            paint_source(event.source, true),
            kind.bold(),
            event.message
        )
    } else {
        format!(
            "{time}  {}{kind}  {}",
            paint_source(event.source, false),
            event.message
        )
    }
}

// ── Render dispatchers ───────────────────────────────────────────────

/// Render a single serde-serializable item in the chosen format.
///
/// Table rendering uses a custom `detail_fn` that returns a pre-formatted
/// string, since single-item detail views don't use `Tabled` derive.
pub fn render_single<T>(
    format: OutputFormat,
    data: &T,
    detail_fn: impl Fn(&T) -> String,
    plain_fn: impl Fn(&T) -> String,
) -> Result<String, CliError>
where
    T: serde::Serialize,
{
    match format {
        OutputFormat::Table => Ok(detail_fn(data)),
        OutputFormat::Json => render_json(data, false),
        OutputFormat::JsonCompact => render_json(data, true),
        OutputFormat::Yaml => render_yaml(data),
        OutputFormat::Plain => Ok(plain_fn(data)),
    }
}

/// Print the rendered output to stdout, respecting quiet mode.
pub fn print_output(output: &str, quiet: bool) {
    if quiet || output.is_empty() {
        return;
    }
    let mut stdout = io::stdout().lock();
    let _ = writeln!(stdout, "{output}");
}

// ── Format-specific renderers ────────────────────────────────────────

pub(crate) fn render_table<R: Tabled>(rows: &[R]) -> String {
    Table::new(rows).with(Style::rounded()).to_string()
}

pub(crate) fn render_json<T: serde::Serialize + ?Sized>(
    data: &T,
    compact: bool,
) -> Result<String, CliError> {
    let rendered = if compact {
        serde_json::to_string(data)?
    } else {
        serde_json::to_string_pretty(data)?
    };
    Ok(rendered)
}

pub(crate) fn render_yaml<T: serde::Serialize + ?Sized>(data: &T) -> Result<String, CliError> {
    Ok(serde_yaml::to_string(data)?)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use cmsi_core::LogEventKind;

    use super::*;

    #[test]
    fn uncolored_log_line_is_aligned() {
        let event = LogEvent::new(LogSource::Unit, LogEventKind::SystemReset, "unit reset");
        let line = format_log_line(&event, false);
        assert!(line.contains("CMSI          system_reset"));
        assert!(line.ends_with("unit reset"));
        assert!(!line.contains('\u{1b}'));
    }
}
