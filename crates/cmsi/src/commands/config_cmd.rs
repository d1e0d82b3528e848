//! Config subcommand handlers.

use tracing::info;

use crate::cli::{ConfigArgs, ConfigCommand};
use crate::commands::Ctx;
use crate::error::CliError;
use crate::output;

pub fn handle(args: &ConfigArgs, ctx: &Ctx) -> Result<(), CliError> {
    match args.command {
        ConfigCommand::Show => {
            let as_toml = toml::to_string_pretty(&ctx.config).map_err(|e| CliError::Config {
                message: e.to_string(),
            })?;
            let out = output::render_single(
                ctx.output,
                &ctx.config,
                |_| as_toml.trim_end().to_owned(),
                |_| as_toml.trim_end().to_owned(),
            )?;
            output::print_output(&out, ctx.quiet);
            Ok(())
        }

        ConfigCommand::Path => {
            output::print_output(&ctx.config_path.display().to_string(), ctx.quiet);
            Ok(())
        }

        ConfigCommand::Init { force } => {
            let path = &ctx.config_path;
            if force && path.exists() {
                std::fs::remove_file(path)?;
            }
            if !cmsi_config::write_default_config(path)? {
                return Err(CliError::ConfigExists { path: path.clone() });
            }
            info!(path = %path.display(), "config written");
            output::print_output(&format!("Wrote {}", path.display()), ctx.quiet);
            Ok(())
        }
    }
}
