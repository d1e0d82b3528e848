mod cli;
mod commands;
mod error;
mod output;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use crate::cli::{Cli, Command};
use crate::commands::Ctx;
use crate::error::CliError;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    init_tracing(cli.global.verbose);

    if let Err(err) = run(cli).await {
        let code = err.exit_code();
        eprintln!("{:?}", miette::Report::new(err));
        std::process::exit(code);
    }
}

fn init_tracing(verbosity: u8) {
    let filter = match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    // stdout carries the journal and reports.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

async fn run(cli: Cli) -> Result<(), CliError> {
    match cli.command {
        // Completions need no config.
        Command::Completions(args) => {
            use clap::CommandFactory;
            use clap_complete::generate;

            let mut cmd = Cli::command();
            generate(args.shell, &mut cmd, "cmsi", &mut std::io::stdout());
            Ok(())
        }

        command => {
            let config = cmsi_config::load_config(cli.global.config.as_deref())?;
            let ctx = Ctx::resolve(&cli.global, config);
            tracing::debug!(?command, "dispatching command");

            match command {
                Command::Run(args) => commands::run::handle(&args, &ctx).await,
                Command::Plan(args) => commands::plan::handle(&args, &ctx),
                Command::Config(args) => commands::config_cmd::handle(&args, &ctx),
                Command::Completions(_) => Ok(()),
            }
        }
    }
}
