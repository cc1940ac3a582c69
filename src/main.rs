//! # espolint
//!
//! Command-line entry point: `espolint check` analyses a module tree,
//! `espolint rules` lists the registered rules.

use std::process::ExitCode;

use clap::Parser;
use espolint::commands::{self, Cli, Commands, check::CheckOptions};
use espolint::config::LintConfig;
use tracing_subscriber::EnvFilter;

fn init_logging(verbose: bool) {
    let default = if verbose { "espolint=debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.command.verbose());

    let code = match cli.command {
        Commands::Check { target, format, jobs, config, quiet, verbose } => {
            commands::check::handle_check(CheckOptions {
                target,
                format,
                jobs,
                config,
                output_mode: commands::get_output_mode(quiet, verbose),
            })
        }
        Commands::Rules { config } => {
            let project_root = LintConfig::find_project_root()
                .or_else(|| std::env::current_dir().ok())
                .unwrap_or_default();
            commands::rules::handle_rules_command(&project_root, config)
        }
    };
    ExitCode::from(code)
}
