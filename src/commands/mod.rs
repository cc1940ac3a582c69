pub mod check;
pub mod render;
pub mod rules;

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

#[derive(Parser)]
#[command(name = "espolint")]
#[command(version, about = "Architectural convention linter for EspoCRM modules", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Analyse a file or directory and report convention violations
    Check {
        /// File or directory to analyse (default: current directory)
        #[arg(default_value = ".")]
        target: PathBuf,
        /// Output format
        #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
        format: OutputFormat,
        /// Worker threads (default: available parallelism)
        #[arg(long, short = 'j')]
        jobs: Option<usize>,
        /// Configuration file (default: nearest .espolint.toml)
        #[arg(long)]
        config: Option<PathBuf>,
        /// Only print findings
        #[arg(long, short = 'q', conflicts_with = "verbose")]
        quiet: bool,
        /// Also list analysed files and enable debug logging
        #[arg(long, short = 'v')]
        verbose: bool,
    },
    /// List the registered rules and whether they are enabled
    Rules {
        /// Configuration file (default: nearest .espolint.toml)
        #[arg(long)]
        config: Option<PathBuf>,
    },
}

impl Commands {
    pub fn verbose(&self) -> bool {
        matches!(self, Commands::Check { verbose: true, .. })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
    Sarif,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputMode {
    Quiet,
    Normal,
    Verbose,
}

pub fn get_output_mode(quiet: bool, verbose: bool) -> OutputMode {
    if quiet {
        OutputMode::Quiet
    } else if verbose {
        OutputMode::Verbose
    } else {
        OutputMode::Normal
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_check_defaults() {
        let cli = Cli::try_parse_from(["espolint", "check"]).expect("valid args");
        match cli.command {
            Commands::Check { target, format, jobs, config, quiet, verbose } => {
                assert_eq!(target, PathBuf::from("."));
                assert_eq!(format, OutputFormat::Text);
                assert!(jobs.is_none() && config.is_none());
                assert!(!quiet && !verbose);
            }
            Commands::Rules { .. } => panic!("expected check"),
        }
    }

    #[test]
    fn test_check_flags() {
        let cli = Cli::try_parse_from([
            "espolint", "check", "src/backend", "--format", "sarif", "-j", "4", "-v",
        ])
        .expect("valid args");
        assert!(cli.command.verbose());
        let Commands::Check { format, jobs, .. } = cli.command else {
            panic!("expected check");
        };
        assert_eq!(format, OutputFormat::Sarif);
        assert_eq!(jobs, Some(4));
    }

    #[test]
    fn test_quiet_and_verbose_conflict() {
        assert!(Cli::try_parse_from(["espolint", "check", "-q", "-v"]).is_err());
        assert_eq!(get_output_mode(true, false), OutputMode::Quiet);
        assert_eq!(get_output_mode(false, true), OutputMode::Verbose);
    }
}
