//! CLI argument parsing with clap.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "proxagg")]
#[command(author, version, about = "Proxy subscription aggregator")]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Settings file path
    #[arg(short, long, default_value = "config/settings.yaml", global = true)]
    pub config: PathBuf,

    /// Quiet mode (errors only)
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Verbose mode (debug output)
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Fetch all sources and write a subscription file
    Generate {
        /// Output format (clash, singbox, v2ray, raw)
        #[arg(short, long)]
        format: Option<String>,

        /// Output file (default from settings)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Maximum number of configs to keep
        #[arg(long)]
        max: Option<usize>,

        /// Wrap the whole subscription in base64
        #[arg(long)]
        base64: bool,
    },

    /// Fetch all sources and print per-source counts
    Fetch {
        /// Maximum number of configs to keep
        #[arg(long)]
        max: Option<usize>,
    },

    /// Validate settings, sources and rules
    Validate,

    /// Show version
    Version,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_generate_args() {
        let cli = Cli::parse_from([
            "proxagg", "generate", "--format", "singbox", "-o", "out.json", "--max", "10",
            "--base64",
        ]);
        match cli.command {
            Commands::Generate {
                format,
                output,
                max,
                base64,
            } => {
                assert_eq!(format.as_deref(), Some("singbox"));
                assert_eq!(output, Some(PathBuf::from("out.json")));
                assert_eq!(max, Some(10));
                assert!(base64);
            }
            _ => panic!("expected generate"),
        }
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = Cli::parse_from(["proxagg", "fetch", "-v", "--config", "x.yaml"]);
        assert!(cli.verbose);
        assert_eq!(cli.config, PathBuf::from("x.yaml"));
        assert!(matches!(cli.command, Commands::Fetch { max: None }));
    }

    #[test]
    fn test_default_config_path() {
        let cli = Cli::parse_from(["proxagg", "validate"]);
        assert_eq!(cli.config, PathBuf::from("config/settings.yaml"));
        assert!(!cli.quiet);
    }
}
