//! proxagg - Proxy Subscription Aggregator
//!
//! Fetches public proxy config lists and re-publishes them as one subscription.

use anyhow::Result;
use clap::Parser;
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

use proxagg::cli::{Cli, Commands};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging based on verbosity
    let log_level = if cli.verbose {
        Level::DEBUG
    } else if cli.quiet {
        Level::ERROR
    } else {
        Level::INFO
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .with_thread_ids(false)
        .without_time()
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    // Execute command
    match cli.command {
        Commands::Generate {
            format,
            output,
            max,
            base64,
        } => proxagg::commands::generate::run(format, output, max, base64, &cli.config).await,
        Commands::Fetch { max } => proxagg::commands::fetch::run(max, &cli.config).await,
        Commands::Validate => proxagg::commands::validate::run(&cli.config).await,
        Commands::Version => {
            println!("proxagg {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}
