//! scatterflash CLI - Scripted fastboot flashing for Android devices
//!
//! Entry point for the scatterflash command-line application.

use anyhow::Result;
use clap::Parser;

use scatterflash::cli::output::{display_error, OutputConfig};
use scatterflash::cli::Cli;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Apply output configuration globally
    let output_config = OutputConfig::new(cli.quiet, cli.json, cli.verbose);
    output_config.apply_global();

    // Initialize tracing subscriber; RUST_LOG directives are kept
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(output_config.log_level().into()),
        )
        .init();

    // Run the command and handle errors
    match cli.run().await {
        Ok(()) => Ok(()),
        Err(e) => {
            display_error(&e);
            std::process::exit(1);
        }
    }
}
