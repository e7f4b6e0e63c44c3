//! Binary crate for the `weatherwise` command-line tool.
//!
//! This crate focuses on:
//! - Parsing CLI arguments
//! - Interactive configuration and the chat session
//! - Human-friendly output formatting
//! - Hosting the HTTP backend (`weatherwise serve`)

use clap::Parser;
use tracing_subscriber::EnvFilter;

mod cli;
mod server;
mod session;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Logs go to stderr so exported data on stdout stays clean.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("weatherwise=info,weatherwise_core=info")),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .compact()
        .init();

    let cmd = cli::Cli::parse();
    cmd.run().await
}
