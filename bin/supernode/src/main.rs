//! Supernode command line interface.

use clap::Parser;

mod cli;
mod config;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    cli::Cli::parse().run().await
}
