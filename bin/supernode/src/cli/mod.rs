//! Contains the supernode CLI.

use std::path::PathBuf;

use anyhow::Result;
use clap::{ArgAction, Parser, Subcommand};
use supernode_types::Gap;
use tracing_subscriber::EnvFilter;

mod gaps;
pub use gaps::GapsCommand;

mod clean;
pub use clean::CleanCommand;

mod reset;
pub use reset::ResetValidationCommand;

/// Subcommands for the CLI.
#[derive(Debug, Clone, Subcommand)]
pub enum Commands {
    /// Reports height ranges with no indexed header.
    Gaps(GapsCommand),
    /// Removes indexed data for a set of height ranges.
    Clean(CleanCommand),
    /// Zeroes the validation counters for a set of height ranges.
    ResetValidation(ResetValidationCommand),
}

/// The supernode CLI.
#[derive(Parser, Clone, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Verbosity level (0-2)
    #[arg(long, short, action = ArgAction::Count)]
    pub v: u8,
    /// Path to the TOML configuration file.
    #[arg(long, short, default_value = "supernode.toml", env = "SUPERNODE_CONFIG")]
    pub config: PathBuf,
    /// The subcommand to run.
    #[clap(subcommand)]
    pub subcommand: Commands,
}

impl Cli {
    /// Runs the CLI.
    pub async fn run(self) -> Result<()> {
        init_tracing(self.v)?;
        let config = crate::config::Config::load(&self.config)?;

        match self.subcommand {
            Commands::Gaps(cmd) => cmd.run(&config).await,
            Commands::Clean(cmd) => cmd.run(&config).await,
            Commands::ResetValidation(cmd) => cmd.run(&config).await,
        }
    }
}

/// Initializes the tracing subscriber, honoring `RUST_LOG` when set.
fn init_tracing(verbosity: u8) -> Result<()> {
    let default = match verbosity {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .try_init()
        .map_err(|err| anyhow::anyhow!("failed to initialize tracing: {err}"))
}

/// Parses a `start:stop` pair into an inclusive height range.
pub(crate) fn parse_range(s: &str) -> Result<Gap, String> {
    let (start, stop) =
        s.split_once(':').ok_or_else(|| format!("expected start:stop, got {s}"))?;
    let start = start.trim().parse::<u64>().map_err(|err| err.to_string())?;
    let stop = stop.trim().parse::<u64>().map_err(|err| err.to_string())?;
    if stop < start {
        return Err(format!("range ends before it starts: {start}:{stop}"));
    }
    Ok(Gap { start, stop })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_range() {
        assert_eq!(parse_range("3:7").unwrap(), Gap { start: 3, stop: 7 });
        assert_eq!(parse_range(" 5 : 5 ").unwrap(), Gap { start: 5, stop: 5 });
        assert!(parse_range("7:3").is_err());
        assert!(parse_range("7").is_err());
        assert!(parse_range("a:b").is_err());
    }
}
