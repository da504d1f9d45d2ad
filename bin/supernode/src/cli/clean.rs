//! Index cleaning subcommand.

use anyhow::Result;
use clap::Parser;
use supernode_types::{ChainType, DataKind, Gap};

use crate::{cli::parse_range, config::Config};

/// Removes blobs and index rows for a set of height ranges.
#[derive(Parser, Debug, Clone)]
pub struct CleanCommand {
    /// Height ranges to clean, as inclusive start:stop pairs.
    #[arg(long = "range", value_parser = parse_range, required = true)]
    pub ranges: Vec<Gap>,
    /// The class of data to remove.
    #[arg(long, default_value = "full")]
    pub kind: DataKind,
}

impl CleanCommand {
    /// Runs the clean subcommand.
    pub async fn run(self, config: &Config) -> Result<()> {
        let (pool, _) = config.connect().await?;

        match config.chain {
            ChainType::Ethereum => {
                supernode_eth::Cleaner::new(&pool).clean(&self.ranges, self.kind).await?;
            }
            ChainType::Bitcoin => {
                supernode_btc::Cleaner::new(&pool).clean(&self.ranges, self.kind).await?;
            }
        }
        Ok(())
    }
}
