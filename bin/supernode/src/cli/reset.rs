//! Validation counter reset subcommand.

use anyhow::Result;
use clap::Parser;
use supernode_types::{ChainType, Gap};

use crate::{cli::parse_range, config::Config};

/// Zeroes the `times_validated` counter for a set of height ranges so the
/// resync process will revisit them.
#[derive(Parser, Debug, Clone)]
pub struct ResetValidationCommand {
    /// Height ranges to reset, as inclusive start:stop pairs.
    #[arg(long = "range", value_parser = parse_range, required = true)]
    pub ranges: Vec<Gap>,
}

impl ResetValidationCommand {
    /// Runs the reset-validation subcommand.
    pub async fn run(self, config: &Config) -> Result<()> {
        let (pool, _) = config.connect().await?;

        match config.chain {
            ChainType::Ethereum => {
                supernode_eth::Cleaner::new(&pool).reset_validation(&self.ranges).await?;
            }
            ChainType::Bitcoin => {
                supernode_btc::Cleaner::new(&pool).reset_validation(&self.ranges).await?;
            }
        }
        Ok(())
    }
}
