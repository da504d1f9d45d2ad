//! Gap reporting subcommand.

use anyhow::Result;
use clap::Parser;
use supernode_types::ChainType;

use crate::config::Config;

/// Reports height ranges that are missing from the index, including heights
/// validated fewer times than the requested level.
#[derive(Parser, Debug, Clone)]
pub struct GapsCommand {
    /// Headers validated fewer than this many times count as gaps.
    #[arg(long, default_value_t = 1)]
    pub validation_level: i64,
}

impl GapsCommand {
    /// Runs the gaps subcommand.
    pub async fn run(self, config: &Config) -> Result<()> {
        let (pool, _) = config.connect().await?;

        let gaps = match config.chain {
            ChainType::Ethereum => {
                supernode_eth::CidRetriever::new(&pool)
                    .retrieve_gaps(self.validation_level)
                    .await?
            }
            ChainType::Bitcoin => {
                supernode_btc::CidRetriever::new(&pool)
                    .retrieve_gaps(self.validation_level)
                    .await?
            }
        };

        if gaps.is_empty() {
            tracing::info!(target: "supernode", "No gaps found");
        }
        for gap in &gaps {
            tracing::info!(target: "supernode", start = gap.start, stop = gap.stop, "Gap");
        }
        Ok(())
    }
}
