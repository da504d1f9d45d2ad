//! Runtime configuration for the supernode binary.

use std::path::Path;

use anyhow::Context;
use sqlx::{PgPool, postgres::PgPoolOptions};
use supernode_storage::{DbConfig, NodeInfo, register_node};
use supernode_types::ChainType;

/// Top-level TOML configuration.
#[derive(Debug, Clone, serde::Deserialize)]
pub struct Config {
    /// Which chain the index holds.
    pub chain: ChainType,
    /// Postgres connection settings.
    pub database: DbConfig,
    /// Identity recorded against every row this node writes.
    pub node: NodeInfo,
}

impl Config {
    /// Loads the configuration from a TOML file.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        toml::from_str(&raw).context("failed to parse config file")
    }

    /// Opens the database pool, applies migrations, and registers this node.
    ///
    /// A `DATABASE_URL` environment variable takes precedence over the
    /// `[database]` section of the config file.
    pub async fn connect(&self) -> anyhow::Result<(PgPool, i64)> {
        let pool = match std::env::var("DATABASE_URL") {
            Ok(url) => {
                let pool = PgPoolOptions::new()
                    .max_connections(self.database.max_connections)
                    .connect(&url)
                    .await?;
                supernode_storage::MIGRATOR.run(&pool).await?;
                pool
            }
            Err(_) => self.database.connect().await?,
        };
        let mut conn = pool.acquire().await?;
        let node_id = register_node(&mut *conn, &self.node).await?;
        tracing::debug!(target: "supernode", node_id, chain = %self.chain, "Registered node");
        Ok((pool, node_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_from_toml() {
        let cfg: Config = toml::from_str(
            r#"
            chain = "ethereum"

            [database]
            host = "localhost"
            name = "supernode"
            user = "postgres"

            [node]
            genesis_block = "0xd4e5..."
            network_id = "1"
            node_id = "archival-0"
            client_name = "geth"
            "#,
        )
        .unwrap();
        assert_eq!(cfg.chain, ChainType::Ethereum);
        assert_eq!(cfg.database.port, 5432);
        assert_eq!(cfg.node.network_id, "1");
    }
}
