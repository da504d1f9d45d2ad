//! Database connection configuration.

use sqlx::{PgPool, postgres::PgPoolOptions};

use crate::StorageError;

/// Connection settings for the backing Postgres database.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct DbConfig {
    /// Database host.
    pub host: String,
    /// Database port.
    #[serde(default = "DbConfig::default_port")]
    pub port: u16,
    /// Database name.
    pub name: String,
    /// Database user.
    pub user: String,
    /// Database password.
    #[serde(default)]
    pub password: String,
    /// Maximum number of pooled connections.
    #[serde(default = "DbConfig::default_max_connections")]
    pub max_connections: u32,
}

impl DbConfig {
    const fn default_port() -> u16 {
        5432
    }

    const fn default_max_connections() -> u32 {
        16
    }

    /// Renders the connection URL for this configuration.
    pub fn url(&self) -> String {
        format!(
            "postgres://{}:{}@{}:{}/{}",
            self.user, self.password, self.host, self.port, self.name
        )
    }

    /// Opens a connection pool and applies any pending schema migrations.
    pub async fn connect(&self) -> Result<PgPool, StorageError> {
        let pool =
            PgPoolOptions::new().max_connections(self.max_connections).connect(&self.url()).await?;
        crate::MIGRATOR.run(&pool).await?;
        tracing::info!(target: "storage", host = %self.host, db = %self.name, "Connected to database");
        Ok(pool)
    }
}
