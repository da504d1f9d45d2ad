//! Postgres-backed storage layer: connection pooling, embedded schema
//! migrations, node registration, and the content-addressed blockstore
//! shared by both chain pipelines.

#![doc(issue_tracker_base_url = "https://github.com/vulcanize/supernode-rs/issues/")]

mod config;
pub use config::DbConfig;

mod error;
pub use error::StorageError;

mod node;
pub use node::{NodeInfo, register_node};

mod blockstore;
pub use blockstore::{BlockService, fetch_ipld, fetch_ipld_by_key, put_ipld};

/// Embedded migrations for the `public`, `eth`, and `btc` schemas.
pub static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("./migrations");
