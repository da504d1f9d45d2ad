//! Storage-layer error type.

/// Errors produced by the storage layer.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// An error bubbled up from the database driver.
    #[error(transparent)]
    Database(#[from] sqlx::Error),
    /// Schema migration failed.
    #[error(transparent)]
    Migrate(#[from] sqlx::migrate::MigrateError),
    /// A CID string stored in an index row failed to parse.
    #[error("invalid cid: {0}")]
    InvalidCid(#[from] cid::Error),
    /// An index row references a blob that is missing from the blockstore.
    #[error("no blob found in blockstore for cid {cid}")]
    BlobNotFound {
        /// The CID whose blob could not be found.
        cid: String,
    },
}
