//! Error type for the Bitcoin pipeline.

use supernode_types::DataKind;

/// Errors produced by the Bitcoin pipeline stages.
#[derive(Debug, thiserror::Error)]
pub enum BtcError {
    /// An error bubbled up from the database driver.
    #[error(transparent)]
    Database(#[from] sqlx::Error),
    /// An error bubbled up from the storage layer.
    #[error(transparent)]
    Storage(#[from] supernode_storage::StorageError),
    /// CID derivation failed.
    #[error(transparent)]
    Ipld(#[from] supernode_ipld::IpldError),
    /// A CID string stored in an index row failed to parse.
    #[error("invalid cid: {0}")]
    Cid(#[from] cid::Error),
    /// The raw block bytes failed consensus deserialization.
    #[error("block deserialization failed: {0}")]
    Consensus(#[from] bitcoin::consensus::encode::Error),
    /// A transaction input references an outpoint transaction that has not
    /// been indexed.
    #[error("outpoint transaction {tx_hash} referenced by an input is not indexed")]
    MissingOutpointTx {
        /// Hash of the unindexed outpoint transaction.
        tx_hash: String,
    },
    /// The blockstore returned fewer blobs than the index rows reference.
    #[error("expected {expected} blobs from the blockstore, got {got}")]
    UnexpectedNumberOfIplds {
        /// How many blobs the index rows reference.
        expected: usize,
        /// How many blobs the blockstore returned.
        got: usize,
    },
    /// No header exists at the requested height.
    #[error("no header found at block {0}")]
    MissingBlock(i64),
    /// The cleaner was asked to remove a data class the Bitcoin schema does
    /// not have.
    #[error("unsupported data kind for bitcoin: {0}")]
    UnsupportedDataKind(DataKind),
}
