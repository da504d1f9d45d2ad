//! Error type for the Ethereum pipeline.

/// Errors produced by the Ethereum pipeline stages.
#[derive(Debug, thiserror::Error)]
pub enum EthError {
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
    /// An RLP buffer failed to decode.
    #[error("rlp decoding failed: {0}")]
    Rlp(#[from] alloy_rlp::Error),
    /// Transaction sender recovery failed.
    #[error("sender recovery failed: {0}")]
    Signature(#[from] alloy_consensus::crypto::RecoveryError),
    /// A hex-encoded hash or address string failed to parse.
    #[error("invalid hex string: {0}")]
    Hex(#[from] alloy_primitives::hex::FromHexError),
    /// A decimal numeric string failed to parse.
    #[error("invalid numeric string: {0}")]
    Numeric(#[from] alloy_primitives::ruint::ParseError),
    /// The receipt list length does not match the transaction list length.
    #[error("expected one receipt per transaction: {txs} txs, {rcts} receipts")]
    MismatchedReceipts {
        /// Number of transactions in the block body.
        txs: usize,
        /// Number of decoded receipts.
        rcts: usize,
    },
    /// A state leaf node's RLP did not decode into a two-element list.
    #[error("state leaf node rlp must decode into two elements")]
    InvalidStateLeaf,
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
}
