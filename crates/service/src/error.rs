//! Service-layer error type.

use supernode_btc::BtcError;
use supernode_eth::EthError;
use thiserror::Error;

/// Errors surfaced by the sync, backfill, and resync services.
#[derive(Debug, Error)]
pub enum ServiceError {
    /// An Ethereum pipeline operation failed.
    #[error(transparent)]
    Eth(#[from] EthError),
    /// A Bitcoin pipeline operation failed.
    #[error(transparent)]
    Btc(#[from] BtcError),
    /// A height range ran backwards.
    #[error("invalid height range: start {start} exceeds stop {stop}")]
    InvalidRange {
        /// First height of the range.
        start: u64,
        /// Last height of the range.
        stop: u64,
    },
    /// A payload fetcher collaborator failed.
    #[error("payload fetch failed: {0}")]
    Fetch(String),
    /// A payload streamer collaborator failed.
    #[error("payload stream failed: {0}")]
    Stream(String),
}
