//! In-flight Bitcoin payload shapes.

use bitcoin::{Transaction, block::Header};
use serde::{Deserialize, Serialize};

use super::TxModelWithInsAndOuts;
use crate::IpldBlock;

/// Raw per-block payload fetched from a Bitcoin Core node: the height plus
/// the consensus-serialized block bytes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawBlockPayload {
    /// Block height.
    pub height: u64,
    /// Consensus-serialized block.
    pub block_bytes: Vec<u8>,
}

/// Fully decoded, normalized representation of one Bitcoin block's content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConvertedPayload {
    /// Block height.
    pub height: u64,
    /// Decoded block header.
    pub header: Header,
    /// Decoded transactions in block order.
    pub txs: Vec<Transaction>,
    /// Per-transaction metadata, index-aligned with `txs`.
    pub tx_meta: Vec<TxModelWithInsAndOuts>,
}

/// The assembled per-block Bitcoin response: matching serialized objects
/// tagged with their CIDs.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Iplds {
    /// Height the response was assembled for.
    pub block_number: u64,
    /// The header object, if the header filter is on.
    pub header: Option<IpldBlock>,
    /// Matching transactions.
    pub transactions: Vec<IpldBlock>,
}

impl Iplds {
    /// True when no object matched.
    pub const fn is_empty(&self) -> bool {
        self.header.is_none() && self.transactions.is_empty()
    }
}
