//! Subscription filter settings for the Bitcoin pipeline.

use serde::{Deserialize, Serialize};

/// What a Bitcoin subscriber wants streamed, and over which height range.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SubscriptionSettings {
    /// Also backfill historical data in [start, end).
    pub backfill: bool,
    /// Only backfill; do not stream new blocks.
    pub backfill_only: bool,
    /// First block of interest.
    pub start: u64,
    /// Last block of interest, exclusive; zero or negative means unbounded.
    pub end: i64,
    /// Header filter.
    pub header_filter: HeaderFilter,
    /// Transaction filter.
    pub tx_filter: TxFilter,
}

impl SubscriptionSettings {
    /// True when `block_number` falls inside the subscription's range.
    pub const fn in_range(&self, block_number: u64) -> bool {
        block_number >= self.start && (self.end <= 0 || block_number < self.end as u64)
    }

    /// An all-inclusive filter over every height.
    pub fn open() -> Self {
        Self::default()
    }
}

/// Filter settings for headers.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HeaderFilter {
    /// Exclude headers entirely.
    pub off: bool,
}

/// Filter settings for transactions.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TxFilter {
    /// Exclude transactions entirely.
    pub off: bool,
    /// Only segwit transactions.
    pub segwit: bool,
    /// Witness hashes of interest; empty matches all.
    pub witness_hashes: Vec<String>,
    /// Transaction indexes of interest (e.g. `[0]` for coinbase only);
    /// empty matches all.
    pub indexes: Vec<i64>,
    /// Output script classes of interest; empty matches all.
    pub pk_script_classes: Vec<i32>,
    /// Only transactions with an output requiring more than one signature.
    pub multi_sig: bool,
    /// Output addresses of interest; empty matches all.
    pub addresses: Vec<String>,
}
