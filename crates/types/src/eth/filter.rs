//! Subscription filter settings for the Ethereum pipeline.
//!
//! A filter is a fixed-shape struct of "off" switches plus inclusion lists;
//! an empty list always means "match all" for that dimension. The same
//! settings drive both the SQL retriever and the in-memory filterer.

use serde::{Deserialize, Serialize};

/// What an Ethereum subscriber wants streamed, and over which height range.
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
    /// Receipt filter.
    pub receipt_filter: ReceiptFilter,
    /// State-node filter.
    pub state_filter: StateFilter,
    /// Storage-node filter.
    pub storage_filter: StorageFilter,
}

impl SubscriptionSettings {
    /// True when `block_number` falls inside the subscription's range.
    pub const fn in_range(&self, block_number: u64) -> bool {
        block_number >= self.start && (self.end <= 0 || block_number < self.end as u64)
    }

    /// An all-inclusive filter over every height: headers, uncles, txs,
    /// receipts, and leaf state/storage nodes.
    pub fn open() -> Self {
        Self {
            header_filter: HeaderFilter { off: false, uncles: true },
            ..Self::default()
        }
    }
}

/// Filter settings for headers.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HeaderFilter {
    /// Exclude headers entirely.
    pub off: bool,
    /// Also include uncle headers.
    pub uncles: bool,
}

/// Filter settings for transactions.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TxFilter {
    /// Exclude transactions entirely.
    pub off: bool,
    /// Sender addresses of interest; empty matches all.
    pub src: Vec<String>,
    /// Recipient addresses of interest; empty matches all.
    pub dst: Vec<String>,
}

/// Filter settings for receipts.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReceiptFilter {
    /// Exclude receipts entirely.
    pub off: bool,
    /// Also return receipts paired with transactions the tx filter matched,
    /// regardless of the topic/contract constraints below.
    pub match_txs: bool,
    /// Log-emitting contract addresses of interest; empty matches all.
    pub log_addresses: Vec<String>,
    /// Wanted topics per position 0..=3; an empty slot matches any topic at
    /// that position.
    pub topics: [Vec<String>; 4],
}

impl ReceiptFilter {
    /// True when any topic position carries a constraint.
    pub fn has_topics(&self) -> bool {
        self.topics.iter().any(|t| !t.is_empty())
    }
}

/// Filter settings for state-trie nodes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StateFilter {
    /// Exclude state nodes entirely.
    pub off: bool,
    /// Account addresses of interest (hashed to leaf keys); empty matches
    /// all.
    pub addresses: Vec<String>,
    /// Also include non-leaf (branch/extension) nodes.
    pub intermediate_nodes: bool,
}

/// Filter settings for storage-trie nodes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageFilter {
    /// Exclude storage nodes entirely.
    pub off: bool,
    /// Owning account addresses of interest; empty matches all.
    pub addresses: Vec<String>,
    /// Storage leaf keys of interest (already-hashed slot keys, not slot
    /// positions); empty matches all.
    pub storage_keys: Vec<String>,
    /// Also include non-leaf nodes.
    pub intermediate_nodes: bool,
}
