//! The Bitcoin side of the supernode pipeline.
//!
//! A strict subset of the Ethereum pipeline: raw block bytes are decoded by
//! the [`converter`], published and indexed by the [`IpldPublisher`], and
//! served back out by the [`CidRetriever`] / [`PgIpldFetcher`] pair or the
//! [`filterer`]. There are no receipts and no trie state; transactions carry
//! their inputs and outputs instead.

#![doc(issue_tracker_base_url = "https://github.com/vulcanize/supernode-rs/issues/")]

mod error;
pub use error::BtcError;

pub mod converter;

mod publisher;
pub use publisher::IpldPublisher;

mod indexer;
pub use indexer::CidIndexer;

mod retriever;
pub use retriever::CidRetriever;

mod fetcher;
pub use fetcher::{IpldFetcher, PgIpldFetcher};

pub mod filterer;

mod cleaner;
pub use cleaner::Cleaner;
