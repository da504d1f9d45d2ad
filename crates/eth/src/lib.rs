//! The Ethereum side of the supernode pipeline.
//!
//! Raw statediff payloads are decoded by the [`converter`], published and
//! indexed atomically by the [`IpldPublisher`], and served back out by the
//! [`CidRetriever`] / [`PgIpldFetcher`] pair (historical data) or the
//! [`filterer`] (live streamed data). The [`Cleaner`] handles bulk removal
//! and validation-counter resets for resync.

#![doc(issue_tracker_base_url = "https://github.com/vulcanize/supernode-rs/issues/")]

mod error;
pub use error::EthError;

pub mod converter;

pub mod reward;

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
