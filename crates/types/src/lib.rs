//! Shared types for the supernode pipeline.
//!
//! Every pipeline stage (convert, publish, index, retrieve, filter) speaks in
//! terms of the types defined here: the raw chain payloads handed in by the
//! streamer/fetcher collaborators, the normalized converted payloads, the
//! relational row models indexed in Postgres, and the subscription filters
//! consumed by the retriever and filterer.

#![doc(issue_tracker_base_url = "https://github.com/vulcanize/supernode-rs/issues/")]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]

mod chain;
pub use chain::{ChainType, DataKind, Gap, ParseChainError, contiguous_ranges};

mod block;
pub use block::IpldBlock;

pub mod eth;

pub mod btc;
