//! The chain-agnostic seam between the services and the per-chain crates.
//!
//! Exactly one [`Pipeline`] implementation exists per chain, selected at
//! configuration time. The services are generic over it; there is no runtime
//! dispatch over an open set of chains.

use std::fmt::Debug;

use async_trait::async_trait;
use serde::Serialize;
use supernode_types::{ChainType, DataKind, Gap};
use tokio::sync::mpsc;

use crate::ServiceError;

/// Range and mode accessors every chain's subscription settings expose.
pub trait FilterSettings: Clone + Debug + Send + Sync + 'static {
    /// First block of interest.
    fn start(&self) -> u64;
    /// Last block of interest, exclusive; zero or negative means unbounded.
    fn end(&self) -> i64;
    /// Whether historical data should be sent before live data.
    fn backfill(&self) -> bool;
    /// Whether only historical data is wanted.
    fn backfill_only(&self) -> bool;
}

/// Emptiness check on an assembled per-block response.
pub trait FilterResponse: Clone + Debug + Send + Sync + 'static {
    /// True when no object matched the filter.
    fn is_empty(&self) -> bool;
}

/// The five per-block pipeline operations, plus the index lookups the
/// services schedule around them.
#[async_trait]
pub trait Pipeline: Send + Sync + 'static {
    /// Raw per-block payload produced by a streamer or fetcher.
    type Raw: Send + Sync + 'static;
    /// Normalized in-memory representation of one block.
    type Converted: Send + Sync + 'static;
    /// CIDs plus row models written for one block.
    type Cids: Send + Sync + 'static;
    /// Subscription settings consumed by retrieval and filtering.
    type Settings: FilterSettings;
    /// Assembled per-block response streamed to subscribers.
    type Response: FilterResponse + Serialize;

    /// The chain this pipeline is bound to.
    fn chain(&self) -> ChainType;

    /// Decodes a raw payload into its normalized representation.
    fn convert(&self, raw: &Self::Raw) -> Result<Self::Converted, ServiceError>;

    /// Publishes blobs and index rows for one block in one transaction.
    async fn publish(&self, payload: &Self::Converted) -> Result<Self::Cids, ServiceError>;

    /// Indexes a pre-published CID payload without writing blobs.
    async fn index(&self, cids: &Self::Cids) -> Result<(), ServiceError>;

    /// Retrieves and fetches the stored responses matching `settings` at one
    /// height. One response per header at the height; empty when nothing is
    /// indexed there.
    async fn retrieve(
        &self,
        settings: &Self::Settings,
        block_number: i64,
    ) -> Result<Vec<Self::Response>, ServiceError>;

    /// Filters an in-memory payload on the live streaming path.
    fn filter(
        &self,
        settings: &Self::Settings,
        payload: &Self::Converted,
    ) -> Result<Self::Response, ServiceError>;

    /// Lowest indexed height.
    async fn first_block_number(&self) -> Result<i64, ServiceError>;

    /// Highest indexed height.
    async fn last_block_number(&self) -> Result<i64, ServiceError>;

    /// Interior gaps, unioned with heights validated fewer than
    /// `validation_level` times.
    async fn gaps(&self, validation_level: i64) -> Result<Vec<Gap>, ServiceError>;
}

/// Maintenance operations the resync service drives before re-fetching.
#[async_trait]
pub trait Cleanup: Send + Sync {
    /// Removes indexed data and blobs of `kind` over the given ranges.
    async fn clean(&self, ranges: &[Gap], kind: DataKind) -> Result<(), ServiceError>;

    /// Zeroes the validation counter over the given ranges.
    async fn reset_validation(&self, ranges: &[Gap]) -> Result<(), ServiceError>;
}

/// Historical payload fetch at explicit heights, typically over HTTP against
/// an archival node.
#[async_trait]
pub trait PayloadFetcher<R>: Send + Sync {
    /// Fetches the raw payloads for the given heights, in any order.
    async fn fetch_at(&self, heights: &[u64]) -> Result<Vec<R>, ServiceError>;
}

/// Live payload subscription against a chain client.
#[async_trait]
pub trait PayloadStreamer<R>: Send + Sync {
    /// Opens the stream and returns the channel payloads arrive on. The
    /// stream ends when the channel closes.
    async fn stream(&self) -> Result<mpsc::Receiver<R>, ServiceError>;
}
