//! Chain-agnostic services over the supernode pipelines.
//!
//! The [`Pipeline`] trait is the seam: one implementation per chain
//! ([`EthPipeline`], [`BtcPipeline`]), selected at configuration time. On
//! top of it sit the three long-running services: [`SyncService`] for live
//! ingest and subscription fan-out, [`BackfillService`] for periodic gap
//! filling, and [`ResyncService`] for operator-driven range repair.

#![doc(issue_tracker_base_url = "https://github.com/vulcanize/supernode-rs/issues/")]

mod error;
pub use error::ServiceError;

mod pipeline;
pub use pipeline::{
    Cleanup, FilterResponse, FilterSettings, PayloadFetcher, PayloadStreamer, Pipeline,
};

mod eth;
pub use eth::EthPipeline;

mod btc;
pub use btc::BtcPipeline;

mod sync;
pub use sync::{PAYLOAD_CHANNEL_CAPACITY, SubscriptionId, SyncService};

mod worker;
pub use worker::height_bins;

mod backfill;
pub use backfill::BackfillService;

mod resync;
pub use resync::{DEFAULT_BATCH_SIZE, DEFAULT_WORKERS, ResyncConfig, ResyncService};

#[cfg(test)]
mod mock;
