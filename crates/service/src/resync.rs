//! Operator-driven re-fetch and re-publish of explicit height ranges.

use std::fmt;
use std::sync::Arc;

use serde::Deserialize;
use supernode_types::{DataKind, Gap};

use crate::worker::process_gap;
use crate::{Cleanup, PayloadFetcher, Pipeline, ServiceError};

/// Default number of heights fetched per worker bin.
pub const DEFAULT_BATCH_SIZE: u64 = 5_000;

/// Default cap on concurrently processing bins.
pub const DEFAULT_WORKERS: usize = 100;

const fn default_batch_size() -> u64 {
    DEFAULT_BATCH_SIZE
}

const fn default_workers() -> usize {
    DEFAULT_WORKERS
}

/// What a resync run should cover and how it should behave.
#[derive(Debug, Clone, Deserialize)]
pub struct ResyncConfig {
    /// Inclusive height ranges to resync.
    pub ranges: Vec<Gap>,
    /// The class of data being resynced; scopes the optional pre-clean.
    pub kind: DataKind,
    /// Number of heights fetched per worker bin.
    #[serde(default = "default_batch_size")]
    pub batch_size: u64,
    /// Cap on concurrently processing bins.
    #[serde(default = "default_workers")]
    pub workers: usize,
    /// Delete existing data of `kind` in the ranges before re-fetching.
    #[serde(default)]
    pub clear_old_cache: bool,
    /// Zero the validation counters in the ranges first.
    #[serde(default)]
    pub reset_validation: bool,
}

/// Re-fetches and re-publishes the configured ranges over a bounded worker
/// pool.
///
/// Returns success once every bin has completed; individual bin failures are
/// logged and tolerated, so operators must watch the logs to spot ranges
/// that need another run.
pub struct ResyncService<P, F, C> {
    pipeline: Arc<P>,
    fetcher: Arc<F>,
    cleaner: C,
    config: ResyncConfig,
}

impl<P, F, C> fmt::Debug for ResyncService<P, F, C>
where
    P: Pipeline,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResyncService")
            .field("chain", &self.pipeline.chain())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl<P, F, C> ResyncService<P, F, C>
where
    P: Pipeline,
    F: PayloadFetcher<P::Raw> + 'static,
    C: Cleanup,
{
    /// Creates a resync service for the given configuration.
    pub fn new(pipeline: Arc<P>, fetcher: Arc<F>, cleaner: C, config: ResyncConfig) -> Self {
        Self { pipeline, fetcher, cleaner, config }
    }

    /// Runs the resync end to end: optional validation reset, optional
    /// pre-clean, then the bounded parallel re-fetch of every range.
    pub async fn resync(&self) -> Result<(), ServiceError> {
        if self.config.reset_validation {
            tracing::info!(target: "service::resync", "resetting validation counters");
            self.cleaner.reset_validation(&self.config.ranges).await?;
        }
        if self.config.clear_old_cache {
            tracing::info!(target: "service::resync", kind = %self.config.kind, "cleaning out old data");
            self.cleaner.clean(&self.config.ranges, self.config.kind).await?;
        }
        for range in &self.config.ranges {
            if range.stop < range.start {
                tracing::error!(
                    target: "service::resync",
                    start = range.start,
                    stop = range.stop,
                    "skipping reversed resync range"
                );
                continue;
            }
            tracing::info!(
                target: "service::resync",
                chain = %self.pipeline.chain(),
                start = range.start,
                stop = range.stop,
                "resyncing range"
            );
            let failures = process_gap(
                &self.pipeline,
                &self.fetcher,
                *range,
                self.config.batch_size,
                self.config.workers,
            )
            .await?;
            if failures > 0 {
                tracing::warn!(
                    target: "service::resync",
                    start = range.start,
                    stop = range.stop,
                    failures,
                    "range completed with failed bins"
                );
            }
        }
        Ok(())
    }
}
