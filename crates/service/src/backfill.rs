//! Periodic gap detection and fill against an archival payload source.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use supernode_types::Gap;
use tokio::sync::oneshot;

use crate::worker::process_gap;
use crate::{PayloadFetcher, Pipeline, ServiceError};

/// Periodically scans the index for missing heights and fills them by
/// fetching, converting, and publishing the affected blocks.
pub struct BackfillService<P, F> {
    pipeline: Arc<P>,
    fetcher: Arc<F>,
    frequency: Duration,
    batch_size: u64,
    workers: usize,
}

impl<P, F> fmt::Debug for BackfillService<P, F>
where
    P: Pipeline,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BackfillService")
            .field("chain", &self.pipeline.chain())
            .field("frequency", &self.frequency)
            .field("batch_size", &self.batch_size)
            .field("workers", &self.workers)
            .finish_non_exhaustive()
    }
}

impl<P, F> BackfillService<P, F>
where
    P: Pipeline,
    F: PayloadFetcher<P::Raw> + 'static,
{
    /// Creates a backfill service checking for gaps every `frequency`.
    pub fn new(
        pipeline: Arc<P>,
        fetcher: Arc<F>,
        frequency: Duration,
        batch_size: u64,
        workers: usize,
    ) -> Self {
        Self { pipeline, fetcher, frequency, batch_size, workers }
    }

    /// Runs the gap-check loop until `shutdown` fires.
    pub async fn run(&self, mut shutdown: oneshot::Receiver<()>) {
        let mut ticker = tokio::time::interval(self.frequency);
        tracing::info!(target: "service::backfill", chain = %self.pipeline.chain(), "backfill loop started");
        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    tracing::info!(target: "service::backfill", "backfill loop stopping");
                    return;
                }
                _ = ticker.tick() => {
                    if let Err(err) = self.fill_gaps().await {
                        tracing::error!(target: "service::backfill", %err, "gap check failed");
                    }
                }
            }
        }
    }

    /// One gap-check pass: fill everything below the first indexed block,
    /// then every interior gap.
    async fn fill_gaps(&self) -> Result<(), ServiceError> {
        tracing::debug!(target: "service::backfill", "searching for gaps");
        let first = self.pipeline.first_block_number().await?;
        if first > 1 {
            tracing::info!(target: "service::backfill", first, "found gap at the start of the sync");
            self.fill(Gap { start: 1, stop: (first - 1) as u64 }).await;
        }
        for gap in self.pipeline.gaps(0).await? {
            self.fill(gap).await;
        }
        Ok(())
    }

    async fn fill(&self, gap: Gap) {
        match process_gap(&self.pipeline, &self.fetcher, gap, self.batch_size, self.workers).await {
            Ok(0) => {}
            Ok(failures) => {
                tracing::warn!(target: "service::backfill", ?gap, failures, "gap filled with failed bins");
            }
            Err(err) => {
                tracing::error!(target: "service::backfill", ?gap, %err, "gap fill failed");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::mock::{MockFetcher, MockPipeline};

    use super::*;

    #[tokio::test]
    async fn fill_gaps_covers_the_leading_range_and_interior_holes() {
        let pipeline = MockPipeline::with_indexed([3, 4, 7]);
        let fetcher = Arc::new(MockFetcher { fail_on: None });
        let service =
            BackfillService::new(Arc::clone(&pipeline), fetcher, Duration::from_secs(60), 2, 4);

        service.fill_gaps().await.unwrap();
        assert_eq!(pipeline.published(), vec![1, 2, 5, 6]);
    }

    #[tokio::test]
    async fn empty_index_surfaces_the_seed_error() {
        let pipeline = MockPipeline::with_indexed([]);
        let fetcher = Arc::new(MockFetcher { fail_on: None });
        let service =
            BackfillService::new(Arc::clone(&pipeline), fetcher, Duration::from_secs(60), 2, 4);

        assert!(service.fill_gaps().await.is_err());
        assert!(pipeline.published().is_empty());
    }
}
