//! Bounded-parallel fetch/convert/publish over height ranges.
//!
//! Backfill and resync both split a range into fixed-size bins and process
//! the bins on a semaphore-capped worker pool. A failed bin is logged and
//! counted; it never stops sibling bins, so a partially failed range must be
//! re-run out of band.

use std::sync::Arc;

use supernode_types::Gap;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use crate::{PayloadFetcher, Pipeline, ServiceError};

/// Splits an inclusive height range into consecutive bins of at most
/// `batch_size` heights each.
pub fn height_bins(start: u64, stop: u64, batch_size: u64) -> Result<Vec<Vec<u64>>, ServiceError> {
    if stop < start {
        return Err(ServiceError::InvalidRange { start, stop });
    }
    let batch_size = batch_size.max(1);
    let mut bins = Vec::new();
    let mut next = start;
    loop {
        let bin_stop = next.saturating_add(batch_size - 1).min(stop);
        bins.push((next..=bin_stop).collect());
        if bin_stop == stop {
            return Ok(bins);
        }
        next = bin_stop + 1;
    }
}

/// Fetches, converts, and publishes every height in `gap` across at most
/// `workers` concurrent bins, returning the number of bins that failed.
pub(crate) async fn process_gap<P, F>(
    pipeline: &Arc<P>,
    fetcher: &Arc<F>,
    gap: Gap,
    batch_size: u64,
    workers: usize,
) -> Result<usize, ServiceError>
where
    P: Pipeline,
    F: PayloadFetcher<P::Raw> + 'static,
{
    let semaphore = Arc::new(Semaphore::new(workers.max(1)));
    let mut tasks = JoinSet::new();
    for bin in height_bins(gap.start, gap.stop, batch_size)? {
        // The semaphore is never closed, so acquisition only fails if the
        // runtime is tearing down.
        let Ok(permit) = Arc::clone(&semaphore).acquire_owned().await else {
            break;
        };
        let pipeline = Arc::clone(pipeline);
        let fetcher = Arc::clone(fetcher);
        tasks.spawn(async move {
            let _permit = permit;
            let span = (*bin.first().unwrap_or(&0), *bin.last().unwrap_or(&0));
            (span, process_bin(&*pipeline, &*fetcher, &bin).await)
        });
    }
    let mut failures = 0usize;
    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok((_, Ok(()))) => {}
            Ok(((start, stop), Err(err))) => {
                failures += 1;
                tracing::error!(target: "service::worker", start, stop, %err, "height bin failed");
            }
            Err(err) => {
                failures += 1;
                tracing::error!(target: "service::worker", %err, "worker task panicked");
            }
        }
    }
    Ok(failures)
}

async fn process_bin<P, F>(pipeline: &P, fetcher: &F, heights: &[u64]) -> Result<(), ServiceError>
where
    P: Pipeline,
    F: PayloadFetcher<P::Raw> + ?Sized,
{
    let raws = fetcher.fetch_at(heights).await?;
    for raw in &raws {
        let converted = pipeline.convert(raw)?;
        pipeline.publish(&converted).await?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use crate::mock::{MockFetcher, MockPipeline};

    use super::*;

    #[test]
    fn height_bins_splits_into_batches() {
        let bins = height_bins(1, 10, 4).unwrap();
        assert_eq!(bins, vec![vec![1, 2, 3, 4], vec![5, 6, 7, 8], vec![9, 10]]);
        assert_eq!(height_bins(3, 3, 100).unwrap(), vec![vec![3]]);
    }

    #[test]
    fn height_bins_rejects_reversed_ranges() {
        assert!(matches!(
            height_bins(10, 1, 4),
            Err(ServiceError::InvalidRange { start: 10, stop: 1 })
        ));
    }

    #[tokio::test]
    async fn failed_bins_do_not_stop_siblings() {
        let pipeline = MockPipeline::with_indexed([]);
        let fetcher = Arc::new(MockFetcher { fail_on: Some(5) });
        let failures =
            process_gap(&pipeline, &fetcher, Gap { start: 1, stop: 9 }, 3, 2).await.unwrap();
        assert_eq!(failures, 1);
        let published = pipeline.published();
        assert_eq!(published, vec![1, 2, 3, 7, 8, 9]);
    }
}
