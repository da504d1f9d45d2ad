//! The live ingest loop and its subscription fan-out.
//!
//! One long-lived stream per chain: each payload is converted once, fanned
//! out to every subscriber whose filter matches, and published to Postgres.
//! A failed conversion or publish stops forward progress on that block only;
//! the loop keeps consuming.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{Mutex, mpsc, oneshot};

use crate::{FilterResponse, FilterSettings, PayloadStreamer, Pipeline, ServiceError};

/// Buffer size of the channels payloads are streamed over.
pub const PAYLOAD_CHANNEL_CAPACITY: usize = 20_000;

/// Identifies one live subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

struct Subscriber<P: Pipeline> {
    settings: P::Settings,
    sender: mpsc::Sender<P::Response>,
}

/// Streams live chain data through the pipeline and serves filtered subsets
/// to subscribers.
pub struct SyncService<P: Pipeline, S> {
    pipeline: Arc<P>,
    streamer: S,
    subscribers: Mutex<HashMap<SubscriptionId, Subscriber<P>>>,
    next_id: AtomicU64,
}

impl<P: Pipeline, S> fmt::Debug for SyncService<P, S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SyncService").field("chain", &self.pipeline.chain()).finish_non_exhaustive()
    }
}

impl<P, S> SyncService<P, S>
where
    P: Pipeline,
    S: PayloadStreamer<P::Raw>,
{
    /// Creates a sync service over `pipeline`, consuming payloads from
    /// `streamer`.
    pub fn new(pipeline: Arc<P>, streamer: S) -> Self {
        Self { pipeline, streamer, subscribers: Mutex::new(HashMap::new()), next_id: AtomicU64::new(0) }
    }

    /// Registers a subscriber and returns the channel its responses arrive
    /// on.
    ///
    /// When the settings request backfill, historical responses are sent
    /// first from the Postgres index; a backfill-only subscription is never
    /// registered for live data and its channel closes once history has been
    /// sent.
    pub async fn subscribe(
        &self,
        settings: P::Settings,
    ) -> (SubscriptionId, mpsc::Receiver<P::Response>) {
        let (sender, receiver) = mpsc::channel(PAYLOAD_CHANNEL_CAPACITY);
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        if settings.backfill() || settings.backfill_only() {
            let pipeline = Arc::clone(&self.pipeline);
            let settings = settings.clone();
            let sender = sender.clone();
            tokio::spawn(send_historical(pipeline, settings, sender));
        }
        if !settings.backfill_only() {
            self.subscribers.lock().await.insert(id, Subscriber { settings, sender });
        }
        tracing::info!(target: "service::sync", id = id.0, "added subscription");
        (id, receiver)
    }

    /// Removes a subscription, closing its channel. Returns false when the
    /// id was not registered.
    pub async fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let removed = self.subscribers.lock().await.remove(&id).is_some();
        if removed {
            tracing::info!(target: "service::sync", id = id.0, "removed subscription");
        }
        removed
    }

    /// Runs the ingest loop until `shutdown` fires or the stream ends.
    pub async fn run(&self, mut shutdown: oneshot::Receiver<()>) -> Result<(), ServiceError> {
        let mut payloads = self.streamer.stream().await?;
        tracing::info!(target: "service::sync", chain = %self.pipeline.chain(), "sync loop started");
        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    tracing::info!(target: "service::sync", "sync loop stopping");
                    break;
                }
                maybe = payloads.recv() => {
                    let Some(raw) = maybe else {
                        tracing::warn!(target: "service::sync", "payload stream ended");
                        break;
                    };
                    self.process(&raw).await;
                }
            }
        }
        Ok(())
    }

    async fn process(&self, raw: &P::Raw) {
        let converted = match self.pipeline.convert(raw) {
            Ok(converted) => converted,
            Err(err) => {
                tracing::error!(target: "service::sync", %err, "payload conversion failed");
                return;
            }
        };
        if let Err(err) = self.pipeline.publish(&converted).await {
            tracing::error!(target: "service::sync", %err, "publish failed");
        }
        self.broadcast(&converted).await;
    }

    async fn broadcast(&self, converted: &P::Converted) {
        let mut subscribers = self.subscribers.lock().await;
        let mut stale = Vec::new();
        for (id, subscriber) in subscribers.iter() {
            let response = match self.pipeline.filter(&subscriber.settings, converted) {
                Ok(response) => response,
                Err(err) => {
                    tracing::error!(
                        target: "service::sync",
                        id = id.0,
                        %err,
                        "filter failed; dropping subscription"
                    );
                    stale.push(*id);
                    continue;
                }
            };
            if response.is_empty() {
                continue;
            }
            match subscriber.sender.try_send(response) {
                Ok(()) => {}
                Err(TrySendError::Full(_)) => {
                    tracing::warn!(
                        target: "service::sync",
                        id = id.0,
                        "subscriber channel full; dropping payload"
                    );
                }
                Err(TrySendError::Closed(_)) => stale.push(*id),
            }
        }
        for id in stale {
            subscribers.remove(&id);
        }
    }
}

/// Replays indexed history into a subscriber channel, clamped to the
/// subscription's range. Stops silently once the receiver is gone.
async fn send_historical<P: Pipeline>(
    pipeline: Arc<P>,
    settings: P::Settings,
    sender: mpsc::Sender<P::Response>,
) {
    let first = match pipeline.first_block_number().await {
        Ok(first) => first,
        Err(err) => {
            tracing::error!(target: "service::sync", %err, "historical seed failed");
            return;
        }
    };
    let last = match pipeline.last_block_number().await {
        Ok(last) => last,
        Err(err) => {
            tracing::error!(target: "service::sync", %err, "historical seed failed");
            return;
        }
    };
    let start = first.max(settings.start() as i64);
    let mut end = last;
    // The subscription end is exclusive; zero or negative means unbounded.
    if settings.end() > 0 && settings.end() - 1 < end {
        end = settings.end() - 1;
    }
    for height in start..=end {
        let responses = match pipeline.retrieve(&settings, height).await {
            Ok(responses) => responses,
            Err(err) => {
                tracing::error!(target: "service::sync", height, %err, "historical retrieval failed");
                continue;
            }
        };
        for response in responses {
            if response.is_empty() {
                continue;
            }
            if sender.send(response).await.is_err() {
                return;
            }
        }
    }
    tracing::debug!(target: "service::sync", start, end, "historical send complete");
}

#[cfg(test)]
mod tests {
    use crate::mock::{MockPipeline, MockSettings, MockStreamer};

    use super::*;

    #[tokio::test]
    async fn live_payloads_fan_out_to_matching_subscribers() {
        let pipeline = MockPipeline::with_indexed([]);
        let service =
            Arc::new(SyncService::new(Arc::clone(&pipeline), MockStreamer::new([1, 2, 3])));

        let (_, mut open_rx) = service.subscribe(MockSettings::default()).await;
        let (_, mut narrow_rx) =
            service.subscribe(MockSettings { min_height: 3, ..Default::default() }).await;

        let (_shutdown_tx, shutdown_rx) = oneshot::channel();
        let runner = Arc::clone(&service);
        let handle = tokio::spawn(async move { runner.run(shutdown_rx).await });

        for expected in [1, 2, 3] {
            assert_eq!(open_rx.recv().await.unwrap().height, expected);
        }
        assert_eq!(narrow_rx.recv().await.unwrap().height, 3);

        // The stream ends after the last payload, so the loop exits cleanly.
        handle.await.unwrap().unwrap();
        assert_eq!(pipeline.published(), vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn conversion_failures_skip_the_block() {
        let pipeline = MockPipeline::with_indexed([]);
        let service = Arc::new(SyncService::new(
            Arc::clone(&pipeline),
            MockStreamer::new([1, u64::MAX, 3]),
        ));
        let (_, mut rx) = service.subscribe(MockSettings::default()).await;

        let (_shutdown_tx, shutdown_rx) = oneshot::channel();
        let runner = Arc::clone(&service);
        let handle = tokio::spawn(async move { runner.run(shutdown_rx).await });

        assert_eq!(rx.recv().await.unwrap().height, 1);
        assert_eq!(rx.recv().await.unwrap().height, 3);
        handle.await.unwrap().unwrap();
        assert_eq!(pipeline.published(), vec![1, 3]);
    }

    #[tokio::test]
    async fn unsubscribe_closes_the_channel() {
        let pipeline = MockPipeline::with_indexed([]);
        let service = SyncService::new(pipeline, MockStreamer::new([]));
        let (id, mut rx) = service.subscribe(MockSettings::default()).await;
        assert!(service.unsubscribe(id).await);
        assert!(!service.unsubscribe(id).await);
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn backfill_only_replays_history_then_closes() {
        let pipeline = MockPipeline::with_indexed([1, 2, 3]);
        let service = SyncService::new(pipeline, MockStreamer::new([]));
        let settings = MockSettings { start: 2, backfill_only: true, ..Default::default() };
        let (_, mut rx) = service.subscribe(settings).await;

        assert_eq!(rx.recv().await.unwrap().height, 2);
        assert_eq!(rx.recv().await.unwrap().height, 3);
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn backfill_respects_the_exclusive_end_bound() {
        let pipeline = MockPipeline::with_indexed([1, 2, 3, 4]);
        let service = SyncService::new(pipeline, MockStreamer::new([]));
        let settings = MockSettings { end: 3, backfill_only: true, ..Default::default() };
        let (_, mut rx) = service.subscribe(settings).await;

        assert_eq!(rx.recv().await.unwrap().height, 1);
        assert_eq!(rx.recv().await.unwrap().height, 2);
        assert!(rx.recv().await.is_none());
    }
}
