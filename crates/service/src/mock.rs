//! In-memory pipeline, fetcher, and streamer doubles for service tests.

use std::collections::BTreeSet;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde::Serialize;
use supernode_types::{ChainType, Gap, contiguous_ranges};
use tokio::sync::mpsc;

use crate::{
    FilterResponse, FilterSettings, PayloadFetcher, PayloadStreamer, Pipeline, ServiceError,
};

/// A pipeline whose "blocks" are bare heights. Conversion of `u64::MAX`
/// fails, so tests can poison individual payloads.
#[derive(Debug, Default)]
pub(crate) struct MockPipeline {
    indexed: Mutex<BTreeSet<u64>>,
    published: Mutex<Vec<u64>>,
}

impl MockPipeline {
    pub(crate) fn with_indexed(heights: impl IntoIterator<Item = u64>) -> Arc<Self> {
        Arc::new(Self {
            indexed: Mutex::new(heights.into_iter().collect()),
            published: Mutex::new(Vec::new()),
        })
    }

    /// Heights published so far, sorted.
    pub(crate) fn published(&self) -> Vec<u64> {
        let mut published = self.published.lock().unwrap().clone();
        published.sort_unstable();
        published
    }
}

#[derive(Debug, Clone, Default)]
pub(crate) struct MockSettings {
    pub(crate) start: u64,
    pub(crate) end: i64,
    pub(crate) backfill: bool,
    pub(crate) backfill_only: bool,
    /// Heights below this filter as empty.
    pub(crate) min_height: u64,
}

impl FilterSettings for MockSettings {
    fn start(&self) -> u64 {
        self.start
    }

    fn end(&self) -> i64 {
        self.end
    }

    fn backfill(&self) -> bool {
        self.backfill
    }

    fn backfill_only(&self) -> bool {
        self.backfill_only
    }
}

#[derive(Debug, Clone, Serialize)]
pub(crate) struct MockResponse {
    pub(crate) height: u64,
    pub(crate) empty: bool,
}

impl FilterResponse for MockResponse {
    fn is_empty(&self) -> bool {
        self.empty
    }
}

#[async_trait]
impl Pipeline for MockPipeline {
    type Raw = u64;
    type Converted = u64;
    type Cids = u64;
    type Settings = MockSettings;
    type Response = MockResponse;

    fn chain(&self) -> ChainType {
        ChainType::Ethereum
    }

    fn convert(&self, raw: &u64) -> Result<u64, ServiceError> {
        if *raw == u64::MAX {
            return Err(ServiceError::Fetch("poison payload".to_string()));
        }
        Ok(*raw)
    }

    async fn publish(&self, payload: &u64) -> Result<u64, ServiceError> {
        self.published.lock().unwrap().push(*payload);
        self.indexed.lock().unwrap().insert(*payload);
        Ok(*payload)
    }

    async fn index(&self, cids: &u64) -> Result<(), ServiceError> {
        self.indexed.lock().unwrap().insert(*cids);
        Ok(())
    }

    async fn retrieve(
        &self,
        settings: &MockSettings,
        block_number: i64,
    ) -> Result<Vec<MockResponse>, ServiceError> {
        let height = block_number as u64;
        if self.indexed.lock().unwrap().contains(&height) {
            Ok(vec![MockResponse { height, empty: height < settings.min_height }])
        } else {
            Ok(Vec::new())
        }
    }

    fn filter(&self, settings: &MockSettings, payload: &u64) -> Result<MockResponse, ServiceError> {
        Ok(MockResponse { height: *payload, empty: *payload < settings.min_height })
    }

    async fn first_block_number(&self) -> Result<i64, ServiceError> {
        self.indexed
            .lock()
            .unwrap()
            .first()
            .map(|height| *height as i64)
            .ok_or_else(|| ServiceError::Fetch("no blocks indexed".to_string()))
    }

    async fn last_block_number(&self) -> Result<i64, ServiceError> {
        self.indexed
            .lock()
            .unwrap()
            .last()
            .map(|height| *height as i64)
            .ok_or_else(|| ServiceError::Fetch("no blocks indexed".to_string()))
    }

    async fn gaps(&self, _validation_level: i64) -> Result<Vec<Gap>, ServiceError> {
        let indexed = self.indexed.lock().unwrap();
        let (Some(first), Some(last)) = (indexed.first(), indexed.last()) else {
            return Ok(Vec::new());
        };
        let missing: Vec<u64> =
            (*first..=*last).filter(|height| !indexed.contains(height)).collect();
        Ok(contiguous_ranges(&missing))
    }
}

/// Serves the requested heights back as raw payloads; optionally fails any
/// batch containing `fail_on`.
#[derive(Debug, Default)]
pub(crate) struct MockFetcher {
    pub(crate) fail_on: Option<u64>,
}

#[async_trait]
impl PayloadFetcher<u64> for MockFetcher {
    async fn fetch_at(&self, heights: &[u64]) -> Result<Vec<u64>, ServiceError> {
        if let Some(poison) = self.fail_on {
            if heights.contains(&poison) {
                return Err(ServiceError::Fetch(format!("no payload at height {poison}")));
            }
        }
        Ok(heights.to_vec())
    }
}

/// Streams a fixed list of payloads then ends the stream.
#[derive(Debug)]
pub(crate) struct MockStreamer {
    payloads: Vec<u64>,
}

impl MockStreamer {
    pub(crate) fn new(payloads: impl IntoIterator<Item = u64>) -> Self {
        Self { payloads: payloads.into_iter().collect() }
    }
}

#[async_trait]
impl PayloadStreamer<u64> for MockStreamer {
    async fn stream(&self) -> Result<mpsc::Receiver<u64>, ServiceError> {
        let (tx, rx) = mpsc::channel(16);
        let payloads = self.payloads.clone();
        tokio::spawn(async move {
            for payload in payloads {
                if tx.send(payload).await.is_err() {
                    break;
                }
            }
        });
        Ok(rx)
    }
}
