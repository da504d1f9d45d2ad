//! Bitcoin binding of the [`Pipeline`] seam.

use async_trait::async_trait;
use bitcoin::Network;
use sqlx::PgPool;
use supernode_btc::{CidIndexer, CidRetriever, Cleaner, IpldPublisher, PgIpldFetcher};
use supernode_types::btc::{
    CidPayload, ConvertedPayload, Iplds, RawBlockPayload, SubscriptionSettings,
};
use supernode_types::{ChainType, DataKind, Gap};

use crate::{Cleanup, FilterResponse, FilterSettings, Pipeline, ServiceError};

/// The Bitcoin pipeline: raw block payloads in, filtered IPLD bundles out.
#[derive(Debug, Clone)]
pub struct BtcPipeline {
    network: Network,
    publisher: IpldPublisher,
    indexer: CidIndexer,
    retriever: CidRetriever,
    fetcher: PgIpldFetcher,
}

impl BtcPipeline {
    /// Creates a pipeline over `pool` writing rows attributed to `node_id`.
    ///
    /// `network` selects the address encoding used during conversion.
    pub fn new(pool: &PgPool, node_id: i64, network: Network) -> Self {
        Self {
            network,
            publisher: IpldPublisher::new(pool, node_id),
            indexer: CidIndexer::new(pool, node_id),
            retriever: CidRetriever::new(pool),
            fetcher: PgIpldFetcher::new(pool),
        }
    }
}

#[async_trait]
impl Pipeline for BtcPipeline {
    type Raw = RawBlockPayload;
    type Converted = ConvertedPayload;
    type Cids = CidPayload;
    type Settings = SubscriptionSettings;
    type Response = Iplds;

    fn chain(&self) -> ChainType {
        ChainType::Bitcoin
    }

    fn convert(&self, raw: &Self::Raw) -> Result<Self::Converted, ServiceError> {
        Ok(supernode_btc::converter::convert(raw, self.network)?)
    }

    async fn publish(&self, payload: &Self::Converted) -> Result<Self::Cids, ServiceError> {
        Ok(self.publisher.publish(payload).await?)
    }

    async fn index(&self, cids: &Self::Cids) -> Result<(), ServiceError> {
        Ok(self.indexer.index(cids).await?)
    }

    async fn retrieve(
        &self,
        settings: &Self::Settings,
        block_number: i64,
    ) -> Result<Vec<Self::Response>, ServiceError> {
        let (wrapper, empty) = self.retriever.retrieve(settings, block_number).await?;
        if empty {
            return Ok(Vec::new());
        }
        Ok(vec![self.fetcher.fetch(&wrapper).await?])
    }

    fn filter(
        &self,
        settings: &Self::Settings,
        payload: &Self::Converted,
    ) -> Result<Self::Response, ServiceError> {
        Ok(supernode_btc::filterer::filter_payload(settings, payload)?)
    }

    async fn first_block_number(&self) -> Result<i64, ServiceError> {
        Ok(self.retriever.first_block_number().await?)
    }

    async fn last_block_number(&self) -> Result<i64, ServiceError> {
        Ok(self.retriever.last_block_number().await?)
    }

    async fn gaps(&self, validation_level: i64) -> Result<Vec<Gap>, ServiceError> {
        Ok(self.retriever.retrieve_gaps(validation_level).await?)
    }
}

impl FilterSettings for SubscriptionSettings {
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

impl FilterResponse for Iplds {
    fn is_empty(&self) -> bool {
        Self::is_empty(self)
    }
}

#[async_trait]
impl Cleanup for Cleaner {
    async fn clean(&self, ranges: &[Gap], kind: DataKind) -> Result<(), ServiceError> {
        Ok(Self::clean(self, ranges, kind).await?)
    }

    async fn reset_validation(&self, ranges: &[Gap]) -> Result<(), ServiceError> {
        Ok(Self::reset_validation(self, ranges).await?)
    }
}
