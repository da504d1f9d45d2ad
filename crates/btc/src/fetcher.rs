//! Resolves a [`CidWrapper`] of index rows into the blobs it references.
//!
//! Mirrors the Ethereum fetchers: [`PgIpldFetcher`] reads `public.blocks`
//! directly, [`IpldFetcher`] goes through a [`BlockService`] whose batch
//! lookups are unordered and possibly incomplete.

use std::collections::HashMap;

use cid::Cid;
use sqlx::{PgConnection, PgPool};
use supernode_storage::BlockService;
use supernode_types::IpldBlock;
use supernode_types::btc::{CidWrapper, Iplds};

use crate::BtcError;

/// Fetches IPLD blobs straight out of `public.blocks`.
#[derive(Debug, Clone)]
pub struct PgIpldFetcher {
    pool: PgPool,
}

impl PgIpldFetcher {
    /// Creates a fetcher reading through the given pool.
    pub fn new(pool: &PgPool) -> Self {
        Self { pool: pool.clone() }
    }

    /// Fetches the blob behind every CID in the wrapper.
    pub async fn fetch(&self, cids: &CidWrapper) -> Result<Iplds, BtcError> {
        tracing::debug!(target: "btc::fetcher", block_number = cids.block_number, "Fetching iplds");
        let mut conn = self.pool.acquire().await?;
        let header_cids: Vec<&str> = cids.headers.iter().map(|h| h.cid.as_str()).collect();
        let mut headers = fetch_batch(&mut *conn, &header_cids).await?;
        let tx_cids: Vec<&str> = cids.transactions.iter().map(|t| t.cid.as_str()).collect();
        let transactions = fetch_batch(&mut *conn, &tx_cids).await?;
        Ok(Iplds {
            block_number: cids.block_number as u64,
            header: headers.pop(),
            transactions,
        })
    }
}

/// Fetches IPLD blobs through a generic [`BlockService`].
#[derive(Debug, Clone)]
pub struct IpldFetcher<S> {
    service: S,
}

impl<S: BlockService> IpldFetcher<S> {
    /// Creates a fetcher resolving blobs through `service`.
    pub const fn new(service: S) -> Self {
        Self { service }
    }

    /// Same contract as [`PgIpldFetcher::fetch`], resolved via the block
    /// service.
    pub async fn fetch(&self, cids: &CidWrapper) -> Result<Iplds, BtcError> {
        tracing::debug!(target: "btc::fetcher", block_number = cids.block_number, "Fetching iplds");
        let header_cids: Vec<&str> = cids.headers.iter().map(|h| h.cid.as_str()).collect();
        let mut headers = service_batch(&self.service, &header_cids).await?;
        let tx_cids: Vec<&str> = cids.transactions.iter().map(|t| t.cid.as_str()).collect();
        let transactions = service_batch(&self.service, &tx_cids).await?;
        Ok(Iplds {
            block_number: cids.block_number as u64,
            header: headers.pop(),
            transactions,
        })
    }
}

/// Fetches one blob per CID, in input order. Errors with
/// [`BtcError::UnexpectedNumberOfIplds`] when the blockstore is missing any
/// referenced key.
async fn fetch_batch(conn: &mut PgConnection, cids: &[&str]) -> Result<Vec<IpldBlock>, BtcError> {
    if cids.is_empty() {
        return Ok(Vec::new());
    }
    let mut keys = Vec::with_capacity(cids.len());
    for cid in cids {
        keys.push(supernode_ipld::blockstore_key(&Cid::try_from(*cid)?));
    }
    let rows: Vec<(String, Vec<u8>)> =
        sqlx::query_as("SELECT key, data FROM public.blocks WHERE key = ANY($1)")
            .bind(&keys)
            .fetch_all(conn)
            .await?;
    if rows.len() != keys.len() {
        return Err(BtcError::UnexpectedNumberOfIplds { expected: keys.len(), got: rows.len() });
    }
    let by_key: HashMap<String, Vec<u8>> = rows.into_iter().collect();
    let mut blocks = Vec::with_capacity(cids.len());
    for (cid, key) in cids.iter().zip(&keys) {
        let data = by_key.get(key).ok_or(BtcError::UnexpectedNumberOfIplds {
            expected: keys.len(),
            got: by_key.len(),
        })?;
        blocks.push(IpldBlock { cid: (*cid).to_string(), data: data.clone() });
    }
    Ok(blocks)
}

async fn service_batch<S: BlockService>(
    service: &S,
    cids: &[&str],
) -> Result<Vec<IpldBlock>, BtcError> {
    if cids.is_empty() {
        return Ok(Vec::new());
    }
    let mut parsed = Vec::with_capacity(cids.len());
    for cid in cids {
        parsed.push(Cid::try_from(*cid)?);
    }
    let fetched = service.get_blocks(&parsed).await?;
    if fetched.len() != parsed.len() {
        return Err(BtcError::UnexpectedNumberOfIplds {
            expected: parsed.len(),
            got: fetched.len(),
        });
    }
    let by_cid: HashMap<Cid, Vec<u8>> = fetched.into_iter().collect();
    let mut blocks = Vec::with_capacity(cids.len());
    for (cid, parsed) in cids.iter().zip(&parsed) {
        let data = by_cid.get(parsed).ok_or(BtcError::UnexpectedNumberOfIplds {
            expected: cids.len(),
            got: by_cid.len(),
        })?;
        blocks.push(IpldBlock { cid: (*cid).to_string(), data: data.clone() });
    }
    Ok(blocks)
}
