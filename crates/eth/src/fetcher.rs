//! Resolves a [`CidWrapper`] of index rows into the blobs it references.
//!
//! Two fetchers share one contract: [`PgIpldFetcher`] reads `public.blocks`
//! directly on one connection, [`IpldFetcher`] goes through a
//! [`BlockService`] whose batch lookups are unordered and possibly
//! incomplete. Both surface a missing blob as
//! [`EthError::UnexpectedNumberOfIplds`].

use std::collections::HashMap;

use alloy_primitives::{B256, U256};
use cid::Cid;
use sqlx::{PgConnection, PgPool};
use supernode_storage::BlockService;
use supernode_types::IpldBlock;
use supernode_types::eth::{CidWrapper, Iplds, NodeType, StateNode, StorageNode};

use crate::EthError;

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

    /// Fetches the blob behind every CID in the wrapper, preserving the
    /// per-category structure and leaf-key associations.
    pub async fn fetch(&self, cids: &CidWrapper) -> Result<Iplds, EthError> {
        tracing::debug!(target: "eth::fetcher", block_number = cids.block_number, "Fetching iplds");
        let mut conn = self.pool.acquire().await?;
        let header = if cids.header.cid.is_empty() {
            None
        } else {
            Some(IpldBlock {
                cid: cids.header.cid.clone(),
                data: supernode_storage::fetch_ipld(&mut *conn, &cids.header.cid).await?,
            })
        };
        let uncles = fetch_batch(&mut *conn, &cid_strings(&cids.uncles, |u| &u.cid)).await?;
        let transactions =
            fetch_batch(&mut *conn, &cid_strings(&cids.transactions, |t| &t.cid)).await?;
        let receipts = fetch_batch(&mut *conn, &cid_strings(&cids.receipts, |r| &r.cid)).await?;
        let state_blocks =
            fetch_batch(&mut *conn, &cid_strings(&cids.state_nodes, |s| &s.cid)).await?;
        let storage_blocks =
            fetch_batch(&mut *conn, &cid_strings(&cids.storage_nodes, |s| &s.cid)).await?;
        assemble(cids, header, uncles, transactions, receipts, state_blocks, storage_blocks)
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
    /// service in one batch per object class.
    pub async fn fetch(&self, cids: &CidWrapper) -> Result<Iplds, EthError> {
        tracing::debug!(target: "eth::fetcher", block_number = cids.block_number, "Fetching iplds");
        let header = if cids.header.cid.is_empty() {
            None
        } else {
            let blocks = service_batch(&self.service, &[cids.header.cid.as_str()]).await?;
            blocks.into_iter().next()
        };
        let uncles =
            service_batch(&self.service, &cid_strings(&cids.uncles, |u| &u.cid)).await?;
        let transactions =
            service_batch(&self.service, &cid_strings(&cids.transactions, |t| &t.cid)).await?;
        let receipts =
            service_batch(&self.service, &cid_strings(&cids.receipts, |r| &r.cid)).await?;
        let state_blocks =
            service_batch(&self.service, &cid_strings(&cids.state_nodes, |s| &s.cid)).await?;
        let storage_blocks =
            service_batch(&self.service, &cid_strings(&cids.storage_nodes, |s| &s.cid)).await?;
        assemble(cids, header, uncles, transactions, receipts, state_blocks, storage_blocks)
    }
}

fn cid_strings<T, F: Fn(&T) -> &String>(models: &[T], cid: F) -> Vec<&str> {
    models.iter().map(|m| cid(m).as_str()).collect()
}

fn assemble(
    cids: &CidWrapper,
    header: Option<IpldBlock>,
    uncles: Vec<IpldBlock>,
    transactions: Vec<IpldBlock>,
    receipts: Vec<IpldBlock>,
    state_blocks: Vec<IpldBlock>,
    storage_blocks: Vec<IpldBlock>,
) -> Result<Iplds, EthError> {
    let mut state_nodes = Vec::with_capacity(cids.state_nodes.len());
    for (model, ipld) in cids.state_nodes.iter().zip(state_blocks) {
        state_nodes.push(StateNode {
            state_leaf_key: parse_leaf_key(model.state_leaf_key.as_deref())?,
            node_type: NodeType::from_int(model.node_type),
            ipld,
        });
    }
    let mut storage_nodes = Vec::with_capacity(cids.storage_nodes.len());
    for (model, ipld) in cids.storage_nodes.iter().zip(storage_blocks) {
        storage_nodes.push(StorageNode {
            state_leaf_key: parse_leaf_key(model.state_leaf_key.as_deref())?,
            storage_leaf_key: parse_leaf_key(model.storage_leaf_key.as_deref())?,
            node_type: NodeType::from_int(model.node_type),
            ipld,
        });
    }
    Ok(Iplds {
        block_number: cids.block_number as u64,
        total_difficulty: if cids.header.td.is_empty() {
            U256::ZERO
        } else {
            cids.header.td.parse()?
        },
        header,
        uncles,
        transactions,
        receipts,
        state_nodes,
        storage_nodes,
    })
}

/// Fetches one blob per CID, in input order. Errors with
/// [`EthError::UnexpectedNumberOfIplds`] when the blockstore is missing any
/// referenced key.
async fn fetch_batch(conn: &mut PgConnection, cids: &[&str]) -> Result<Vec<IpldBlock>, EthError> {
    if cids.is_empty() {
        return Ok(Vec::new());
    }
    let mut keys = Vec::with_capacity(cids.len());
    for cid in cids {
        keys.push(supernode_ipld::blockstore_key(&Cid::try_from(*cid)?));
    }
    // Identical object bytes share a CID, so the key list can repeat while
    // the blockstore holds one row per key.
    let mut distinct_keys = keys.clone();
    distinct_keys.sort_unstable();
    distinct_keys.dedup();
    let rows: Vec<(String, Vec<u8>)> =
        sqlx::query_as("SELECT key, data FROM public.blocks WHERE key = ANY($1)")
            .bind(&distinct_keys)
            .fetch_all(conn)
            .await?;
    if rows.len() != distinct_keys.len() {
        return Err(EthError::UnexpectedNumberOfIplds {
            expected: distinct_keys.len(),
            got: rows.len(),
        });
    }
    let by_key: HashMap<String, Vec<u8>> = rows.into_iter().collect();
    let mut blocks = Vec::with_capacity(cids.len());
    for (cid, key) in cids.iter().zip(&keys) {
        let data = by_key.get(key).ok_or(EthError::UnexpectedNumberOfIplds {
            expected: distinct_keys.len(),
            got: by_key.len(),
        })?;
        blocks.push(IpldBlock { cid: (*cid).to_string(), data: data.clone() });
    }
    Ok(blocks)
}

/// Batch fetch through a [`BlockService`], restoring input order and
/// enforcing the count contract the service itself does not guarantee.
async fn service_batch<S: BlockService>(
    service: &S,
    cids: &[&str],
) -> Result<Vec<IpldBlock>, EthError> {
    if cids.is_empty() {
        return Ok(Vec::new());
    }
    let mut parsed = Vec::with_capacity(cids.len());
    for cid in cids {
        parsed.push(Cid::try_from(*cid)?);
    }
    // Same CID can appear more than once; the service resolves each once.
    let mut distinct = parsed.clone();
    distinct.sort_unstable();
    distinct.dedup();
    let fetched = service.get_blocks(&distinct).await?;
    if fetched.len() != distinct.len() {
        return Err(EthError::UnexpectedNumberOfIplds {
            expected: distinct.len(),
            got: fetched.len(),
        });
    }
    let by_cid: HashMap<Cid, Vec<u8>> = fetched.into_iter().collect();
    let mut blocks = Vec::with_capacity(cids.len());
    for (cid, parsed) in cids.iter().zip(&parsed) {
        let data = by_cid.get(parsed).ok_or(EthError::UnexpectedNumberOfIplds {
            expected: cids.len(),
            got: by_cid.len(),
        })?;
        blocks.push(IpldBlock { cid: (*cid).to_string(), data: data.clone() });
    }
    Ok(blocks)
}

fn parse_leaf_key(key: Option<&str>) -> Result<B256, EthError> {
    key.map_or(Ok(B256::ZERO), |k| Ok(k.parse()?))
}
