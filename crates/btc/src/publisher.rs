//! Atomic publish-and-index of a converted Bitcoin payload.
//!
//! Blobs land in `public.blocks` and index rows in `btc.*` within a single
//! transaction. Object bytes are consensus serializations; CIDs use the
//! double-sha256 multihash so a header CID's digest is the block hash
//! itself.

use bitcoin::consensus::serialize;
use sqlx::PgPool;
use supernode_ipld::codec;
use supernode_types::btc::{CidPayload, ConvertedPayload, HeaderModel};

use crate::{BtcError, indexer};

/// Publishes blobs and index rows for converted payloads, attributed to one
/// node identity.
#[derive(Debug, Clone)]
pub struct IpldPublisher {
    pool: PgPool,
    node_id: i64,
}

impl IpldPublisher {
    /// Creates a publisher writing rows attributed to `node_id`.
    pub fn new(pool: &PgPool, node_id: i64) -> Self {
        Self { pool: pool.clone(), node_id }
    }

    /// Publishes and indexes every piece of the payload in one transaction,
    /// returning the CIDs and row models that were written.
    ///
    /// The transaction rolls back on drop if any step fails.
    pub async fn publish(&self, payload: &ConvertedPayload) -> Result<CidPayload, BtcError> {
        let mut tx = self.pool.begin().await?;

        // Header.
        let header_bytes = serialize(&payload.header);
        let header_cid = supernode_ipld::dbl_sha2_256_cid(codec::BTC_BLOCK, &header_bytes)?;
        supernode_storage::put_ipld(&mut *tx, &header_cid, &header_bytes).await?;
        let header = HeaderModel {
            block_number: payload.height.to_string(),
            block_hash: payload.header.block_hash().to_string(),
            parent_hash: payload.header.prev_blockhash.to_string(),
            cid: header_cid.to_string(),
            node_id: self.node_id,
            timestamp: i64::from(payload.header.time),
            bits: i64::from(payload.header.bits.to_consensus()),
            ..Default::default()
        };
        let header_id = indexer::index_header(&mut *tx, &header, self.node_id).await?;

        // Transactions with their inputs and outputs.
        let mut transactions = Vec::with_capacity(payload.txs.len());
        for (i, transaction) in payload.txs.iter().enumerate() {
            let tx_bytes = serialize(transaction);
            let tx_cid = supernode_ipld::dbl_sha2_256_cid(codec::BTC_TX, &tx_bytes)?;
            supernode_storage::put_ipld(&mut *tx, &tx_cid, &tx_bytes).await?;
            let mut tx_model = payload.tx_meta[i].clone();
            tx_model.cid = tx_cid.to_string();
            indexer::index_transaction_with_ins_and_outs(&mut *tx, &tx_model, header_id).await?;
            transactions.push(tx_model);
        }

        tx.commit().await?;
        tracing::info!(
            target: "btc::publisher",
            block_number = payload.height,
            block_hash = %header.block_hash,
            txs = transactions.len(),
            "Published and indexed block"
        );
        Ok(CidPayload { header, transactions })
    }
}
