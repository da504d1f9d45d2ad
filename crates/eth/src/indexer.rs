//! Upserts of `eth.*` index rows.
//!
//! Every statement follows the same conflict policy: insert, or on conflict
//! with the row's uniqueness constraint update the mutable columns in place.
//! Re-indexing a header additionally increments its `times_validated`
//! counter, which the resync service uses to track validation progress.

use alloy_primitives::{B256, keccak256};
use sqlx::{PgConnection, PgPool};
use supernode_types::eth::{
    CidPayload, HeaderModel, NodeType, ReceiptModel, StateAccountModel, StateNodeModel,
    StorageNodeModel, TxModel, UncleModel,
};

use crate::EthError;

/// Standalone indexer for a pre-published [`CidPayload`].
///
/// Used when publishing and indexing run as separate stages; the combined
/// [`IpldPublisher`](crate::IpldPublisher) calls the same row-level upserts
/// inline and has no use for this type.
#[derive(Debug, Clone)]
pub struct CidIndexer {
    pool: PgPool,
    node_id: i64,
}

impl CidIndexer {
    /// Creates an indexer writing rows attributed to `node_id`.
    pub fn new(pool: &PgPool, node_id: i64) -> Self {
        Self { pool: pool.clone(), node_id }
    }

    /// Indexes every row of the payload inside one transaction.
    pub async fn index(&self, cids: &CidPayload) -> Result<(), EthError> {
        let mut tx = self.pool.begin().await?;
        let header_id = index_header(&mut *tx, &cids.header, self.node_id).await?;
        for uncle in &cids.uncles {
            index_uncle(&mut *tx, uncle, header_id).await?;
        }
        for tx_model in &cids.transactions {
            let tx_id = index_transaction(&mut *tx, tx_model, header_id).await?;
            let tx_hash: B256 = tx_model.tx_hash.parse()?;
            if let Some(receipt) = cids.receipts.get(&tx_hash) {
                index_receipt(&mut *tx, receipt, tx_id).await?;
            }
        }
        for state_node in &cids.state_nodes {
            let state_id = index_state_node(&mut *tx, state_node, header_id).await?;
            if state_node.node_type != NodeType::Leaf.as_int() {
                continue;
            }
            let path_hash = keccak256(&state_node.state_path);
            if let Some(account) = cids.state_accounts.get(&path_hash) {
                index_state_account(&mut *tx, account, state_id).await?;
            }
            if let Some(storage_nodes) = cids.storage_nodes.get(&path_hash) {
                for storage_node in storage_nodes {
                    index_storage_node(&mut *tx, storage_node, state_id).await?;
                }
            }
        }
        tx.commit().await?;
        tracing::debug!(
            target: "eth::indexer",
            block_number = %cids.header.block_number,
            "Indexed cid payload"
        );
        Ok(())
    }
}

pub(crate) async fn index_header(
    conn: &mut PgConnection,
    header: &HeaderModel,
    node_id: i64,
) -> Result<i64, EthError> {
    let (id,): (i64,) = sqlx::query_as(
        "INSERT INTO eth.header_cids (block_number, block_hash, parent_hash, cid, td, node_id, reward, state_root, tx_root, receipt_root, uncle_root, bloom, timestamp, times_validated)
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, 1)
         ON CONFLICT (block_number, block_hash) DO UPDATE
         SET (parent_hash, cid, td, node_id, reward, state_root, tx_root, receipt_root, uncle_root, bloom, timestamp, times_validated) =
             ($3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, eth.header_cids.times_validated + 1)
         RETURNING id",
    )
    .bind(&header.block_number)
    .bind(&header.block_hash)
    .bind(&header.parent_hash)
    .bind(&header.cid)
    .bind(&header.td)
    .bind(node_id)
    .bind(&header.reward)
    .bind(&header.state_root)
    .bind(&header.tx_root)
    .bind(&header.receipt_root)
    .bind(&header.uncle_root)
    .bind(&header.bloom)
    .bind(header.timestamp)
    .fetch_one(conn)
    .await?;
    Ok(id)
}

pub(crate) async fn index_uncle(
    conn: &mut PgConnection,
    uncle: &UncleModel,
    header_id: i64,
) -> Result<(), EthError> {
    sqlx::query(
        "INSERT INTO eth.uncle_cids (block_hash, header_id, parent_hash, cid, reward)
         VALUES ($1, $2, $3, $4, $5)
         ON CONFLICT (header_id, block_hash) DO UPDATE
         SET (parent_hash, cid, reward) = ($3, $4, $5)",
    )
    .bind(&uncle.block_hash)
    .bind(header_id)
    .bind(&uncle.parent_hash)
    .bind(&uncle.cid)
    .bind(&uncle.reward)
    .execute(conn)
    .await?;
    Ok(())
}

pub(crate) async fn index_transaction(
    conn: &mut PgConnection,
    tx_model: &TxModel,
    header_id: i64,
) -> Result<i64, EthError> {
    let (id,): (i64,) = sqlx::query_as(
        "INSERT INTO eth.transaction_cids (header_id, tx_hash, cid, dst, src, index)
         VALUES ($1, $2, $3, $4, $5, $6)
         ON CONFLICT (header_id, tx_hash) DO UPDATE
         SET (cid, dst, src, index) = ($3, $4, $5, $6)
         RETURNING id",
    )
    .bind(header_id)
    .bind(&tx_model.tx_hash)
    .bind(&tx_model.cid)
    .bind(&tx_model.dst)
    .bind(&tx_model.src)
    .bind(tx_model.index)
    .fetch_one(conn)
    .await?;
    Ok(id)
}

pub(crate) async fn index_receipt(
    conn: &mut PgConnection,
    receipt: &ReceiptModel,
    tx_id: i64,
) -> Result<(), EthError> {
    sqlx::query(
        "INSERT INTO eth.receipt_cids (tx_id, cid, contract, contract_hash, topic0s, topic1s, topic2s, topic3s, log_contracts)
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
         ON CONFLICT (tx_id) DO UPDATE
         SET (cid, contract, contract_hash, topic0s, topic1s, topic2s, topic3s, log_contracts) =
             ($2, $3, $4, $5, $6, $7, $8, $9)",
    )
    .bind(tx_id)
    .bind(&receipt.cid)
    .bind(&receipt.contract)
    .bind(&receipt.contract_hash)
    .bind(&receipt.topic0s)
    .bind(&receipt.topic1s)
    .bind(&receipt.topic2s)
    .bind(&receipt.topic3s)
    .bind(&receipt.log_contracts)
    .execute(conn)
    .await?;
    Ok(())
}

pub(crate) async fn index_state_node(
    conn: &mut PgConnection,
    state_node: &StateNodeModel,
    header_id: i64,
) -> Result<i64, EthError> {
    let (id,): (i64,) = sqlx::query_as(
        "INSERT INTO eth.state_cids (header_id, state_leaf_key, cid, state_path, node_type)
         VALUES ($1, $2, $3, $4, $5)
         ON CONFLICT (header_id, state_path) DO UPDATE
         SET (state_leaf_key, cid, node_type) = ($2, $3, $5)
         RETURNING id",
    )
    .bind(header_id)
    .bind(&state_node.state_leaf_key)
    .bind(&state_node.cid)
    .bind(&state_node.state_path)
    .bind(state_node.node_type)
    .fetch_one(conn)
    .await?;
    Ok(id)
}

pub(crate) async fn index_state_account(
    conn: &mut PgConnection,
    account: &StateAccountModel,
    state_id: i64,
) -> Result<(), EthError> {
    sqlx::query(
        "INSERT INTO eth.state_accounts (state_id, balance, nonce, code_hash, storage_root)
         VALUES ($1, $2, $3, $4, $5)
         ON CONFLICT (state_id) DO UPDATE
         SET (balance, nonce, code_hash, storage_root) = ($2, $3, $4, $5)",
    )
    .bind(state_id)
    .bind(&account.balance)
    .bind(account.nonce)
    .bind(&account.code_hash)
    .bind(&account.storage_root)
    .execute(conn)
    .await?;
    Ok(())
}

pub(crate) async fn index_storage_node(
    conn: &mut PgConnection,
    storage_node: &StorageNodeModel,
    state_id: i64,
) -> Result<(), EthError> {
    sqlx::query(
        "INSERT INTO eth.storage_cids (state_id, storage_leaf_key, cid, storage_path, node_type)
         VALUES ($1, $2, $3, $4, $5)
         ON CONFLICT (state_id, storage_path) DO UPDATE
         SET (storage_leaf_key, cid, node_type) = ($2, $3, $5)",
    )
    .bind(state_id)
    .bind(&storage_node.storage_leaf_key)
    .bind(&storage_node.cid)
    .bind(&storage_node.storage_path)
    .bind(storage_node.node_type)
    .execute(conn)
    .await?;
    Ok(())
}
