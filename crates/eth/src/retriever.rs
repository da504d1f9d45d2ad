//! Filter-driven retrieval of `eth.*` index rows.
//!
//! Every list-valued filter dimension compiles to the same SQL shape:
//! `cardinality($n) = 0 OR column = ANY($n)`, so an empty allow-list always
//! matches everything and the statements stay static.

use alloy_primitives::{Address, keccak256};
use sqlx::{PgConnection, PgPool};
use supernode_types::{Gap, contiguous_ranges};
use supernode_types::eth::{
    CidWrapper, HeaderModel, ReceiptFilter, ReceiptModel, StateFilter, StateNodeModel,
    StorageFilter, StorageNodeWithStateKeyModel, SubscriptionSettings, TxFilter, TxModel,
    UncleModel,
};

use crate::EthError;

/// Retrieves the CIDs and row models matching a subscription filter.
#[derive(Debug, Clone)]
pub struct CidRetriever {
    pool: PgPool,
}

impl CidRetriever {
    /// Creates a retriever reading through the given pool.
    pub fn new(pool: &PgPool) -> Self {
        Self { pool: pool.clone() }
    }

    /// The lowest indexed block height.
    pub async fn first_block_number(&self) -> Result<i64, EthError> {
        let (number,): (i64,) = sqlx::query_as(
            "SELECT block_number::BIGINT FROM eth.header_cids ORDER BY block_number::NUMERIC ASC LIMIT 1",
        )
        .fetch_one(&self.pool)
        .await?;
        Ok(number)
    }

    /// The highest indexed block height.
    pub async fn last_block_number(&self) -> Result<i64, EthError> {
        let (number,): (i64,) = sqlx::query_as(
            "SELECT block_number::BIGINT FROM eth.header_cids ORDER BY block_number::NUMERIC DESC LIMIT 1",
        )
        .fetch_one(&self.pool)
        .await?;
        Ok(number)
    }

    /// Retrieves the rows matching `settings` at `block_number`: one
    /// [`CidWrapper`] per header at the height, plus an emptiness flag that
    /// is true when no object of any requested class matched.
    pub async fn retrieve(
        &self,
        settings: &SubscriptionSettings,
        block_number: i64,
    ) -> Result<(Vec<CidWrapper>, bool), EthError> {
        tracing::debug!(target: "eth::retriever", block_number, "Retrieving cids");
        let mut tx = self.pool.begin().await?;
        let headers = retrieve_headers(&mut *tx, block_number).await?;
        let mut wrappers = Vec::with_capacity(headers.len());
        let mut empty = true;
        for header in headers {
            let header_id = header.id;
            let mut wrapper = CidWrapper { block_number, ..Default::default() };
            if !settings.header_filter.off {
                empty = false;
                wrapper.header = header;
                if settings.header_filter.uncles {
                    wrapper.uncles = retrieve_uncles_by_header_id(&mut *tx, header_id).await?;
                }
            }
            if !settings.tx_filter.off {
                wrapper.transactions =
                    retrieve_tx_cids(&mut *tx, &settings.tx_filter, header_id).await?;
                if !wrapper.transactions.is_empty() {
                    empty = false;
                }
            }
            let tx_ids: Vec<i64> = wrapper.transactions.iter().map(|t| t.id).collect();
            if !settings.receipt_filter.off {
                wrapper.receipts =
                    retrieve_rct_cids(&mut *tx, &settings.receipt_filter, header_id, &tx_ids)
                        .await?;
                if !wrapper.receipts.is_empty() {
                    empty = false;
                }
            }
            if !settings.state_filter.off {
                wrapper.state_nodes =
                    retrieve_state_cids(&mut *tx, &settings.state_filter, header_id).await?;
                if !wrapper.state_nodes.is_empty() {
                    empty = false;
                }
            }
            if !settings.storage_filter.off {
                wrapper.storage_nodes =
                    retrieve_storage_cids(&mut *tx, &settings.storage_filter, header_id).await?;
                if !wrapper.storage_nodes.is_empty() {
                    empty = false;
                }
            }
            wrappers.push(wrapper);
        }
        tx.commit().await?;
        Ok((wrappers, empty))
    }

    /// Every CID needed to compose the block with the given hash.
    pub async fn retrieve_block_by_hash(
        &self,
        block_hash: &str,
    ) -> Result<(HeaderModel, Vec<UncleModel>, Vec<TxModel>, Vec<ReceiptModel>), EthError> {
        let mut tx = self.pool.begin().await?;
        let header: HeaderModel =
            sqlx::query_as("SELECT * FROM eth.header_cids WHERE block_hash = $1")
                .bind(block_hash)
                .fetch_one(&mut *tx)
                .await?;
        let parts = self.block_parts(&mut tx, header).await?;
        tx.commit().await?;
        Ok(parts)
    }

    /// Every CID needed to compose the block at the given height.
    pub async fn retrieve_block_by_number(
        &self,
        block_number: i64,
    ) -> Result<(HeaderModel, Vec<UncleModel>, Vec<TxModel>, Vec<ReceiptModel>), EthError> {
        let mut tx = self.pool.begin().await?;
        let mut headers = retrieve_headers(&mut *tx, block_number).await?;
        if headers.is_empty() {
            return Err(EthError::MissingBlock(block_number));
        }
        let parts = self.block_parts(&mut tx, headers.swap_remove(0)).await?;
        tx.commit().await?;
        Ok(parts)
    }

    async fn block_parts(
        &self,
        tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
        header: HeaderModel,
    ) -> Result<(HeaderModel, Vec<UncleModel>, Vec<TxModel>, Vec<ReceiptModel>), EthError> {
        let uncles = retrieve_uncles_by_header_id(&mut **tx, header.id).await?;
        let transactions: Vec<TxModel> = sqlx::query_as(
            "SELECT * FROM eth.transaction_cids WHERE header_id = $1 ORDER BY index",
        )
        .bind(header.id)
        .fetch_all(&mut **tx)
        .await?;
        let tx_ids: Vec<i64> = transactions.iter().map(|t| t.id).collect();
        let receipts: Vec<ReceiptModel> = sqlx::query_as(
            "SELECT receipt_cids.* FROM eth.receipt_cids
             INNER JOIN eth.transaction_cids ON receipt_cids.tx_id = transaction_cids.id
             WHERE receipt_cids.tx_id = ANY($1)
             ORDER BY transaction_cids.index",
        )
        .bind(&tx_ids)
        .fetch_all(&mut **tx)
        .await?;
        Ok((header, uncles, transactions, receipts))
    }

    /// Interior gaps in the indexed height range, unioned with contiguous
    /// runs of blocks whose `times_validated` is below `validation_level`.
    /// The two sets never overlap.
    pub async fn retrieve_gaps(&self, validation_level: i64) -> Result<Vec<Gap>, EthError> {
        let rows: Vec<(i64, i64)> = sqlx::query_as(
            "SELECT header_cids.block_number::BIGINT + 1 AS start, MIN(fr.block_number::BIGINT) - 1 AS stop
             FROM eth.header_cids
             LEFT JOIN eth.header_cids r ON header_cids.block_number::NUMERIC = r.block_number::NUMERIC - 1
             LEFT JOIN eth.header_cids fr ON header_cids.block_number::NUMERIC < fr.block_number::NUMERIC
             WHERE r.block_number IS NULL AND fr.block_number IS NOT NULL
             GROUP BY header_cids.block_number, r.block_number",
        )
        .fetch_all(&self.pool)
        .await?;
        let mut gaps: Vec<Gap> =
            rows.into_iter().map(|(start, stop)| Gap { start: start as u64, stop: stop as u64 }).collect();

        let heights: Vec<(i64,)> = sqlx::query_as(
            "SELECT block_number::BIGINT FROM eth.header_cids
             WHERE times_validated < $1
             ORDER BY block_number::NUMERIC",
        )
        .bind(validation_level)
        .fetch_all(&self.pool)
        .await?;
        let heights: Vec<u64> = heights.into_iter().map(|(h,)| h as u64).collect();
        gaps.extend(contiguous_ranges(&heights));
        Ok(gaps)
    }
}

pub(crate) async fn retrieve_headers(
    conn: &mut PgConnection,
    block_number: i64,
) -> Result<Vec<HeaderModel>, EthError> {
    Ok(sqlx::query_as("SELECT * FROM eth.header_cids WHERE block_number::NUMERIC = $1")
        .bind(block_number)
        .fetch_all(conn)
        .await?)
}

pub(crate) async fn retrieve_uncles_by_header_id(
    conn: &mut PgConnection,
    header_id: i64,
) -> Result<Vec<UncleModel>, EthError> {
    Ok(sqlx::query_as("SELECT * FROM eth.uncle_cids WHERE header_id = $1")
        .bind(header_id)
        .fetch_all(conn)
        .await?)
}

async fn retrieve_tx_cids(
    conn: &mut PgConnection,
    filter: &TxFilter,
    header_id: i64,
) -> Result<Vec<TxModel>, EthError> {
    Ok(sqlx::query_as(
        "SELECT * FROM eth.transaction_cids
         WHERE header_id = $1
         AND (cardinality($2::VARCHAR(66)[]) = 0 OR dst = ANY($2))
         AND (cardinality($3::VARCHAR(66)[]) = 0 OR src = ANY($3))
         ORDER BY index",
    )
    .bind(header_id)
    .bind(&filter.dst)
    .bind(&filter.src)
    .fetch_all(conn)
    .await?)
}

/// A receipt matches when it passes the log-contract and per-position topic
/// constraints together, or when `match_txs` is set and its transaction was
/// matched by the tx filter.
async fn retrieve_rct_cids(
    conn: &mut PgConnection,
    filter: &ReceiptFilter,
    header_id: i64,
    tx_ids: &[i64],
) -> Result<Vec<ReceiptModel>, EthError> {
    Ok(sqlx::query_as(
        "SELECT receipt_cids.* FROM eth.receipt_cids
         INNER JOIN eth.transaction_cids ON receipt_cids.tx_id = transaction_cids.id
         WHERE transaction_cids.header_id = $1
         AND (
             (
                 (cardinality($2::VARCHAR(66)[]) = 0 OR receipt_cids.log_contracts && $2)
                 AND (cardinality($3::VARCHAR(66)[]) = 0 OR receipt_cids.topic0s && $3)
                 AND (cardinality($4::VARCHAR(66)[]) = 0 OR receipt_cids.topic1s && $4)
                 AND (cardinality($5::VARCHAR(66)[]) = 0 OR receipt_cids.topic2s && $5)
                 AND (cardinality($6::VARCHAR(66)[]) = 0 OR receipt_cids.topic3s && $6)
             )
             OR ($7 AND receipt_cids.tx_id = ANY($8::BIGINT[]))
         )
         ORDER BY transaction_cids.index",
    )
    .bind(header_id)
    .bind(&filter.log_addresses)
    .bind(&filter.topics[0])
    .bind(&filter.topics[1])
    .bind(&filter.topics[2])
    .bind(&filter.topics[3])
    .bind(filter.match_txs && !tx_ids.is_empty())
    .bind(tx_ids)
    .fetch_all(conn)
    .await?)
}

async fn retrieve_state_cids(
    conn: &mut PgConnection,
    filter: &StateFilter,
    header_id: i64,
) -> Result<Vec<StateNodeModel>, EthError> {
    let leaf_keys = address_leaf_keys(&filter.addresses)?;
    Ok(sqlx::query_as(
        "SELECT * FROM eth.state_cids
         WHERE header_id = $1
         AND (cardinality($2::VARCHAR(66)[]) = 0 OR state_leaf_key = ANY($2))
         AND ($3 OR node_type = 2)",
    )
    .bind(header_id)
    .bind(&leaf_keys)
    .bind(filter.intermediate_nodes)
    .fetch_all(conn)
    .await?)
}

async fn retrieve_storage_cids(
    conn: &mut PgConnection,
    filter: &StorageFilter,
    header_id: i64,
) -> Result<Vec<StorageNodeWithStateKeyModel>, EthError> {
    let state_leaf_keys = address_leaf_keys(&filter.addresses)?;
    Ok(sqlx::query_as(
        "SELECT storage_cids.id, storage_cids.state_id, storage_cids.storage_leaf_key,
                storage_cids.node_type, storage_cids.cid, storage_cids.storage_path,
                state_cids.state_leaf_key
         FROM eth.storage_cids
         INNER JOIN eth.state_cids ON storage_cids.state_id = state_cids.id
         WHERE state_cids.header_id = $1
         AND (cardinality($2::VARCHAR(66)[]) = 0 OR state_cids.state_leaf_key = ANY($2))
         AND (cardinality($3::VARCHAR(66)[]) = 0 OR storage_cids.storage_leaf_key = ANY($3))
         AND ($4 OR storage_cids.node_type = 2)",
    )
    .bind(header_id)
    .bind(&state_leaf_keys)
    .bind(&filter.storage_keys)
    .bind(filter.intermediate_nodes)
    .fetch_all(conn)
    .await?)
}

/// Hashes filter addresses into the state leaf keys the schema stores.
fn address_leaf_keys(addresses: &[String]) -> Result<Vec<String>, EthError> {
    addresses
        .iter()
        .map(|addr| {
            let address: Address = addr.parse()?;
            Ok(keccak256(address.as_slice()).to_string())
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filter_addresses_hash_to_leaf_keys() {
        let keys =
            address_leaf_keys(&["0x0000000000000000000000000000000000000001".to_string()])
                .unwrap();
        assert_eq!(keys.len(), 1);
        assert!(keys[0].starts_with("0x"));
        assert_eq!(keys[0].len(), 66);
    }

    #[test]
    fn invalid_filter_address_is_rejected() {
        assert!(address_leaf_keys(&["not-an-address".to_string()]).is_err());
    }
}
