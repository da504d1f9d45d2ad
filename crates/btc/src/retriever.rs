//! Filter-driven retrieval of `btc.*` index rows.
//!
//! Same SQL shape as the Ethereum retriever: every list-valued filter
//! dimension compiles to `cardinality($n) = 0 OR ...` so empty allow-lists
//! match everything. Output-level dimensions (multisig, addresses, script
//! classes) apply through `EXISTS` sub-queries, so a transaction does not
//! need indexed inputs or outputs just to be retrievable.

use sqlx::{PgConnection, PgPool};
use supernode_types::btc::{CidWrapper, HeaderModel, SubscriptionSettings, TxFilter, TxModel};
use supernode_types::{Gap, contiguous_ranges};

use crate::BtcError;

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
    pub async fn first_block_number(&self) -> Result<i64, BtcError> {
        let (number,): (i64,) = sqlx::query_as(
            "SELECT block_number::BIGINT FROM btc.header_cids ORDER BY block_number::NUMERIC ASC LIMIT 1",
        )
        .fetch_one(&self.pool)
        .await?;
        Ok(number)
    }

    /// The highest indexed block height.
    pub async fn last_block_number(&self) -> Result<i64, BtcError> {
        let (number,): (i64,) = sqlx::query_as(
            "SELECT block_number::BIGINT FROM btc.header_cids ORDER BY block_number::NUMERIC DESC LIMIT 1",
        )
        .fetch_one(&self.pool)
        .await?;
        Ok(number)
    }

    /// Retrieves the rows matching `settings` at `block_number`, plus an
    /// emptiness flag that is true when nothing matched.
    pub async fn retrieve(
        &self,
        settings: &SubscriptionSettings,
        block_number: i64,
    ) -> Result<(CidWrapper, bool), BtcError> {
        tracing::debug!(target: "btc::retriever", block_number, "Retrieving cids");
        let mut tx = self.pool.begin().await?;
        let mut wrapper = CidWrapper { block_number, ..Default::default() };
        if !settings.header_filter.off {
            wrapper.headers = retrieve_header_cids(&mut *tx, block_number).await?;
        }
        if !settings.tx_filter.off {
            wrapper.transactions =
                retrieve_tx_cids(&mut *tx, &settings.tx_filter, block_number).await?;
        }
        tx.commit().await?;
        let empty = wrapper.is_empty();
        Ok((wrapper, empty))
    }

    /// Every CID needed to compose the block with the given hash.
    pub async fn retrieve_block_by_hash(
        &self,
        block_hash: &str,
    ) -> Result<(HeaderModel, Vec<TxModel>), BtcError> {
        let mut tx = self.pool.begin().await?;
        let header: HeaderModel =
            sqlx::query_as("SELECT * FROM btc.header_cids WHERE block_hash = $1")
                .bind(block_hash)
                .fetch_one(&mut *tx)
                .await?;
        let transactions = retrieve_tx_cids_by_header_id(&mut *tx, header.id).await?;
        tx.commit().await?;
        Ok((header, transactions))
    }

    /// Every CID needed to compose the block at the given height.
    pub async fn retrieve_block_by_number(
        &self,
        block_number: i64,
    ) -> Result<(HeaderModel, Vec<TxModel>), BtcError> {
        let mut tx = self.pool.begin().await?;
        let headers = retrieve_header_cids(&mut *tx, block_number).await?;
        let Some(header) = headers.into_iter().next() else {
            return Err(BtcError::MissingBlock(block_number));
        };
        let transactions = retrieve_tx_cids_by_header_id(&mut *tx, header.id).await?;
        tx.commit().await?;
        Ok((header, transactions))
    }

    /// Interior height ranges with no indexed header, unioned with heights
    /// whose header has been validated fewer than `validation_level` times.
    pub async fn retrieve_gaps(&self, validation_level: i64) -> Result<Vec<Gap>, BtcError> {
        let rows: Vec<(i64, i64)> = sqlx::query_as(
            "SELECT header_cids.block_number::BIGINT + 1 AS start, MIN(fr.block_number::BIGINT) - 1 AS stop
             FROM btc.header_cids
             LEFT JOIN btc.header_cids r ON header_cids.block_number::NUMERIC = r.block_number::NUMERIC - 1
             LEFT JOIN btc.header_cids fr ON header_cids.block_number::NUMERIC < fr.block_number::NUMERIC
             WHERE r.block_number IS NULL AND fr.block_number IS NOT NULL
             GROUP BY header_cids.block_number, r.block_number",
        )
        .fetch_all(&self.pool)
        .await?;
        let mut gaps: Vec<Gap> =
            rows.into_iter().map(|(start, stop)| Gap { start: start as u64, stop: stop as u64 }).collect();
        let heights: Vec<(i64,)> = sqlx::query_as(
            "SELECT block_number::BIGINT FROM btc.header_cids
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

async fn retrieve_header_cids(
    conn: &mut PgConnection,
    block_number: i64,
) -> Result<Vec<HeaderModel>, BtcError> {
    Ok(sqlx::query_as("SELECT * FROM btc.header_cids WHERE block_number::NUMERIC = $1")
        .bind(block_number)
        .fetch_all(conn)
        .await?)
}

async fn retrieve_tx_cids(
    conn: &mut PgConnection,
    filter: &TxFilter,
    block_number: i64,
) -> Result<Vec<TxModel>, BtcError> {
    Ok(sqlx::query_as(
        "SELECT transaction_cids.id, transaction_cids.header_id, transaction_cids.index,
                transaction_cids.tx_hash, transaction_cids.cid, transaction_cids.segwit,
                transaction_cids.witness_hash
         FROM btc.transaction_cids
         INNER JOIN btc.header_cids ON (transaction_cids.header_id = header_cids.id)
         WHERE header_cids.block_number::NUMERIC = $1
         AND ($2 = false OR transaction_cids.segwit = true)
         AND (cardinality($3::VARCHAR(66)[]) = 0 OR transaction_cids.witness_hash = ANY($3))
         AND (cardinality($4::BIGINT[]) = 0 OR transaction_cids.index = ANY($4))
         AND ($5 = false OR EXISTS (
             SELECT 1 FROM btc.tx_outputs
             WHERE tx_outputs.tx_id = transaction_cids.id AND tx_outputs.required_sigs > 1))
         AND (cardinality($6::VARCHAR(66)[]) = 0 OR EXISTS (
             SELECT 1 FROM btc.tx_outputs
             WHERE tx_outputs.tx_id = transaction_cids.id AND tx_outputs.addresses && $6))
         AND (cardinality($7::INTEGER[]) = 0 OR EXISTS (
             SELECT 1 FROM btc.tx_outputs
             WHERE tx_outputs.tx_id = transaction_cids.id AND tx_outputs.script_class = ANY($7)))
         ORDER BY transaction_cids.index",
    )
    .bind(block_number)
    .bind(filter.segwit)
    .bind(&filter.witness_hashes)
    .bind(&filter.indexes)
    .bind(filter.multi_sig)
    .bind(&filter.addresses)
    .bind(&filter.pk_script_classes)
    .fetch_all(conn)
    .await?)
}

async fn retrieve_tx_cids_by_header_id(
    conn: &mut PgConnection,
    header_id: i64,
) -> Result<Vec<TxModel>, BtcError> {
    Ok(sqlx::query_as(
        "SELECT * FROM btc.transaction_cids WHERE header_id = $1 ORDER BY index",
    )
    .bind(header_id)
    .fetch_all(conn)
    .await?)
}
