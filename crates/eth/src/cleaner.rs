//! Removal of indexed data and its backing blobs over height ranges.
//!
//! Deletes proceed child-first so that foreign keys never dangle mid
//! transaction: storage before state, receipts before transactions,
//! everything before headers. Blob rows in `public.blocks` carry no height
//! column, so the affected CIDs are selected first and their blockstore keys
//! derived before deleting by key.

use cid::Cid;
use sqlx::{PgConnection, PgPool};
use supernode_types::{DataKind, Gap};

use crate::EthError;

/// Deletes indexed eth data and the IPLD blobs it references.
#[derive(Debug, Clone)]
pub struct Cleaner {
    pool: PgPool,
}

impl Cleaner {
    /// Creates a cleaner over `pool`.
    pub fn new(pool: &PgPool) -> Self {
        Self { pool: pool.clone() }
    }

    /// Removes all data of the given kind in the given inclusive height
    /// ranges, then vacuums the touched tables.
    ///
    /// All ranges are processed in a single transaction; on any error
    /// nothing is removed.
    pub async fn clean(&self, ranges: &[Gap], kind: DataKind) -> Result<(), EthError> {
        let mut tx = self.pool.begin().await?;
        for range in ranges {
            self.clean_range(&mut *tx, range, kind).await?;
        }
        tx.commit().await?;
        tracing::info!(target: "eth::cleaner", ?ranges, ?kind, "cleaned height ranges");
        self.vacuum_analyze(kind).await
    }

    /// Marks every header in the given inclusive ranges as unvalidated so
    /// the resync service revisits them.
    pub async fn reset_validation(&self, ranges: &[Gap]) -> Result<(), EthError> {
        let mut tx = self.pool.begin().await?;
        for range in ranges {
            sqlx::query(
                "UPDATE eth.header_cids
                 SET times_validated = 0
                 WHERE block_number::NUMERIC BETWEEN $1 AND $2",
            )
            .bind(range.start as i64)
            .bind(range.stop as i64)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        tracing::debug!(target: "eth::cleaner", ?ranges, "reset validation counters");
        Ok(())
    }

    async fn clean_range(
        &self,
        conn: &mut PgConnection,
        range: &Gap,
        kind: DataKind,
    ) -> Result<(), EthError> {
        match kind {
            DataKind::Full | DataKind::Headers => self.clean_full(conn, range).await,
            DataKind::Uncles => {
                delete_uncle_blobs(conn, range).await?;
                delete_uncle_meta(conn, range).await
            }
            DataKind::Transactions => {
                delete_receipt_blobs(conn, range).await?;
                delete_transaction_blobs(conn, range).await?;
                // Receipt rows fall with their transactions via FK cascade.
                delete_transaction_meta(conn, range).await
            }
            DataKind::Receipts => {
                delete_receipt_blobs(conn, range).await?;
                delete_receipt_meta(conn, range).await
            }
            DataKind::State => {
                delete_storage_blobs(conn, range).await?;
                delete_state_blobs(conn, range).await?;
                delete_state_meta(conn, range).await
            }
            DataKind::Storage => {
                delete_storage_blobs(conn, range).await?;
                delete_storage_meta(conn, range).await
            }
        }
    }

    async fn clean_full(&self, conn: &mut PgConnection, range: &Gap) -> Result<(), EthError> {
        delete_storage_blobs(conn, range).await?;
        delete_state_blobs(conn, range).await?;
        delete_receipt_blobs(conn, range).await?;
        delete_transaction_blobs(conn, range).await?;
        delete_uncle_blobs(conn, range).await?;
        delete_header_blobs(conn, range).await?;
        // Header deletion cascades through every dependent meta table.
        sqlx::query(
            "DELETE FROM eth.header_cids
             WHERE block_number::NUMERIC BETWEEN $1 AND $2",
        )
        .bind(range.start as i64)
        .bind(range.stop as i64)
        .execute(&mut *conn)
        .await?;
        Ok(())
    }

    /// `VACUUM` cannot run inside a transaction, so this runs on the pool
    /// after the deleting transaction has committed.
    async fn vacuum_analyze(&self, kind: DataKind) -> Result<(), EthError> {
        let tables: &[&str] = match kind {
            DataKind::Full | DataKind::Headers => &[
                "eth.storage_cids",
                "eth.state_accounts",
                "eth.state_cids",
                "eth.receipt_cids",
                "eth.transaction_cids",
                "eth.uncle_cids",
                "eth.header_cids",
                "public.blocks",
            ],
            DataKind::Uncles => &["eth.uncle_cids", "public.blocks"],
            DataKind::Transactions => {
                &["eth.receipt_cids", "eth.transaction_cids", "public.blocks"]
            }
            DataKind::Receipts => &["eth.receipt_cids", "public.blocks"],
            DataKind::State => {
                &["eth.storage_cids", "eth.state_accounts", "eth.state_cids", "public.blocks"]
            }
            DataKind::Storage => &["eth.storage_cids", "public.blocks"],
        };
        for table in tables {
            sqlx::query(&format!("VACUUM ANALYZE {table}")).execute(&self.pool).await?;
        }
        Ok(())
    }
}

/// Deletes the blockstore rows behind a set of CIDs.
///
/// `public.blocks` is keyed by the base32 multihash key, not by CID string,
/// so each CID is re-derived into its key first.
async fn delete_blobs(conn: &mut PgConnection, cids: &[String]) -> Result<(), EthError> {
    if cids.is_empty() {
        return Ok(());
    }
    let mut keys = Vec::with_capacity(cids.len());
    for cid in cids {
        let cid: Cid = cid.parse()?;
        keys.push(supernode_ipld::blockstore_key(&cid));
    }
    sqlx::query("DELETE FROM public.blocks WHERE key = ANY($1)")
        .bind(&keys)
        .execute(conn)
        .await?;
    Ok(())
}

async fn delete_header_blobs(conn: &mut PgConnection, range: &Gap) -> Result<(), EthError> {
    let cids: Vec<String> = sqlx::query_scalar(
        "SELECT cid FROM eth.header_cids
         WHERE block_number::NUMERIC BETWEEN $1 AND $2",
    )
    .bind(range.start as i64)
    .bind(range.stop as i64)
    .fetch_all(&mut *conn)
    .await?;
    delete_blobs(conn, &cids).await
}

async fn delete_uncle_blobs(conn: &mut PgConnection, range: &Gap) -> Result<(), EthError> {
    let cids: Vec<String> = sqlx::query_scalar(
        "SELECT uncle_cids.cid FROM eth.uncle_cids
         INNER JOIN eth.header_cids ON (uncle_cids.header_id = header_cids.id)
         WHERE header_cids.block_number::NUMERIC BETWEEN $1 AND $2",
    )
    .bind(range.start as i64)
    .bind(range.stop as i64)
    .fetch_all(&mut *conn)
    .await?;
    delete_blobs(conn, &cids).await
}

async fn delete_transaction_blobs(conn: &mut PgConnection, range: &Gap) -> Result<(), EthError> {
    let cids: Vec<String> = sqlx::query_scalar(
        "SELECT transaction_cids.cid FROM eth.transaction_cids
         INNER JOIN eth.header_cids ON (transaction_cids.header_id = header_cids.id)
         WHERE header_cids.block_number::NUMERIC BETWEEN $1 AND $2",
    )
    .bind(range.start as i64)
    .bind(range.stop as i64)
    .fetch_all(&mut *conn)
    .await?;
    delete_blobs(conn, &cids).await
}

async fn delete_receipt_blobs(conn: &mut PgConnection, range: &Gap) -> Result<(), EthError> {
    let cids: Vec<String> = sqlx::query_scalar(
        "SELECT receipt_cids.cid FROM eth.receipt_cids
         INNER JOIN eth.transaction_cids ON (receipt_cids.tx_id = transaction_cids.id)
         INNER JOIN eth.header_cids ON (transaction_cids.header_id = header_cids.id)
         WHERE header_cids.block_number::NUMERIC BETWEEN $1 AND $2",
    )
    .bind(range.start as i64)
    .bind(range.stop as i64)
    .fetch_all(&mut *conn)
    .await?;
    delete_blobs(conn, &cids).await
}

async fn delete_state_blobs(conn: &mut PgConnection, range: &Gap) -> Result<(), EthError> {
    let cids: Vec<String> = sqlx::query_scalar(
        "SELECT state_cids.cid FROM eth.state_cids
         INNER JOIN eth.header_cids ON (state_cids.header_id = header_cids.id)
         WHERE header_cids.block_number::NUMERIC BETWEEN $1 AND $2",
    )
    .bind(range.start as i64)
    .bind(range.stop as i64)
    .fetch_all(&mut *conn)
    .await?;
    delete_blobs(conn, &cids).await
}

async fn delete_storage_blobs(conn: &mut PgConnection, range: &Gap) -> Result<(), EthError> {
    let cids: Vec<String> = sqlx::query_scalar(
        "SELECT storage_cids.cid FROM eth.storage_cids
         INNER JOIN eth.state_cids ON (storage_cids.state_id = state_cids.id)
         INNER JOIN eth.header_cids ON (state_cids.header_id = header_cids.id)
         WHERE header_cids.block_number::NUMERIC BETWEEN $1 AND $2",
    )
    .bind(range.start as i64)
    .bind(range.stop as i64)
    .fetch_all(&mut *conn)
    .await?;
    delete_blobs(conn, &cids).await
}

async fn delete_uncle_meta(conn: &mut PgConnection, range: &Gap) -> Result<(), EthError> {
    sqlx::query(
        "DELETE FROM eth.uncle_cids
         USING eth.header_cids
         WHERE uncle_cids.header_id = header_cids.id
         AND header_cids.block_number::NUMERIC BETWEEN $1 AND $2",
    )
    .bind(range.start as i64)
    .bind(range.stop as i64)
    .execute(conn)
    .await?;
    Ok(())
}

async fn delete_transaction_meta(conn: &mut PgConnection, range: &Gap) -> Result<(), EthError> {
    sqlx::query(
        "DELETE FROM eth.transaction_cids
         USING eth.header_cids
         WHERE transaction_cids.header_id = header_cids.id
         AND header_cids.block_number::NUMERIC BETWEEN $1 AND $2",
    )
    .bind(range.start as i64)
    .bind(range.stop as i64)
    .execute(conn)
    .await?;
    Ok(())
}

async fn delete_receipt_meta(conn: &mut PgConnection, range: &Gap) -> Result<(), EthError> {
    sqlx::query(
        "DELETE FROM eth.receipt_cids
         USING eth.transaction_cids, eth.header_cids
         WHERE receipt_cids.tx_id = transaction_cids.id
         AND transaction_cids.header_id = header_cids.id
         AND header_cids.block_number::NUMERIC BETWEEN $1 AND $2",
    )
    .bind(range.start as i64)
    .bind(range.stop as i64)
    .execute(conn)
    .await?;
    Ok(())
}

async fn delete_state_meta(conn: &mut PgConnection, range: &Gap) -> Result<(), EthError> {
    sqlx::query(
        "DELETE FROM eth.state_cids
         USING eth.header_cids
         WHERE state_cids.header_id = header_cids.id
         AND header_cids.block_number::NUMERIC BETWEEN $1 AND $2",
    )
    .bind(range.start as i64)
    .bind(range.stop as i64)
    .execute(conn)
    .await?;
    Ok(())
}

async fn delete_storage_meta(conn: &mut PgConnection, range: &Gap) -> Result<(), EthError> {
    sqlx::query(
        "DELETE FROM eth.storage_cids
         USING eth.state_cids, eth.header_cids
         WHERE storage_cids.state_id = state_cids.id
         AND state_cids.header_id = header_cids.id
         AND header_cids.block_number::NUMERIC BETWEEN $1 AND $2",
    )
    .bind(range.start as i64)
    .bind(range.stop as i64)
    .execute(conn)
    .await?;
    Ok(())
}
