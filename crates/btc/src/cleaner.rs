//! Removal of indexed Bitcoin data and its backing blobs over height ranges.
//!
//! The Bitcoin schema only stores headers and transactions (with their
//! relational inputs and outputs), so only the `Full`, `Headers` and
//! `Transactions` data kinds apply here. Blob rows in `public.blocks` carry
//! no height column, so the affected CIDs are selected first and their
//! blockstore keys derived before deleting by key.

use cid::Cid;
use sqlx::{PgConnection, PgPool};
use supernode_types::{DataKind, Gap};

use crate::BtcError;

/// Deletes indexed btc data and the IPLD blobs it references.
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
    /// nothing is removed. Kinds with no Bitcoin counterpart are rejected.
    pub async fn clean(&self, ranges: &[Gap], kind: DataKind) -> Result<(), BtcError> {
        let mut tx = self.pool.begin().await?;
        for range in ranges {
            clean_range(&mut *tx, range, kind).await?;
        }
        tx.commit().await?;
        tracing::info!(target: "btc::cleaner", ?ranges, ?kind, "cleaned height ranges");
        self.vacuum_analyze(kind).await
    }

    /// Marks every header in the given inclusive ranges as unvalidated so
    /// the resync service revisits them.
    pub async fn reset_validation(&self, ranges: &[Gap]) -> Result<(), BtcError> {
        let mut tx = self.pool.begin().await?;
        for range in ranges {
            sqlx::query(
                "UPDATE btc.header_cids
                 SET times_validated = 0
                 WHERE block_number::NUMERIC BETWEEN $1 AND $2",
            )
            .bind(range.start as i64)
            .bind(range.stop as i64)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        tracing::debug!(target: "btc::cleaner", ?ranges, "reset validation counters");
        Ok(())
    }

    /// `VACUUM` cannot run inside a transaction, so this runs on the pool
    /// after the deleting transaction has committed.
    async fn vacuum_analyze(&self, kind: DataKind) -> Result<(), BtcError> {
        let tables: &[&str] = match kind {
            DataKind::Full | DataKind::Headers => &[
                "btc.tx_outputs",
                "btc.tx_inputs",
                "btc.transaction_cids",
                "btc.header_cids",
                "public.blocks",
            ],
            DataKind::Transactions => {
                &["btc.tx_outputs", "btc.tx_inputs", "btc.transaction_cids", "public.blocks"]
            }
            kind => return Err(BtcError::UnsupportedDataKind(kind)),
        };
        for table in tables {
            sqlx::query(&format!("VACUUM ANALYZE {table}")).execute(&self.pool).await?;
        }
        Ok(())
    }
}

async fn clean_range(
    conn: &mut PgConnection,
    range: &Gap,
    kind: DataKind,
) -> Result<(), BtcError> {
    match kind {
        DataKind::Full | DataKind::Headers => clean_full(conn, range).await,
        DataKind::Transactions => {
            delete_transaction_blobs(conn, range).await?;
            // Input and output rows fall with their transactions via FK
            // cascade.
            delete_transaction_meta(conn, range).await
        }
        kind => Err(BtcError::UnsupportedDataKind(kind)),
    }
}

async fn clean_full(conn: &mut PgConnection, range: &Gap) -> Result<(), BtcError> {
    delete_transaction_blobs(conn, range).await?;
    delete_header_blobs(conn, range).await?;
    // Header deletion cascades through every dependent meta table.
    sqlx::query(
        "DELETE FROM btc.header_cids
         WHERE block_number::NUMERIC BETWEEN $1 AND $2",
    )
    .bind(range.start as i64)
    .bind(range.stop as i64)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

/// Deletes the blockstore rows behind a set of CIDs.
///
/// `public.blocks` is keyed by the base32 multihash key, not by CID string,
/// so each CID is re-derived into its key first.
async fn delete_blobs(conn: &mut PgConnection, cids: &[String]) -> Result<(), BtcError> {
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

async fn delete_header_blobs(conn: &mut PgConnection, range: &Gap) -> Result<(), BtcError> {
    let cids: Vec<String> = sqlx::query_scalar(
        "SELECT cid FROM btc.header_cids
         WHERE block_number::NUMERIC BETWEEN $1 AND $2",
    )
    .bind(range.start as i64)
    .bind(range.stop as i64)
    .fetch_all(&mut *conn)
    .await?;
    delete_blobs(conn, &cids).await
}

async fn delete_transaction_blobs(conn: &mut PgConnection, range: &Gap) -> Result<(), BtcError> {
    let cids: Vec<String> = sqlx::query_scalar(
        "SELECT transaction_cids.cid FROM btc.transaction_cids
         INNER JOIN btc.header_cids ON (transaction_cids.header_id = header_cids.id)
         WHERE header_cids.block_number::NUMERIC BETWEEN $1 AND $2",
    )
    .bind(range.start as i64)
    .bind(range.stop as i64)
    .fetch_all(&mut *conn)
    .await?;
    delete_blobs(conn, &cids).await
}

async fn delete_transaction_meta(conn: &mut PgConnection, range: &Gap) -> Result<(), BtcError> {
    sqlx::query(
        "DELETE FROM btc.transaction_cids
         USING btc.header_cids
         WHERE transaction_cids.header_id = header_cids.id
         AND header_cids.block_number::NUMERIC BETWEEN $1 AND $2",
    )
    .bind(range.start as i64)
    .bind(range.stop as i64)
    .execute(conn)
    .await?;
    Ok(())
}
