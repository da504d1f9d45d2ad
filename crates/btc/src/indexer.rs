//! Upserts of `btc.*` index rows.
//!
//! Transaction hashes are globally unique in the schema so that inputs can
//! resolve the transaction row of the outpoint they spend. A coinbase
//! input's all-zero outpoint hash maps to a NULL reference; any other
//! unresolvable outpoint is a referential-integrity error.

use sqlx::{PgConnection, PgPool};
use supernode_types::btc::{CidPayload, HeaderModel, TxInput, TxModelWithInsAndOuts, TxOutput};

use crate::BtcError;

/// Standalone indexer for a pre-published [`CidPayload`].
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
    pub async fn index(&self, cids: &CidPayload) -> Result<(), BtcError> {
        let mut tx = self.pool.begin().await?;
        let header_id = index_header(&mut *tx, &cids.header, self.node_id).await?;
        for tx_model in &cids.transactions {
            index_transaction_with_ins_and_outs(&mut *tx, tx_model, header_id).await?;
        }
        tx.commit().await?;
        tracing::debug!(
            target: "btc::indexer",
            block_number = %cids.header.block_number,
            txs = cids.transactions.len(),
            "Indexed block cids"
        );
        Ok(())
    }
}

pub(crate) async fn index_header(
    conn: &mut PgConnection,
    header: &HeaderModel,
    node_id: i64,
) -> Result<i64, BtcError> {
    let (id,): (i64,) = sqlx::query_as(
        "INSERT INTO btc.header_cids (block_number, block_hash, parent_hash, cid, node_id, timestamp, bits, times_validated)
         VALUES ($1, $2, $3, $4, $5, $6, $7, 1)
         ON CONFLICT (block_number, block_hash) DO UPDATE
         SET (parent_hash, cid, node_id, timestamp, bits, times_validated) =
             ($3, $4, $5, $6, $7, btc.header_cids.times_validated + 1)
         RETURNING id",
    )
    .bind(&header.block_number)
    .bind(&header.block_hash)
    .bind(&header.parent_hash)
    .bind(&header.cid)
    .bind(node_id)
    .bind(header.timestamp)
    .bind(header.bits)
    .fetch_one(conn)
    .await?;
    Ok(id)
}

pub(crate) async fn index_transaction_with_ins_and_outs(
    conn: &mut PgConnection,
    transaction: &TxModelWithInsAndOuts,
    header_id: i64,
) -> Result<i64, BtcError> {
    let (tx_id,): (i64,) = sqlx::query_as(
        "INSERT INTO btc.transaction_cids (header_id, index, tx_hash, cid, segwit, witness_hash)
         VALUES ($1, $2, $3, $4, $5, $6)
         ON CONFLICT (tx_hash) DO UPDATE
         SET (header_id, index, cid, segwit, witness_hash) = ($1, $2, $4, $5, $6)
         RETURNING id",
    )
    .bind(header_id)
    .bind(transaction.index)
    .bind(&transaction.tx_hash)
    .bind(&transaction.cid)
    .bind(transaction.segwit)
    .bind(&transaction.witness_hash)
    .fetch_one(&mut *conn)
    .await?;
    for input in &transaction.tx_inputs {
        index_tx_input(&mut *conn, input, tx_id).await?;
    }
    for output in &transaction.tx_outputs {
        index_tx_output(&mut *conn, output, tx_id).await?;
    }
    Ok(tx_id)
}

async fn index_tx_input(
    conn: &mut PgConnection,
    input: &TxInput,
    tx_id: i64,
) -> Result<(), BtcError> {
    let outpoint_tx_id = resolve_outpoint(&mut *conn, &input.previous_outpoint_hash).await?;
    sqlx::query(
        "INSERT INTO btc.tx_inputs (tx_id, index, witness, sig_script, outpoint_tx_id, outpoint_index)
         VALUES ($1, $2, $3, $4, $5, $6)
         ON CONFLICT (tx_id, index) DO UPDATE
         SET (witness, sig_script, outpoint_tx_id, outpoint_index) = ($3, $4, $5, $6)",
    )
    .bind(tx_id)
    .bind(input.index)
    .bind(&input.tx_witness)
    .bind(&input.sig_script)
    .bind(outpoint_tx_id)
    .bind(input.previous_outpoint_index)
    .execute(conn)
    .await?;
    Ok(())
}

async fn index_tx_output(
    conn: &mut PgConnection,
    output: &TxOutput,
    tx_id: i64,
) -> Result<(), BtcError> {
    sqlx::query(
        "INSERT INTO btc.tx_outputs (tx_id, index, value, pk_script, script_class, addresses, required_sigs)
         VALUES ($1, $2, $3, $4, $5, $6, $7)
         ON CONFLICT (tx_id, index) DO UPDATE
         SET (value, pk_script, script_class, addresses, required_sigs) = ($3, $4, $5, $6, $7)",
    )
    .bind(tx_id)
    .bind(output.index)
    .bind(output.value)
    .bind(&output.pk_script)
    .bind(output.script_class)
    .bind(&output.addresses)
    .bind(output.required_sigs)
    .execute(conn)
    .await?;
    Ok(())
}

/// Resolves an input's outpoint hash to the id of the transaction row it
/// spends. The coinbase sentinel (all-zero hash) resolves to `None`.
async fn resolve_outpoint(
    conn: &mut PgConnection,
    outpoint_hash: &str,
) -> Result<Option<i64>, BtcError> {
    if is_null_hash(outpoint_hash) {
        return Ok(None);
    }
    let row: Option<(i64,)> =
        sqlx::query_as("SELECT id FROM btc.transaction_cids WHERE tx_hash = $1")
            .bind(outpoint_hash)
            .fetch_optional(conn)
            .await?;
    match row {
        Some((id,)) => Ok(Some(id)),
        None => Err(BtcError::MissingOutpointTx { tx_hash: outpoint_hash.to_string() }),
    }
}

fn is_null_hash(hash: &str) -> bool {
    !hash.is_empty() && hash.chars().all(|c| c == '0')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn coinbase_outpoint_hash_is_null() {
        let coinbase = "0".repeat(64);
        assert!(is_null_hash(&coinbase));
        assert!(!is_null_hash("0a00000000000000000000000000000000000000000000000000000000000000"));
        assert!(!is_null_hash(""));
    }
}
