//! Row models for the `btc.*` schema.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// One row of `btc.header_cids`. Unique on (block_number, block_hash).
#[derive(Debug, Clone, Default, PartialEq, Eq, FromRow, Serialize, Deserialize)]
pub struct HeaderModel {
    /// Surrogate key.
    #[sqlx(default)]
    pub id: i64,
    /// Block height as a decimal string.
    pub block_number: String,
    /// Block hash hex.
    pub block_hash: String,
    /// Previous block hash hex.
    pub parent_hash: String,
    /// CID of the header IPLD.
    pub cid: String,
    /// Owning node identifier.
    #[sqlx(default)]
    pub node_id: i64,
    /// Block timestamp (seconds).
    pub timestamp: i64,
    /// Compact difficulty target.
    pub bits: i64,
    /// Incremented every time this block is re-indexed.
    #[sqlx(default)]
    pub times_validated: i64,
}

/// One row of `btc.transaction_cids`. Unique on (tx_hash), so input rows can
/// resolve their outpoint transaction by hash alone.
#[derive(Debug, Clone, Default, PartialEq, Eq, FromRow, Serialize, Deserialize)]
pub struct TxModel {
    /// Surrogate key.
    #[sqlx(default)]
    pub id: i64,
    /// Owning header row.
    #[sqlx(default)]
    pub header_id: i64,
    /// Position of the transaction in the block.
    pub index: i64,
    /// Transaction id (hash) hex.
    pub tx_hash: String,
    /// CID of the transaction IPLD.
    pub cid: String,
    /// Whether the transaction carries segwit data.
    pub segwit: bool,
    /// Witness transaction id hex.
    pub witness_hash: String,
}

/// A transaction row together with its inputs and outputs, as carried
/// through conversion and publishing (the relational ids do not exist yet).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TxModelWithInsAndOuts {
    /// Position of the transaction in the block.
    pub index: i64,
    /// Transaction id hex.
    pub tx_hash: String,
    /// CID of the transaction IPLD (filled by the publisher).
    pub cid: String,
    /// Whether the transaction carries segwit data.
    pub segwit: bool,
    /// Witness transaction id hex.
    pub witness_hash: String,
    /// The transaction's inputs, in order.
    pub tx_inputs: Vec<TxInput>,
    /// The transaction's outputs, in order.
    pub tx_outputs: Vec<TxOutput>,
}

/// One row of `btc.tx_inputs`. Unique on (tx_id, index).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxInput {
    /// Position of the input within its transaction.
    pub index: i64,
    /// Witness items, hex encoded.
    pub tx_witness: Vec<String>,
    /// Signature script bytes.
    pub sig_script: Vec<u8>,
    /// Txid of the transaction whose output this input spends. Resolved to
    /// a `transaction_cids` row id at indexing time.
    pub previous_outpoint_hash: String,
    /// Output index within the referenced transaction.
    pub previous_outpoint_index: i64,
}

/// One row of `btc.tx_outputs`. Unique on (tx_id, index).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxOutput {
    /// Position of the output within its transaction.
    pub index: i64,
    /// Output value in satoshis.
    pub value: i64,
    /// The locking script bytes.
    pub pk_script: Vec<u8>,
    /// Script class small-int encoding (see the converter).
    pub script_class: i32,
    /// Addresses encoded in the locking script, if standard.
    pub addresses: Vec<String>,
    /// Number of signatures the script requires.
    pub required_sigs: i32,
}

/// All CIDs plus metadata for one published Bitcoin block.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CidPayload {
    /// Header row to upsert.
    pub header: HeaderModel,
    /// Transaction rows (with inputs/outputs) to upsert, in block order.
    pub transactions: Vec<TxModelWithInsAndOuts>,
}

/// The row models matching a retrieval filter at one block.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CidWrapper {
    /// Height the wrapper was retrieved for.
    pub block_number: i64,
    /// Matched headers at the height.
    pub headers: Vec<HeaderModel>,
    /// Matched transactions.
    pub transactions: Vec<TxModel>,
}

impl CidWrapper {
    /// True when nothing matched.
    pub const fn is_empty(&self) -> bool {
        self.headers.is_empty() && self.transactions.is_empty()
    }
}
