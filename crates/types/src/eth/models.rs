//! Row models for the `eth.*` schema.
//!
//! Each model maps one-to-one onto a relational table; the tables are purely
//! an index into the shared `public.blocks` blockstore, keyed by CID.

use std::collections::HashMap;

use alloy_primitives::B256;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// One row of `eth.header_cids`. Unique on (block_number, block_hash).
#[derive(Debug, Clone, Default, PartialEq, Eq, FromRow, Serialize, Deserialize)]
pub struct HeaderModel {
    /// Surrogate key.
    #[sqlx(default)]
    pub id: i64,
    /// Block height as a decimal string (arbitrary precision).
    pub block_number: String,
    /// Block hash, 0x-prefixed hex.
    pub block_hash: String,
    /// Parent block hash.
    pub parent_hash: String,
    /// CID of the header IPLD.
    pub cid: String,
    /// Total difficulty as a decimal string.
    pub td: String,
    /// Owning node identifier (`public.nodes` row).
    #[sqlx(default)]
    pub node_id: i64,
    /// Computed miner reward as a decimal wei string.
    pub reward: String,
    /// State root hash.
    pub state_root: String,
    /// Transactions root hash.
    pub tx_root: String,
    /// Receipts root hash.
    pub receipt_root: String,
    /// Uncles root hash.
    pub uncle_root: String,
    /// Logs bloom bytes.
    pub bloom: Vec<u8>,
    /// Block timestamp (seconds).
    pub timestamp: i64,
    /// Incremented every time this block is re-indexed.
    #[sqlx(default)]
    pub times_validated: i64,
}

/// One row of `eth.uncle_cids`. Unique on (header_id, block_hash).
#[derive(Debug, Clone, Default, PartialEq, Eq, FromRow, Serialize, Deserialize)]
pub struct UncleModel {
    /// Surrogate key.
    #[sqlx(default)]
    pub id: i64,
    /// Owning header row.
    #[sqlx(default)]
    pub header_id: i64,
    /// Uncle block hash.
    pub block_hash: String,
    /// Uncle parent hash.
    pub parent_hash: String,
    /// CID of the uncle header IPLD.
    pub cid: String,
    /// Computed uncle miner reward as a decimal wei string.
    pub reward: String,
}

/// One row of `eth.transaction_cids`. Unique on (header_id, tx_hash).
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
    /// Transaction hash.
    pub tx_hash: String,
    /// CID of the transaction IPLD.
    pub cid: String,
    /// Recipient address, or the all-zero sentinel for contract creations.
    pub dst: String,
    /// Recovered sender address.
    pub src: String,
}

/// One row of `eth.receipt_cids`. Unique on tx_id.
#[derive(Debug, Clone, Default, PartialEq, Eq, FromRow, Serialize, Deserialize)]
pub struct ReceiptModel {
    /// Surrogate key.
    #[sqlx(default)]
    pub id: i64,
    /// Owning transaction row.
    #[sqlx(default)]
    pub tx_id: i64,
    /// CID of the receipt IPLD.
    pub cid: String,
    /// Contract address: the tx recipient, or the created contract address
    /// for contract-creation receipts.
    pub contract: String,
    /// Keccak hash of `contract`.
    pub contract_hash: String,
    /// Topic at position 0 of each log in the receipt.
    pub topic0s: Vec<String>,
    /// Topic at position 1 of each log that has one.
    pub topic1s: Vec<String>,
    /// Topic at position 2 of each log that has one.
    pub topic2s: Vec<String>,
    /// Topic at position 3 of each log that has one.
    pub topic3s: Vec<String>,
    /// Address of every log-emitting contract in the receipt.
    pub log_contracts: Vec<String>,
}

/// One row of `eth.state_cids`. Unique on (header_id, state_path).
#[derive(Debug, Clone, Default, PartialEq, Eq, FromRow, Serialize, Deserialize)]
pub struct StateNodeModel {
    /// Surrogate key.
    #[sqlx(default)]
    pub id: i64,
    /// Owning header row.
    #[sqlx(default)]
    pub header_id: i64,
    /// Keccak hash of the account address; null for non-leaf nodes.
    pub state_leaf_key: Option<String>,
    /// CID of the state-trie-node IPLD.
    pub cid: String,
    /// Raw trie path; the identity key within a header.
    pub state_path: Vec<u8>,
    /// [`NodeType`](super::NodeType) small-int encoding.
    pub node_type: i32,
}

/// One row of `eth.storage_cids`. Unique on (state_id, storage_path).
#[derive(Debug, Clone, Default, PartialEq, Eq, FromRow, Serialize, Deserialize)]
pub struct StorageNodeModel {
    /// Surrogate key.
    #[sqlx(default)]
    pub id: i64,
    /// Owning state-node row.
    #[sqlx(default)]
    pub state_id: i64,
    /// Keccak hash of the storage slot; null for non-leaf nodes.
    pub storage_leaf_key: Option<String>,
    /// CID of the storage-trie-node IPLD.
    pub cid: String,
    /// Raw trie path; the identity key within a state node.
    pub storage_path: Vec<u8>,
    /// [`NodeType`](super::NodeType) small-int encoding.
    pub node_type: i32,
}

/// A storage node joined with the leaf key of its owning state node, as
/// returned by the retriever (the fetcher needs the association).
#[derive(Debug, Clone, Default, PartialEq, Eq, FromRow, Serialize, Deserialize)]
pub struct StorageNodeWithStateKeyModel {
    /// Surrogate key.
    #[sqlx(default)]
    pub id: i64,
    /// Owning state-node row.
    #[sqlx(default)]
    pub state_id: i64,
    /// Keccak hash of the owning account address.
    pub state_leaf_key: Option<String>,
    /// Keccak hash of the storage slot; null for non-leaf nodes.
    pub storage_leaf_key: Option<String>,
    /// CID of the storage-trie-node IPLD.
    pub cid: String,
    /// Raw trie path.
    pub storage_path: Vec<u8>,
    /// Node type small-int encoding.
    pub node_type: i32,
}

/// One row of `eth.state_accounts`: the account decoded out of a state leaf.
/// One-to-one with its state node.
#[derive(Debug, Clone, Default, PartialEq, Eq, FromRow, Serialize, Deserialize)]
pub struct StateAccountModel {
    /// Surrogate key.
    #[sqlx(default)]
    pub id: i64,
    /// Owning state-node row.
    #[sqlx(default)]
    pub state_id: i64,
    /// Account balance as a decimal wei string.
    pub balance: String,
    /// Account nonce.
    pub nonce: i64,
    /// Account code hash bytes.
    pub code_hash: Vec<u8>,
    /// Storage trie root hash.
    pub storage_root: String,
}

/// All CIDs plus metadata for one published block, handed from the publisher
/// to the standalone indexer when the two run in separate processes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CidPayload {
    /// Header row to upsert.
    pub header: HeaderModel,
    /// Uncle rows to upsert.
    pub uncles: Vec<UncleModel>,
    /// Transaction rows to upsert, in block order.
    pub transactions: Vec<TxModel>,
    /// Receipt rows keyed by their transaction's hash.
    pub receipts: HashMap<B256, ReceiptModel>,
    /// State-node rows in diff order.
    pub state_nodes: Vec<StateNodeModel>,
    /// Decoded leaf accounts keyed by keccak(state path).
    pub state_accounts: HashMap<B256, StateAccountModel>,
    /// Storage-node rows keyed by keccak(owning state path).
    pub storage_nodes: HashMap<B256, Vec<StorageNodeModel>>,
}

/// The row models matching a retrieval filter at one block: CIDs only, no
/// content. Input to the IPLD fetchers.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CidWrapper {
    /// Height the wrapper was retrieved for.
    pub block_number: i64,
    /// The matched header.
    pub header: HeaderModel,
    /// Matched uncles.
    pub uncles: Vec<UncleModel>,
    /// Matched transactions, ordered by index.
    pub transactions: Vec<TxModel>,
    /// Matched receipts, ordered by their transaction's index.
    pub receipts: Vec<ReceiptModel>,
    /// Matched state nodes.
    pub state_nodes: Vec<StateNodeModel>,
    /// Matched storage nodes, tagged with their state leaf key.
    pub storage_nodes: Vec<StorageNodeWithStateKeyModel>,
}
