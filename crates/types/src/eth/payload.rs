//! In-flight Ethereum payload shapes: the raw statediff payload handed in by
//! the streamer, the converter's normalized output, and the assembled IPLD
//! response returned to subscribers.

use std::collections::HashMap;

use alloy_consensus::{Block, ReceiptEnvelope, TxEnvelope};
use alloy_primitives::{B256, Bytes, U256};
use alloy_rlp::{RlpDecodable, RlpEncodable};
use serde::{Deserialize, Serialize};

use super::{ReceiptModel, TxModel};
use crate::IpldBlock;

/// Raw per-block payload streamed from an Ethereum statediff service.
///
/// This is the chain-specific `RawChainData` shape for Ethereum: three opaque
/// RLP buffers plus the chain total difficulty at the block.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StateDiffPayload {
    /// RLP-encoded block (header + body).
    pub block_rlp: Bytes,
    /// RLP-encoded receipt list for the block.
    pub receipts_rlp: Bytes,
    /// RLP-encoded [`StateDiff`] for the block.
    pub state_diff_rlp: Bytes,
    /// Total difficulty of the chain at this block.
    pub total_difficulty: U256,
}

/// The structural type of a Merkle-Patricia trie node in a state diff.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NodeType {
    /// A 17-element branch node.
    Branch,
    /// An extension node.
    Extension,
    /// A leaf node carrying an account or storage value.
    Leaf,
    /// A node deleted by this diff.
    Removed,
    /// Anything the diff producer emitted that we do not recognize.
    Unknown,
}

impl NodeType {
    /// Small-integer encoding used in the relational schema.
    pub const fn as_int(&self) -> i32 {
        match self {
            Self::Branch => 0,
            Self::Extension => 1,
            Self::Leaf => 2,
            Self::Removed => 3,
            Self::Unknown => -1,
        }
    }

    /// Inverse of [`Self::as_int`].
    pub const fn from_int(i: i32) -> Self {
        match i {
            0 => Self::Branch,
            1 => Self::Extension,
            2 => Self::Leaf,
            3 => Self::Removed,
            _ => Self::Unknown,
        }
    }
}

impl From<u8> for NodeType {
    fn from(value: u8) -> Self {
        Self::from_int(value as i32)
    }
}

/// Decoded form of the statediff service's per-block state diff object.
#[derive(Debug, Clone, Default, PartialEq, Eq, RlpEncodable, RlpDecodable)]
pub struct StateDiff {
    /// Height the diff was taken at.
    pub block_number: u64,
    /// Hash of the block the diff was taken at.
    pub block_hash: B256,
    /// Accounts created in this block.
    pub created_accounts: Vec<AccountDiff>,
    /// Accounts deleted in this block.
    pub deleted_accounts: Vec<AccountDiff>,
    /// Accounts updated in this block.
    pub updated_accounts: Vec<AccountDiff>,
}

/// One touched state-trie node plus the storage-trie nodes under it.
#[derive(Debug, Clone, Default, PartialEq, Eq, RlpEncodable, RlpDecodable)]
pub struct AccountDiff {
    /// Raw trie path of the node. Unique per block; the identity key.
    pub path: Bytes,
    /// [`NodeType`] small-int encoding.
    pub node_type: u8,
    /// Keccak hash of the account address; zero for non-leaf nodes.
    pub leaf_key: B256,
    /// The node's RLP value.
    pub node_value: Bytes,
    /// Storage-trie diffs under this account.
    pub storage: Vec<StorageDiff>,
}

/// One touched storage-trie node.
#[derive(Debug, Clone, Default, PartialEq, Eq, RlpEncodable, RlpDecodable)]
pub struct StorageDiff {
    /// Raw trie path of the node.
    pub path: Bytes,
    /// [`NodeType`] small-int encoding.
    pub node_type: u8,
    /// Keccak hash of the storage slot; zero for non-leaf nodes.
    pub leaf_key: B256,
    /// The node's RLP value.
    pub node_value: Bytes,
}

/// A normalized trie node carried through conversion and publishing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TrieNode {
    /// Raw trie path; the identity key within a block.
    pub path: Vec<u8>,
    /// Keccak hash of the account address or storage slot; zero when the
    /// node is not a leaf.
    pub leaf_key: B256,
    /// Structural node type.
    pub node_type: NodeType,
    /// The node's RLP value bytes.
    pub value: Vec<u8>,
}

impl Default for NodeType {
    fn default() -> Self {
        Self::Unknown
    }
}

/// Fully decoded, normalized representation of one Ethereum block's content.
///
/// Produced by the converter, consumed by the publisher and the streaming
/// filterer. Derived fields (senders, recipients, topics, node types) are
/// computed exactly once, here.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConvertedPayload {
    /// Total difficulty at this block.
    pub total_difficulty: U256,
    /// The decoded block.
    pub block: Block<TxEnvelope>,
    /// Per-transaction metadata, index-aligned with the block body.
    pub tx_meta: Vec<TxModel>,
    /// Decoded receipts, index-aligned with the transactions.
    pub receipts: Vec<ReceiptEnvelope>,
    /// Per-receipt metadata, index-aligned with `receipts`.
    pub receipt_meta: Vec<ReceiptModel>,
    /// State-trie nodes touched in this block, in diff order.
    pub state_nodes: Vec<TrieNode>,
    /// Storage-trie nodes grouped by keccak hash of the owning state node's
    /// path.
    pub storage_nodes: HashMap<B256, Vec<TrieNode>>,
}

impl ConvertedPayload {
    /// Height of the converted block.
    pub const fn block_number(&self) -> u64 {
        self.block.header.number
    }
}

/// A state-trie node in an assembled response.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateNode {
    /// Keccak hash of the account the node belongs to (zero if interior).
    pub state_leaf_key: B256,
    /// Structural node type.
    pub node_type: NodeType,
    /// The node bytes plus CID.
    pub ipld: IpldBlock,
}

/// A storage-trie node in an assembled response, tagged with the state leaf
/// it lives under.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageNode {
    /// Keccak hash of the owning account.
    pub state_leaf_key: B256,
    /// Keccak hash of the storage slot (zero if interior).
    pub storage_leaf_key: B256,
    /// Structural node type.
    pub node_type: NodeType,
    /// The node bytes plus CID.
    pub ipld: IpldBlock,
}

/// The assembled per-block response streamed to a subscriber or returned to
/// an API caller: only the objects that matched the filter, tagged with their
/// CIDs.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Iplds {
    /// Height the response was assembled for.
    pub block_number: u64,
    /// Total difficulty at the block.
    pub total_difficulty: U256,
    /// The header object, if the header filter is on.
    pub header: Option<IpldBlock>,
    /// Matching uncle headers.
    pub uncles: Vec<IpldBlock>,
    /// Matching transactions.
    pub transactions: Vec<IpldBlock>,
    /// Matching receipts.
    pub receipts: Vec<IpldBlock>,
    /// Matching state-trie nodes.
    pub state_nodes: Vec<StateNode>,
    /// Matching storage-trie nodes.
    pub storage_nodes: Vec<StorageNode>,
}

impl Iplds {
    /// True when no object of any class matched.
    pub fn is_empty(&self) -> bool {
        self.header.is_none()
            && self.uncles.is_empty()
            && self.transactions.is_empty()
            && self.receipts.is_empty()
            && self.state_nodes.is_empty()
            && self.storage_nodes.is_empty()
    }
}
