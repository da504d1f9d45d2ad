//! Ethereum payload, model, and filter types.

mod payload;
pub use payload::{
    AccountDiff, ConvertedPayload, Iplds, NodeType, StateDiff, StateDiffPayload, StateNode,
    StorageDiff, StorageNode, TrieNode,
};

mod models;
pub use models::{
    CidPayload, CidWrapper, HeaderModel, ReceiptModel, StateAccountModel, StateNodeModel,
    StorageNodeModel, StorageNodeWithStateKeyModel, TxModel, UncleModel,
};

mod filter;
pub use filter::{
    HeaderFilter, ReceiptFilter, StateFilter, StorageFilter, SubscriptionSettings, TxFilter,
};

/// Sentinel written to `transaction_cids.dst` when a transaction has no
/// recipient, i.e. is a contract creation.
pub const NULL_ADDRESS_SENTINEL: &str =
    "0x0000000000000000000000000000000000000000000000000000000000000000";
