//! Bitcoin payload, model, and filter types.
//!
//! The Bitcoin pipeline is a strict subset of the Ethereum one: headers and
//! transactions only, no receipts and no trie state.

mod payload;
pub use payload::{ConvertedPayload, Iplds, RawBlockPayload};

mod models;
pub use models::{
    CidPayload, CidWrapper, HeaderModel, TxInput, TxModel, TxModelWithInsAndOuts, TxOutput,
};

mod filter;
pub use filter::{HeaderFilter, SubscriptionSettings, TxFilter};
