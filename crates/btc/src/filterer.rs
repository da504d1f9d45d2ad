//! In-memory filtering of a converted Bitcoin payload against a
//! subscription.
//!
//! Applies the same semantics as the retriever's SQL to a payload that has
//! not been persisted: every constrained dimension must pass, every empty
//! allow-list passes everything.

use bitcoin::consensus::serialize;
use supernode_ipld::codec;
use supernode_types::IpldBlock;
use supernode_types::btc::{
    ConvertedPayload, Iplds, SubscriptionSettings, TxFilter, TxModelWithInsAndOuts,
};

use crate::BtcError;

/// Extracts the subset of `payload` matching `settings`, packaged with CIDs.
///
/// Returns an empty response when the block is outside the subscription's
/// `[start, end)` range.
pub fn filter_payload(
    settings: &SubscriptionSettings,
    payload: &ConvertedPayload,
) -> Result<Iplds, BtcError> {
    if !settings.in_range(payload.height) {
        return Ok(Iplds::default());
    }
    let mut response = Iplds { block_number: payload.height, ..Default::default() };
    if !settings.header_filter.off {
        let header_bytes = serialize(&payload.header);
        let cid = supernode_ipld::dbl_sha2_256_cid(codec::BTC_BLOCK, &header_bytes)?;
        response.header = Some(IpldBlock { cid: cid.to_string(), data: header_bytes });
    }
    if !settings.tx_filter.off {
        for (i, tx) in payload.txs.iter().enumerate() {
            if !tx_matches(&settings.tx_filter, &payload.tx_meta[i]) {
                continue;
            }
            let tx_bytes = serialize(tx);
            let cid = supernode_ipld::dbl_sha2_256_cid(codec::BTC_TX, &tx_bytes)?;
            response.transactions.push(IpldBlock { cid: cid.to_string(), data: tx_bytes });
        }
    }
    Ok(response)
}

/// Every constrained dimension of the filter must pass.
fn tx_matches(filter: &TxFilter, meta: &TxModelWithInsAndOuts) -> bool {
    if filter.segwit && !meta.segwit {
        return false;
    }
    if !filter.witness_hashes.is_empty() && !filter.witness_hashes.contains(&meta.witness_hash) {
        return false;
    }
    if !filter.indexes.is_empty() && !filter.indexes.contains(&meta.index) {
        return false;
    }
    if filter.multi_sig && !meta.tx_outputs.iter().any(|out| out.required_sigs > 1) {
        return false;
    }
    if !filter.pk_script_classes.is_empty()
        && !meta
            .tx_outputs
            .iter()
            .any(|out| filter.pk_script_classes.contains(&out.script_class))
    {
        return false;
    }
    if !filter.addresses.is_empty()
        && !meta
            .tx_outputs
            .iter()
            .any(|out| out.addresses.iter().any(|addr| filter.addresses.contains(addr)))
    {
        return false;
    }
    true
}

#[cfg(test)]
mod tests {
    use supernode_types::btc::TxOutput;

    use super::*;

    fn meta(index: i64, segwit: bool, required_sigs: i32, addresses: Vec<String>) -> TxModelWithInsAndOuts {
        TxModelWithInsAndOuts {
            index,
            segwit,
            witness_hash: format!("w{index}"),
            tx_outputs: vec![TxOutput { required_sigs, addresses, ..Default::default() }],
            ..Default::default()
        }
    }

    #[test]
    fn open_filter_matches_everything() {
        let filter = TxFilter::default();
        assert!(tx_matches(&filter, &meta(0, false, 1, vec![])));
        assert!(tx_matches(&filter, &meta(3, true, 2, vec!["addr".to_string()])));
    }

    #[test]
    fn segwit_filter_excludes_legacy_transactions() {
        let filter = TxFilter { segwit: true, ..Default::default() };
        assert!(!tx_matches(&filter, &meta(0, false, 1, vec![])));
        assert!(tx_matches(&filter, &meta(0, true, 1, vec![])));
    }

    #[test]
    fn index_filter_selects_coinbase_only() {
        let filter = TxFilter { indexes: vec![0], ..Default::default() };
        assert!(tx_matches(&filter, &meta(0, false, 1, vec![])));
        assert!(!tx_matches(&filter, &meta(1, false, 1, vec![])));
    }

    #[test]
    fn multisig_filter_requires_a_multisig_output() {
        let filter = TxFilter { multi_sig: true, ..Default::default() };
        assert!(!tx_matches(&filter, &meta(0, false, 1, vec![])));
        assert!(tx_matches(&filter, &meta(0, false, 2, vec![])));
    }

    #[test]
    fn address_filter_is_any_of() {
        let filter = TxFilter {
            addresses: vec!["a".to_string(), "b".to_string()],
            ..Default::default()
        };
        assert!(tx_matches(&filter, &meta(0, false, 1, vec!["b".to_string()])));
        assert!(!tx_matches(&filter, &meta(0, false, 1, vec!["c".to_string()])));
    }

    #[test]
    fn all_constrained_dimensions_must_pass() {
        let filter = TxFilter {
            segwit: true,
            indexes: vec![1],
            ..Default::default()
        };
        assert!(!tx_matches(&filter, &meta(1, false, 1, vec![])));
        assert!(!tx_matches(&filter, &meta(0, true, 1, vec![])));
        assert!(tx_matches(&filter, &meta(1, true, 1, vec![])));
    }
}
