//! In-memory filtering of a converted payload against a subscription.
//!
//! This is the streaming twin of the SQL retriever: the same filter settings
//! applied to a payload that has not been persisted yet (or does not need a
//! round trip). CIDs are derived on the fly from the same bytes the
//! publisher would store, so streamed and retrieved responses agree.

use alloy_consensus::TxReceipt;
use alloy_eips::eip2718::Encodable2718;
use alloy_primitives::{Address, B256, keccak256};
use supernode_ipld::codec;
use supernode_types::IpldBlock;
use supernode_types::eth::{
    ConvertedPayload, Iplds, NodeType, ReceiptFilter, ReceiptModel, StateNode, StorageNode,
    SubscriptionSettings,
};

use crate::EthError;

/// Extracts the subset of `payload` matching `settings`, packaged with CIDs.
///
/// Returns an empty response when the block is outside the subscription's
/// `[start, end)` range.
pub fn filter_payload(
    settings: &SubscriptionSettings,
    payload: &ConvertedPayload,
) -> Result<Iplds, EthError> {
    if !settings.in_range(payload.block_number()) {
        return Ok(Iplds::default());
    }
    let mut response = Iplds {
        block_number: payload.block_number(),
        total_difficulty: payload.total_difficulty,
        ..Default::default()
    };
    filter_headers(settings, payload, &mut response)?;
    let matched_txs = filter_transactions(settings, payload, &mut response)?;
    let match_txs: &[B256] =
        if settings.receipt_filter.match_txs { &matched_txs } else { &[] };
    filter_receipts(&settings.receipt_filter, payload, match_txs, &mut response)?;
    filter_state(settings, payload, &mut response)?;
    filter_storage(settings, payload, &mut response)?;
    Ok(response)
}

fn filter_headers(
    settings: &SubscriptionSettings,
    payload: &ConvertedPayload,
    response: &mut Iplds,
) -> Result<(), EthError> {
    if settings.header_filter.off {
        return Ok(());
    }
    let header_rlp = alloy_rlp::encode(&payload.block.header);
    let cid = supernode_ipld::keccak_256_cid(codec::ETH_HEADER, &header_rlp)?;
    response.header = Some(IpldBlock { cid: cid.to_string(), data: header_rlp });
    if settings.header_filter.uncles {
        for uncle in &payload.block.body.ommers {
            let uncle_rlp = alloy_rlp::encode(uncle);
            let cid = supernode_ipld::keccak_256_cid(codec::ETH_HEADER, &uncle_rlp)?;
            response.uncles.push(IpldBlock { cid: cid.to_string(), data: uncle_rlp });
        }
    }
    Ok(())
}

fn filter_transactions(
    settings: &SubscriptionSettings,
    payload: &ConvertedPayload,
    response: &mut Iplds,
) -> Result<Vec<B256>, EthError> {
    let mut matched = Vec::new();
    if settings.tx_filter.off {
        return Ok(matched);
    }
    let filter = &settings.tx_filter;
    for (i, tx) in payload.block.body.transactions.iter().enumerate() {
        let meta = &payload.tx_meta[i];
        let wanted = (filter.src.is_empty() && filter.dst.is_empty())
            || filter.src.iter().any(|s| *s == meta.src)
            || filter.dst.iter().any(|d| *d == meta.dst);
        if !wanted {
            continue;
        }
        let data = tx.encoded_2718();
        let cid = supernode_ipld::keccak_256_cid(codec::ETH_TX, &data)?;
        response.transactions.push(IpldBlock { cid: cid.to_string(), data });
        matched.push(meta.tx_hash.parse()?);
    }
    Ok(matched)
}

fn filter_receipts(
    filter: &ReceiptFilter,
    payload: &ConvertedPayload,
    matched_txs: &[B256],
    response: &mut Iplds,
) -> Result<(), EthError> {
    if filter.off {
        return Ok(());
    }
    for (i, receipt) in payload.receipts.iter().enumerate() {
        let meta = &payload.receipt_meta[i];
        let tx_hash: B256 = payload.tx_meta[i].tx_hash.parse()?;
        let tx_matched = matched_txs.contains(&tx_hash);
        let addrs_ok = filter.log_addresses.is_empty()
            || meta.log_contracts.iter().any(|c| filter.log_addresses.contains(c));
        if tx_matched || (addrs_ok && topics_match(filter, meta)) {
            let data = receipt.encoded_2718();
            let cid = supernode_ipld::keccak_256_cid(codec::ETH_TX_RECEIPT, &data)?;
            response.receipts.push(IpldBlock { cid: cid.to_string(), data });
        }
    }
    Ok(())
}

/// All four topic slots must pass; an empty filter slot passes anything.
fn topics_match(filter: &ReceiptFilter, meta: &ReceiptModel) -> bool {
    let actual = [&meta.topic0s, &meta.topic1s, &meta.topic2s, &meta.topic3s];
    filter.topics.iter().zip(actual).all(|(wanted, present)| {
        wanted.is_empty() || present.iter().any(|topic| wanted.contains(topic))
    })
}

fn filter_state(
    settings: &SubscriptionSettings,
    payload: &ConvertedPayload,
    response: &mut Iplds,
) -> Result<(), EthError> {
    if settings.state_filter.off {
        return Ok(());
    }
    let filter = &settings.state_filter;
    let wanted_keys = hash_addresses(&filter.addresses)?;
    for node in &payload.state_nodes {
        if !key_wanted(&wanted_keys, node.leaf_key) {
            continue;
        }
        if node.node_type == NodeType::Leaf || filter.intermediate_nodes {
            let cid = supernode_ipld::keccak_256_cid(codec::ETH_STATE_TRIE, &node.value)?;
            response.state_nodes.push(StateNode {
                state_leaf_key: node.leaf_key,
                node_type: node.node_type,
                ipld: IpldBlock { cid: cid.to_string(), data: node.value.clone() },
            });
        }
    }
    Ok(())
}

fn filter_storage(
    settings: &SubscriptionSettings,
    payload: &ConvertedPayload,
    response: &mut Iplds,
) -> Result<(), EthError> {
    if settings.storage_filter.off {
        return Ok(());
    }
    let filter = &settings.storage_filter;
    let wanted_state_keys = hash_addresses(&filter.addresses)?;
    let mut wanted_storage_keys = Vec::with_capacity(filter.storage_keys.len());
    for key in &filter.storage_keys {
        wanted_storage_keys.push(key.parse::<B256>()?);
    }
    // Storage groups are keyed by the hash of the owning state node's path;
    // walk the state nodes to recover the leaf-key association.
    for state_node in &payload.state_nodes {
        if !key_wanted(&wanted_state_keys, state_node.leaf_key) {
            continue;
        }
        let Some(group) = payload.storage_nodes.get(&keccak256(&state_node.path)) else {
            continue;
        };
        for storage_node in group {
            if !key_wanted(&wanted_storage_keys, storage_node.leaf_key) {
                continue;
            }
            if storage_node.node_type != NodeType::Leaf && !filter.intermediate_nodes {
                continue;
            }
            let cid =
                supernode_ipld::keccak_256_cid(codec::ETH_STORAGE_TRIE, &storage_node.value)?;
            response.storage_nodes.push(StorageNode {
                state_leaf_key: state_node.leaf_key,
                storage_leaf_key: storage_node.leaf_key,
                node_type: storage_node.node_type,
                ipld: IpldBlock { cid: cid.to_string(), data: storage_node.value.clone() },
            });
        }
    }
    Ok(())
}

fn hash_addresses(addresses: &[String]) -> Result<Vec<B256>, EthError> {
    addresses
        .iter()
        .map(|addr| {
            let address: Address = addr.parse()?;
            Ok(keccak256(address.as_slice()))
        })
        .collect()
}

fn key_wanted(wanted: &[B256], actual: B256) -> bool {
    wanted.is_empty() || wanted.contains(&actual)
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use alloy_consensus::{Block, BlockBody, Header, TxEnvelope};
    use alloy_primitives::U256;
    use supernode_types::eth::{HeaderFilter, StateFilter, StorageFilter, TrieNode};

    use super::*;

    fn payload_with_state() -> ConvertedPayload {
        let state_path = vec![0x06u8];
        let mut storage_nodes = HashMap::new();
        storage_nodes.insert(
            keccak256(&state_path),
            vec![
                TrieNode {
                    path: vec![],
                    leaf_key: B256::with_last_byte(0xaa),
                    node_type: NodeType::Leaf,
                    value: vec![0x01],
                },
                TrieNode {
                    path: vec![0x02],
                    leaf_key: B256::ZERO,
                    node_type: NodeType::Branch,
                    value: vec![0x02],
                },
            ],
        );
        ConvertedPayload {
            total_difficulty: U256::from(1u64),
            block: Block::new(
                Header { number: 5, ..Default::default() },
                BlockBody::<TxEnvelope> { transactions: vec![], ommers: vec![], withdrawals: None },
            ),
            tx_meta: vec![],
            receipts: vec![],
            receipt_meta: vec![],
            state_nodes: vec![TrieNode {
                path: state_path,
                leaf_key: B256::with_last_byte(0x01),
                node_type: NodeType::Leaf,
                value: vec![0x0a],
            }],
            storage_nodes,
        }
    }

    #[test]
    fn out_of_range_blocks_produce_empty_responses() {
        let settings = SubscriptionSettings { start: 10, ..SubscriptionSettings::open() };
        let response = filter_payload(&settings, &payload_with_state()).unwrap();
        assert!(response.is_empty());
    }

    #[test]
    fn header_filter_off_drops_headers() {
        let settings = SubscriptionSettings {
            header_filter: HeaderFilter { off: true, uncles: false },
            ..SubscriptionSettings::open()
        };
        let response = filter_payload(&settings, &payload_with_state()).unwrap();
        assert!(response.header.is_none());
        // State still streams with the open default.
        assert_eq!(response.state_nodes.len(), 1);
    }

    #[test]
    fn state_filter_matches_on_hashed_leaf_key() {
        // No payload leaf key will match this address's hash.
        let settings = SubscriptionSettings {
            state_filter: StateFilter {
                off: false,
                addresses: vec!["0x0000000000000000000000000000000000000001".to_string()],
                intermediate_nodes: false,
            },
            ..SubscriptionSettings::open()
        };
        let response = filter_payload(&settings, &payload_with_state()).unwrap();
        assert!(response.state_nodes.is_empty());
    }

    #[test]
    fn storage_filter_excludes_intermediate_nodes_by_default() {
        let settings = SubscriptionSettings::open();
        let response = filter_payload(&settings, &payload_with_state()).unwrap();
        assert_eq!(response.storage_nodes.len(), 1);
        assert_eq!(response.storage_nodes[0].storage_leaf_key, B256::with_last_byte(0xaa));
        assert_eq!(response.storage_nodes[0].state_leaf_key, B256::with_last_byte(0x01));
    }

    #[test]
    fn storage_filter_can_include_intermediate_nodes() {
        let settings = SubscriptionSettings {
            storage_filter: StorageFilter { intermediate_nodes: true, ..Default::default() },
            ..SubscriptionSettings::open()
        };
        let response = filter_payload(&settings, &payload_with_state()).unwrap();
        assert_eq!(response.storage_nodes.len(), 2);
    }

    #[test]
    fn storage_key_filter_narrows_to_one_slot() {
        let settings = SubscriptionSettings {
            storage_filter: StorageFilter {
                storage_keys: vec![B256::with_last_byte(0xaa).to_string()],
                ..Default::default()
            },
            ..SubscriptionSettings::open()
        };
        let response = filter_payload(&settings, &payload_with_state()).unwrap();
        assert_eq!(response.storage_nodes.len(), 1);
    }
}
