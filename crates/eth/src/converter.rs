//! Converts a raw statediff payload into a normalized [`ConvertedPayload`].
//!
//! All derived fields are computed here, exactly once: recovered senders,
//! recipient/contract addresses, per-position topic sets, and normalized
//! trie nodes. Downstream stages only read.

use std::collections::HashMap;

use alloy_consensus::{Block, ReceiptEnvelope, Transaction, TxEnvelope, TxReceipt,
    transaction::SignerRecoverable};
use alloy_primitives::{B256, keccak256};
use alloy_rlp::Decodable;
use supernode_types::eth::{
    ConvertedPayload, NULL_ADDRESS_SENTINEL, NodeType, ReceiptModel, StateDiff, StateDiffPayload,
    TrieNode, TxModel,
};

use crate::EthError;

/// Decodes a [`StateDiffPayload`] and derives the per-transaction,
/// per-receipt, and per-trie-node metadata needed for indexing.
///
/// Account diffs are processed created, deleted, then updated, each group in
/// input order; storage diffs are grouped under the keccak hash of the
/// owning account diff's raw trie path.
pub fn convert(payload: &StateDiffPayload) -> Result<ConvertedPayload, EthError> {
    let block = Block::<TxEnvelope>::decode(&mut payload.block_rlp.as_ref())?;

    let transactions = &block.body.transactions;
    let mut senders = Vec::with_capacity(transactions.len());
    let mut tx_meta = Vec::with_capacity(transactions.len());
    for (i, tx) in transactions.iter().enumerate() {
        let src = tx.recover_signer()?;
        tx_meta.push(TxModel {
            index: i as i64,
            tx_hash: tx.tx_hash().to_string(),
            dst: tx.to().map_or_else(|| NULL_ADDRESS_SENTINEL.to_string(), |a| a.to_string()),
            src: src.to_string(),
            ..Default::default()
        });
        senders.push(src);
    }

    let receipts = Vec::<ReceiptEnvelope>::decode(&mut payload.receipts_rlp.as_ref())?;
    if receipts.len() != transactions.len() {
        return Err(EthError::MismatchedReceipts {
            txs: transactions.len(),
            rcts: receipts.len(),
        });
    }
    let mut receipt_meta = Vec::with_capacity(receipts.len());
    for (i, receipt) in receipts.iter().enumerate() {
        // For contract creations the contract address is derived from the
        // sender and nonce; otherwise it is the recipient.
        let contract = transactions[i]
            .to()
            .unwrap_or_else(|| senders[i].create(transactions[i].nonce()));
        let mut topic_sets: [Vec<String>; 4] = Default::default();
        for log in receipt.logs() {
            for (pos, set) in topic_sets.iter_mut().enumerate() {
                if let Some(topic) = log.data.topics().get(pos) {
                    set.push(topic.to_string());
                }
            }
        }
        let [topic0s, topic1s, topic2s, topic3s] = topic_sets;
        receipt_meta.push(ReceiptModel {
            contract: contract.to_string(),
            contract_hash: keccak256(contract.as_slice()).to_string(),
            topic0s,
            topic1s,
            topic2s,
            topic3s,
            log_contracts: receipt.logs().iter().map(|log| log.address.to_string()).collect(),
            ..Default::default()
        });
    }

    let diff = StateDiff::decode(&mut payload.state_diff_rlp.as_ref())?;
    let mut state_nodes = Vec::new();
    let mut storage_nodes: HashMap<B256, Vec<TrieNode>> = HashMap::new();
    let account_diffs = diff
        .created_accounts
        .iter()
        .chain(diff.deleted_accounts.iter())
        .chain(diff.updated_accounts.iter());
    for account in account_diffs {
        state_nodes.push(TrieNode {
            path: account.path.to_vec(),
            leaf_key: account.leaf_key,
            node_type: NodeType::from(account.node_type),
            value: account.node_value.to_vec(),
        });
        if account.storage.is_empty() {
            continue;
        }
        let path_hash = keccak256(&account.path);
        let group = storage_nodes.entry(path_hash).or_default();
        for storage_diff in &account.storage {
            group.push(TrieNode {
                path: storage_diff.path.to_vec(),
                leaf_key: storage_diff.leaf_key,
                node_type: NodeType::from(storage_diff.node_type),
                value: storage_diff.node_value.to_vec(),
            });
        }
    }

    tracing::debug!(
        target: "eth::converter",
        block_number = block.header.number,
        txs = transactions.len(),
        state_nodes = state_nodes.len(),
        "Converted statediff payload"
    );

    Ok(ConvertedPayload {
        total_difficulty: payload.total_difficulty,
        block,
        tx_meta,
        receipts,
        receipt_meta,
        state_nodes,
        storage_nodes,
    })
}

#[cfg(test)]
mod tests {
    use alloy_consensus::{BlockBody, Header};
    use alloy_primitives::{Bytes, U256, hex};
    use supernode_types::eth::{AccountDiff, StorageDiff};

    use super::*;

    fn empty_block_payload(diff: &StateDiff) -> StateDiffPayload {
        let block = Block::<TxEnvelope>::new(
            Header { number: 1, ..Default::default() },
            BlockBody { transactions: vec![], ommers: vec![], withdrawals: None },
        );
        StateDiffPayload {
            block_rlp: alloy_rlp::encode(&block).into(),
            receipts_rlp: alloy_rlp::encode(&Vec::<ReceiptEnvelope>::new()).into(),
            state_diff_rlp: alloy_rlp::encode(diff).into(),
            total_difficulty: U256::from(1000u64),
        }
    }

    #[test]
    fn state_nodes_preserve_created_deleted_updated_order() {
        let diff = StateDiff {
            block_number: 1,
            created_accounts: vec![AccountDiff {
                path: Bytes::from(hex!("06").to_vec()),
                node_type: 2,
                leaf_key: B256::with_last_byte(1),
                node_value: Bytes::from(vec![0x01]),
                storage: vec![],
            }],
            deleted_accounts: vec![AccountDiff {
                path: Bytes::from(hex!("0c").to_vec()),
                node_type: 3,
                leaf_key: B256::with_last_byte(2),
                node_value: Bytes::from(vec![0x02]),
                storage: vec![],
            }],
            updated_accounts: vec![AccountDiff {
                path: Bytes::from(vec![]),
                node_type: 0,
                leaf_key: B256::ZERO,
                node_value: Bytes::from(vec![0x03]),
                storage: vec![],
            }],
            ..Default::default()
        };
        let converted = convert(&empty_block_payload(&diff)).unwrap();
        assert_eq!(converted.state_nodes.len(), 3);
        assert_eq!(converted.state_nodes[0].node_type, NodeType::Leaf);
        assert_eq!(converted.state_nodes[1].node_type, NodeType::Removed);
        assert_eq!(converted.state_nodes[2].node_type, NodeType::Branch);
        assert_eq!(converted.state_nodes[0].path, vec![0x06]);
        assert_eq!(converted.state_nodes[1].path, vec![0x0c]);
        assert!(converted.storage_nodes.is_empty());
    }

    #[test]
    fn storage_nodes_group_under_state_path_hash() {
        let state_path = Bytes::from(hex!("06").to_vec());
        let diff = StateDiff {
            block_number: 1,
            updated_accounts: vec![AccountDiff {
                path: state_path.clone(),
                node_type: 2,
                leaf_key: B256::with_last_byte(1),
                node_value: Bytes::from(vec![0x01]),
                storage: vec![
                    StorageDiff {
                        path: Bytes::from(vec![]),
                        node_type: 2,
                        leaf_key: B256::with_last_byte(9),
                        node_value: Bytes::from(vec![0x0a]),
                    },
                    StorageDiff {
                        path: Bytes::from(hex!("02").to_vec()),
                        node_type: 3,
                        leaf_key: B256::ZERO,
                        node_value: Bytes::from(vec![]),
                    },
                ],
            }],
            ..Default::default()
        };
        let converted = convert(&empty_block_payload(&diff)).unwrap();
        let group = converted.storage_nodes.get(&keccak256(&state_path)).unwrap();
        assert_eq!(group.len(), 2);
        assert_eq!(group[0].node_type, NodeType::Leaf);
        assert_eq!(group[1].node_type, NodeType::Removed);
    }

    #[test]
    fn mismatched_receipt_count_is_rejected() {
        let block = Block::<TxEnvelope>::new(
            Header::default(),
            BlockBody { transactions: vec![], ommers: vec![], withdrawals: None },
        );
        let payload = StateDiffPayload {
            block_rlp: alloy_rlp::encode(&block).into(),
            // One receipt for zero transactions.
            receipts_rlp: alloy_rlp::encode(&vec![ReceiptEnvelope::Legacy(Default::default())])
                .into(),
            state_diff_rlp: alloy_rlp::encode(&StateDiff::default()).into(),
            total_difficulty: U256::ZERO,
        };
        assert!(matches!(
            convert(&payload),
            Err(EthError::MismatchedReceipts { txs: 0, rcts: 1 })
        ));
    }
}
