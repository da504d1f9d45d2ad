//! Atomic publish-and-index of a converted Ethereum payload.
//!
//! Blobs land in `public.blocks` and index rows in `eth.*` within a single
//! transaction, so a committed block is always referentially complete. The
//! write order is fixed: header, uncles, transactions with their receipts,
//! then state nodes with their accounts and storage nodes.

use std::collections::HashMap;

use alloy_eips::eip2718::Encodable2718;
use alloy_primitives::{B256, Bytes, keccak256};
use alloy_rlp::Decodable;
use alloy_trie::TrieAccount;
use sqlx::PgPool;
use supernode_ipld::codec;
use supernode_types::eth::{
    CidPayload, ConvertedPayload, HeaderModel, NodeType, StateAccountModel, StateNodeModel,
    StorageNodeModel, TrieNode, UncleModel,
};

use crate::{EthError, indexer, reward};

/// Publishes blobs and index rows for converted payloads, attributed to one
/// node identity.
#[derive(Debug, Clone)]
pub struct IpldPublisher {
    pool: PgPool,
    node_id: i64,
}

impl IpldPublisher {
    /// Creates a publisher writing rows attributed to `node_id`.
    pub fn new(pool: &PgPool, node_id: i64) -> Self {
        Self { pool: pool.clone(), node_id }
    }

    /// Publishes and indexes every piece of the payload in one transaction,
    /// returning the CIDs and row models that were written.
    ///
    /// The transaction rolls back on drop if any step fails.
    pub async fn publish(&self, payload: &ConvertedPayload) -> Result<CidPayload, EthError> {
        let mut tx = self.pool.begin().await?;

        // Header.
        let header_rlp = alloy_rlp::encode(&payload.block.header);
        let header_cid = supernode_ipld::keccak_256_cid(codec::ETH_HEADER, &header_rlp)?;
        supernode_storage::put_ipld(&mut *tx, &header_cid, &header_rlp).await?;
        let block_reward = reward::block_reward(&payload.block, &payload.receipts);
        let header = HeaderModel {
            block_number: payload.block.header.number.to_string(),
            block_hash: payload.block.header.hash_slow().to_string(),
            parent_hash: payload.block.header.parent_hash.to_string(),
            cid: header_cid.to_string(),
            td: payload.total_difficulty.to_string(),
            node_id: self.node_id,
            reward: block_reward.to_string(),
            state_root: payload.block.header.state_root.to_string(),
            tx_root: payload.block.header.transactions_root.to_string(),
            receipt_root: payload.block.header.receipts_root.to_string(),
            uncle_root: payload.block.header.ommers_hash.to_string(),
            bloom: payload.block.header.logs_bloom.as_slice().to_vec(),
            timestamp: payload.block.header.timestamp as i64,
            ..Default::default()
        };
        let header_id = indexer::index_header(&mut *tx, &header, self.node_id).await?;

        // Uncles.
        let mut uncles = Vec::with_capacity(payload.block.body.ommers.len());
        for uncle in &payload.block.body.ommers {
            let uncle_rlp = alloy_rlp::encode(uncle);
            let uncle_cid = supernode_ipld::keccak_256_cid(codec::ETH_HEADER, &uncle_rlp)?;
            supernode_storage::put_ipld(&mut *tx, &uncle_cid, &uncle_rlp).await?;
            let uncle_reward =
                reward::uncle_reward(payload.block.header.number, uncle.number);
            let uncle_model = UncleModel {
                block_hash: uncle.hash_slow().to_string(),
                parent_hash: uncle.parent_hash.to_string(),
                cid: uncle_cid.to_string(),
                reward: uncle_reward.to_string(),
                ..Default::default()
            };
            indexer::index_uncle(&mut *tx, &uncle_model, header_id).await?;
            uncles.push(uncle_model);
        }

        // Transactions and their receipts, in block order.
        let mut transactions = Vec::with_capacity(payload.tx_meta.len());
        let mut receipts = HashMap::with_capacity(payload.receipts.len());
        for (i, transaction) in payload.block.body.transactions.iter().enumerate() {
            let tx_rlp = transaction.encoded_2718();
            let tx_cid = supernode_ipld::keccak_256_cid(codec::ETH_TX, &tx_rlp)?;
            supernode_storage::put_ipld(&mut *tx, &tx_cid, &tx_rlp).await?;
            let mut tx_model = payload.tx_meta[i].clone();
            tx_model.cid = tx_cid.to_string();
            let tx_id = indexer::index_transaction(&mut *tx, &tx_model, header_id).await?;

            let rct_rlp = payload.receipts[i].encoded_2718();
            let rct_cid = supernode_ipld::keccak_256_cid(codec::ETH_TX_RECEIPT, &rct_rlp)?;
            supernode_storage::put_ipld(&mut *tx, &rct_cid, &rct_rlp).await?;
            let mut rct_model = payload.receipt_meta[i].clone();
            rct_model.cid = rct_cid.to_string();
            indexer::index_receipt(&mut *tx, &rct_model, tx_id).await?;

            receipts.insert(*transaction.tx_hash(), rct_model);
            transactions.push(tx_model);
        }

        // State nodes, with decoded accounts and storage nodes under leaves.
        let mut state_nodes = Vec::with_capacity(payload.state_nodes.len());
        let mut state_accounts = HashMap::new();
        let mut storage_groups = HashMap::new();
        for state_node in &payload.state_nodes {
            let state_cid =
                supernode_ipld::keccak_256_cid(codec::ETH_STATE_TRIE, &state_node.value)?;
            supernode_storage::put_ipld(&mut *tx, &state_cid, &state_node.value).await?;
            let state_model = StateNodeModel {
                state_leaf_key: leaf_key_column(state_node),
                cid: state_cid.to_string(),
                state_path: state_node.path.clone(),
                node_type: state_node.node_type.as_int(),
                ..Default::default()
            };
            let state_id = indexer::index_state_node(&mut *tx, &state_model, header_id).await?;
            if state_node.node_type == NodeType::Leaf {
                let account = decode_state_leaf(&state_node.value)?;
                indexer::index_state_account(&mut *tx, &account, state_id).await?;
                let path_hash = keccak256(&state_node.path);
                state_accounts.insert(path_hash, account);
                if let Some(storage_nodes) = payload.storage_nodes.get(&path_hash) {
                    let mut group = Vec::with_capacity(storage_nodes.len());
                    for storage_node in storage_nodes {
                        let storage_cid = supernode_ipld::keccak_256_cid(
                            codec::ETH_STORAGE_TRIE,
                            &storage_node.value,
                        )?;
                        supernode_storage::put_ipld(&mut *tx, &storage_cid, &storage_node.value)
                            .await?;
                        let storage_model = StorageNodeModel {
                            storage_leaf_key: leaf_key_column(storage_node),
                            cid: storage_cid.to_string(),
                            storage_path: storage_node.path.clone(),
                            node_type: storage_node.node_type.as_int(),
                            ..Default::default()
                        };
                        indexer::index_storage_node(&mut *tx, &storage_model, state_id).await?;
                        group.push(storage_model);
                    }
                    storage_groups.insert(path_hash, group);
                }
            }
            state_nodes.push(state_model);
        }

        tx.commit().await?;
        tracing::info!(
            target: "eth::publisher",
            block_number = payload.block.header.number,
            txs = transactions.len(),
            state_nodes = state_nodes.len(),
            "Published and indexed block"
        );

        Ok(CidPayload {
            header,
            uncles,
            transactions,
            receipts,
            state_nodes,
            state_accounts,
            storage_nodes: storage_groups,
        })
    }
}

/// Null-key sentinel handling: non-leaf nodes carry a zero leaf key, stored
/// as NULL.
fn leaf_key_column(node: &TrieNode) -> Option<String> {
    (node.leaf_key != B256::ZERO).then(|| node.leaf_key.to_string())
}

/// Decodes the account out of a state leaf node's RLP, which is a
/// two-element list of the compact-encoded partial path and the RLP of the
/// account itself.
pub(crate) fn decode_state_leaf(value: &[u8]) -> Result<StateAccountModel, EthError> {
    let items = Vec::<Bytes>::decode(&mut &value[..])?;
    if items.len() != 2 {
        return Err(EthError::InvalidStateLeaf);
    }
    let account = TrieAccount::decode(&mut items[1].as_ref())?;
    Ok(StateAccountModel {
        balance: account.balance.to_string(),
        nonce: account.nonce as i64,
        code_hash: account.code_hash.to_vec(),
        storage_root: account.storage_root.to_string(),
        ..Default::default()
    })
}

#[cfg(test)]
mod tests {
    use alloy_primitives::U256;

    use super::*;

    #[test]
    fn state_leaf_account_round_trips() {
        let account = TrieAccount {
            nonce: 7,
            balance: U256::from(1_000_000u64),
            storage_root: B256::with_last_byte(3),
            code_hash: B256::with_last_byte(4),
        };
        let leaf: Vec<Bytes> = vec![
            Bytes::from(vec![0x20]),
            Bytes::from(alloy_rlp::encode(&account)),
        ];
        let decoded = decode_state_leaf(&alloy_rlp::encode(&leaf)).unwrap();
        assert_eq!(decoded.nonce, 7);
        assert_eq!(decoded.balance, "1000000");
        assert_eq!(decoded.storage_root, B256::with_last_byte(3).to_string());
        assert_eq!(decoded.code_hash, B256::with_last_byte(4).to_vec());
    }

    #[test]
    fn non_leaf_nodes_store_null_keys() {
        let node = TrieNode { leaf_key: B256::ZERO, ..Default::default() };
        assert_eq!(leaf_key_column(&node), None);
        let node = TrieNode { leaf_key: B256::with_last_byte(1), ..Default::default() };
        assert!(leaf_key_column(&node).is_some());
    }

    #[test]
    fn malformed_state_leaf_is_rejected() {
        let leaf: Vec<Bytes> = vec![Bytes::from(vec![0x20])];
        assert!(matches!(
            decode_state_leaf(&alloy_rlp::encode(&leaf)),
            Err(EthError::InvalidStateLeaf)
        ));
    }
}
