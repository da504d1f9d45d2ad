//! Postgres round-trip tests for the eth indexing pipeline.
//!
//! Run with a live database: `DATABASE_URL=... cargo test -- --ignored`.

use std::collections::HashMap;

use alloy_primitives::{B256, keccak256};
use sqlx::PgPool;
use supernode_eth::{CidIndexer, CidRetriever, Cleaner, PgIpldFetcher};
use supernode_ipld::codec;
use supernode_storage::NodeInfo;
use supernode_types::eth::{
    CidPayload, CidWrapper, HeaderModel, ReceiptModel, StateAccountModel, StateNodeModel,
    StorageNodeModel, SubscriptionSettings, TxModel,
};
use supernode_types::{DataKind, Gap};

async fn seed_node(pool: &PgPool) -> i64 {
    let mut conn = pool.acquire().await.unwrap();
    supernode_storage::register_node(
        &mut *conn,
        &NodeInfo {
            genesis_block: "0x41940ccb18565bb7a254dff8d77a2c67f773dea370ff56fd33d2ed1ad35555fa"
                .to_string(),
            network_id: "1".to_string(),
            node_id: "pipeline-test".to_string(),
            client_name: "supernode-rs".to_string(),
        },
    )
    .await
    .unwrap()
}

fn hash_for(height: u64, tag: u8) -> String {
    let mut bytes = [0u8; 32];
    bytes[0] = tag;
    bytes[24..].copy_from_slice(&height.to_be_bytes());
    B256::from(bytes).to_string()
}

/// A one-transaction block payload at `height` plus the blobs backing its
/// CIDs. Every object's bytes are salted with the height so blocks do not
/// deduplicate against each other.
fn sample_payload(height: u64) -> (CidPayload, Vec<(cid::Cid, Vec<u8>)>) {
    let header_data = format!("header-{height}").into_bytes();
    let tx_data = format!("tx-{height}").into_bytes();
    let rct_data = format!("rct-{height}").into_bytes();
    let state_data = format!("state-{height}").into_bytes();
    let storage_data = format!("storage-{height}").into_bytes();

    let header_cid = supernode_ipld::keccak_256_cid(codec::ETH_HEADER, &header_data).unwrap();
    let tx_cid = supernode_ipld::keccak_256_cid(codec::ETH_TX, &tx_data).unwrap();
    let rct_cid = supernode_ipld::keccak_256_cid(codec::ETH_TX_RECEIPT, &rct_data).unwrap();
    let state_cid = supernode_ipld::keccak_256_cid(codec::ETH_STATE_TRIE, &state_data).unwrap();
    let storage_cid =
        supernode_ipld::keccak_256_cid(codec::ETH_STORAGE_TRIE, &storage_data).unwrap();

    let tx_hash = hash_for(height, 0x02);
    let state_path = vec![0x06, height as u8];
    let path_hash = keccak256(&state_path);

    let payload = CidPayload {
        header: HeaderModel {
            block_number: height.to_string(),
            block_hash: hash_for(height, 0x01),
            parent_hash: hash_for(height.wrapping_sub(1), 0x01),
            cid: header_cid.to_string(),
            td: "17179869184".to_string(),
            reward: "5000000000000000000".to_string(),
            state_root: hash_for(height, 0x03),
            tx_root: hash_for(height, 0x04),
            receipt_root: hash_for(height, 0x05),
            uncle_root: hash_for(height, 0x06),
            bloom: vec![0u8; 256],
            timestamp: 1_600_000_000 + height as i64,
            ..Default::default()
        },
        uncles: vec![],
        transactions: vec![TxModel {
            index: 0,
            tx_hash: tx_hash.clone(),
            cid: tx_cid.to_string(),
            dst: "0x0000000000000000000000000000000000000bbb".to_string(),
            src: "0x0000000000000000000000000000000000000aaa".to_string(),
            ..Default::default()
        }],
        receipts: HashMap::from([(
            tx_hash.parse().unwrap(),
            ReceiptModel {
                cid: rct_cid.to_string(),
                contract: "0x0000000000000000000000000000000000000bbb".to_string(),
                contract_hash: keccak256(b"contract").to_string(),
                topic0s: vec![hash_for(height, 0x0a)],
                topic1s: vec![],
                topic2s: vec![],
                topic3s: vec![],
                log_contracts: vec!["0x0000000000000000000000000000000000000ccc".to_string()],
                ..Default::default()
            },
        )]),
        state_nodes: vec![StateNodeModel {
            state_leaf_key: Some(hash_for(height, 0x0b)),
            cid: state_cid.to_string(),
            state_path: state_path.clone(),
            node_type: 2,
            ..Default::default()
        }],
        state_accounts: HashMap::from([(
            path_hash,
            StateAccountModel {
                balance: "1000".to_string(),
                nonce: 1,
                code_hash: keccak256(b"").to_vec(),
                storage_root: hash_for(height, 0x0c),
                ..Default::default()
            },
        )]),
        storage_nodes: HashMap::from([(
            path_hash,
            vec![StorageNodeModel {
                storage_leaf_key: Some(hash_for(height, 0x0d)),
                cid: storage_cid.to_string(),
                storage_path: vec![0x02],
                node_type: 2,
                ..Default::default()
            }],
        )]),
    };
    let blobs = vec![
        (header_cid, header_data),
        (tx_cid, tx_data),
        (rct_cid, rct_data),
        (state_cid, state_data),
        (storage_cid, storage_data),
    ];
    (payload, blobs)
}

/// Indexes a sample block at `height` and stores its blobs.
async fn index_block(pool: &PgPool, node_id: i64, height: u64) -> CidPayload {
    let (payload, blobs) = sample_payload(height);
    let mut conn = pool.acquire().await.unwrap();
    for (cid, data) in &blobs {
        supernode_storage::put_ipld(&mut *conn, cid, data).await.unwrap();
    }
    drop(conn);
    CidIndexer::new(pool, node_id).index(&payload).await.unwrap();
    payload
}

#[sqlx::test(migrator = "supernode_storage::MIGRATOR")]
#[ignore = "requires a postgres instance"]
async fn index_and_retrieve_with_open_filter(pool: PgPool) {
    let node_id = seed_node(&pool).await;
    let payload = index_block(&pool, node_id, 1).await;

    let retriever = CidRetriever::new(&pool);
    let (wrappers, empty) = retriever.retrieve(&SubscriptionSettings::open(), 1).await.unwrap();
    assert!(!empty);
    assert_eq!(wrappers.len(), 1);
    let wrapper = &wrappers[0];
    assert_eq!(wrapper.header.cid, payload.header.cid);
    assert_eq!(wrapper.transactions.len(), 1);
    assert_eq!(wrapper.receipts.len(), 1);
    assert_eq!(wrapper.state_nodes.len(), 1);
    assert_eq!(wrapper.storage_nodes.len(), 1);
    assert_eq!(
        wrapper.storage_nodes[0].state_leaf_key,
        payload.state_nodes[0].state_leaf_key
    );
}

#[sqlx::test(migrator = "supernode_storage::MIGRATOR")]
#[ignore = "requires a postgres instance"]
async fn reindexing_increments_times_validated(pool: PgPool) {
    let node_id = seed_node(&pool).await;
    index_block(&pool, node_id, 1).await;
    index_block(&pool, node_id, 1).await;

    let (count, times_validated): (i64, i64) = sqlx::query_as(
        "SELECT COUNT(*) OVER (), times_validated FROM eth.header_cids LIMIT 1",
    )
    .fetch_one(&pool)
    .await
    .unwrap();
    assert_eq!(count, 1);
    assert_eq!(times_validated, 2);

    // Child rows must not duplicate either.
    let (tx_count,): (i64,) =
        sqlx::query_as("SELECT COUNT(*) FROM eth.transaction_cids").fetch_one(&pool).await.unwrap();
    assert_eq!(tx_count, 1);
}

#[sqlx::test(migrator = "supernode_storage::MIGRATOR")]
#[ignore = "requires a postgres instance"]
async fn receipt_topic_filter_narrows_results(pool: PgPool) {
    let node_id = seed_node(&pool).await;
    index_block(&pool, node_id, 1).await;

    let mut settings = SubscriptionSettings::open();
    settings.receipt_filter.topics[0] = vec![hash_for(1, 0x0a)];
    let retriever = CidRetriever::new(&pool);
    let (wrappers, _) = retriever.retrieve(&settings, 1).await.unwrap();
    assert_eq!(wrappers[0].receipts.len(), 1);

    settings.receipt_filter.topics[0] = vec![hash_for(99, 0x0a)];
    let (wrappers, _) = retriever.retrieve(&settings, 1).await.unwrap();
    assert!(wrappers[0].receipts.is_empty());
}

#[sqlx::test(migrator = "supernode_storage::MIGRATOR")]
#[ignore = "requires a postgres instance"]
async fn fetch_returns_the_published_blob_bytes(pool: PgPool) {
    let node_id = seed_node(&pool).await;
    index_block(&pool, node_id, 1).await;

    let retriever = CidRetriever::new(&pool);
    let (wrappers, _) = retriever.retrieve(&SubscriptionSettings::open(), 1).await.unwrap();
    let iplds = PgIpldFetcher::new(&pool).fetch(&wrappers[0]).await.unwrap();
    assert_eq!(iplds.block_number, 1);
    assert_eq!(iplds.header.unwrap().data, b"header-1");
    assert_eq!(iplds.transactions[0].data, b"tx-1");
    assert_eq!(iplds.receipts[0].data, b"rct-1");
    assert_eq!(iplds.state_nodes[0].ipld.data, b"state-1");
    assert_eq!(iplds.storage_nodes[0].ipld.data, b"storage-1");
}

#[sqlx::test(migrator = "supernode_storage::MIGRATOR")]
#[ignore = "requires a postgres instance"]
async fn header_filter_off_omits_the_header(pool: PgPool) {
    let node_id = seed_node(&pool).await;
    index_block(&pool, node_id, 1).await;

    let mut settings = SubscriptionSettings::open();
    settings.header_filter.off = true;
    let retriever = CidRetriever::new(&pool);
    let (wrappers, empty) = retriever.retrieve(&settings, 1).await.unwrap();
    assert!(!empty);
    assert!(wrappers[0].header.cid.is_empty());
    assert_eq!(wrappers[0].transactions.len(), 1);

    let iplds = PgIpldFetcher::new(&pool).fetch(&wrappers[0]).await.unwrap();
    assert!(iplds.header.is_none());
    assert_eq!(iplds.transactions.len(), 1);
}

#[sqlx::test(migrator = "supernode_storage::MIGRATOR")]
#[ignore = "requires a postgres instance"]
async fn fetch_resolves_blobs_shared_between_nodes(pool: PgPool) {
    // Two removed nodes carry the same empty value and therefore the same
    // CID; the blockstore holds a single row for both.
    let cid = supernode_ipld::keccak_256_cid(codec::ETH_STATE_TRIE, b"").unwrap();
    let mut conn = pool.acquire().await.unwrap();
    supernode_storage::put_ipld(&mut *conn, &cid, b"").await.unwrap();
    drop(conn);

    let wrapper = CidWrapper {
        block_number: 1,
        state_nodes: vec![
            StateNodeModel {
                cid: cid.to_string(),
                state_path: vec![0x01],
                node_type: 3,
                ..Default::default()
            },
            StateNodeModel {
                cid: cid.to_string(),
                state_path: vec![0x02],
                node_type: 3,
                ..Default::default()
            },
        ],
        ..Default::default()
    };
    let iplds = PgIpldFetcher::new(&pool).fetch(&wrapper).await.unwrap();
    assert_eq!(iplds.state_nodes.len(), 2);
    assert!(iplds.state_nodes.iter().all(|node| node.ipld.data.is_empty()));
}

#[sqlx::test(migrator = "supernode_storage::MIGRATOR")]
#[ignore = "requires a postgres instance"]
async fn retrieve_gaps_finds_interior_holes(pool: PgPool) {
    let node_id = seed_node(&pool).await;
    for height in [1, 2, 5] {
        index_block(&pool, node_id, height).await;
    }
    let gaps = CidRetriever::new(&pool).retrieve_gaps(0).await.unwrap();
    assert_eq!(gaps, vec![Gap { start: 3, stop: 4 }]);
}

#[sqlx::test(migrator = "supernode_storage::MIGRATOR")]
#[ignore = "requires a postgres instance"]
async fn clean_transactions_preserves_headers(pool: PgPool) {
    let node_id = seed_node(&pool).await;
    index_block(&pool, node_id, 1).await;
    index_block(&pool, node_id, 2).await;

    Cleaner::new(&pool).clean(&[Gap { start: 1, stop: 2 }], DataKind::Transactions).await.unwrap();

    let (headers,): (i64,) =
        sqlx::query_as("SELECT COUNT(*) FROM eth.header_cids").fetch_one(&pool).await.unwrap();
    assert_eq!(headers, 2);
    let (txs,): (i64,) =
        sqlx::query_as("SELECT COUNT(*) FROM eth.transaction_cids").fetch_one(&pool).await.unwrap();
    assert_eq!(txs, 0);
    let (rcts,): (i64,) =
        sqlx::query_as("SELECT COUNT(*) FROM eth.receipt_cids").fetch_one(&pool).await.unwrap();
    assert_eq!(rcts, 0);

    // Header blobs survive; tx and receipt blobs are gone. Headers, state,
    // and storage leave 3 blobs per block.
    let (blobs,): (i64,) =
        sqlx::query_as("SELECT COUNT(*) FROM public.blocks").fetch_one(&pool).await.unwrap();
    assert_eq!(blobs, 6);
}

#[sqlx::test(migrator = "supernode_storage::MIGRATOR")]
#[ignore = "requires a postgres instance"]
async fn clean_full_empties_every_table(pool: PgPool) {
    let node_id = seed_node(&pool).await;
    index_block(&pool, node_id, 1).await;

    Cleaner::new(&pool).clean(&[Gap { start: 1, stop: 1 }], DataKind::Full).await.unwrap();

    for table in [
        "eth.header_cids",
        "eth.transaction_cids",
        "eth.receipt_cids",
        "eth.state_cids",
        "eth.state_accounts",
        "eth.storage_cids",
        "public.blocks",
    ] {
        let (count,): (i64,) = sqlx::query_as(&format!("SELECT COUNT(*) FROM {table}"))
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(count, 0, "{table} not emptied");
    }
}

#[sqlx::test(migrator = "supernode_storage::MIGRATOR")]
#[ignore = "requires a postgres instance"]
async fn reset_validation_zeroes_counters_in_range(pool: PgPool) {
    let node_id = seed_node(&pool).await;
    index_block(&pool, node_id, 1).await;
    index_block(&pool, node_id, 2).await;

    Cleaner::new(&pool).reset_validation(&[Gap { start: 2, stop: 2 }]).await.unwrap();

    let rows: Vec<(i64, i64)> = sqlx::query_as(
        "SELECT block_number::BIGINT, times_validated FROM eth.header_cids ORDER BY 1",
    )
    .fetch_all(&pool)
    .await
    .unwrap();
    assert_eq!(rows, vec![(1, 1), (2, 0)]);
}
