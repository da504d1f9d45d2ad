//! Node registration.
//!
//! Every index row is attributed to the node that produced it so that
//! multiple writers sharing a database can be told apart.

use sqlx::PgConnection;

use crate::StorageError;

/// Identity of the node writing into the index.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct NodeInfo {
    /// Hash of the chain's genesis block.
    pub genesis_block: String,
    /// Network identifier.
    pub network_id: String,
    /// Unique identifier for this node.
    pub node_id: String,
    /// Name of the client producing the payloads.
    pub client_name: String,
}

/// Upserts the node record and returns its database id.
pub async fn register_node(conn: &mut PgConnection, info: &NodeInfo) -> Result<i64, StorageError> {
    let (id,): (i64,) = sqlx::query_as(
        "INSERT INTO public.nodes (genesis_block, network_id, node_id, client_name)
         VALUES ($1, $2, $3, $4)
         ON CONFLICT (genesis_block, network_id, node_id) DO UPDATE
         SET client_name = $4
         RETURNING id",
    )
    .bind(&info.genesis_block)
    .bind(&info.network_id)
    .bind(&info.node_id)
    .bind(&info.client_name)
    .fetch_one(conn)
    .await?;
    Ok(id)
}
