//! Content-addressed blob storage in `public.blocks`.
//!
//! Keys follow the go-ipfs datastore convention: `/blocks/` followed by the
//! unpadded base32 encoding of the CID's multihash. Writes are idempotent;
//! rewriting an existing key is a no-op since the data is content-addressed.

use async_trait::async_trait;
use cid::Cid;
use sqlx::{PgConnection, PgPool};

use crate::StorageError;

/// A content-addressed block source.
///
/// Batch lookups come back unordered and possibly incomplete; callers that
/// need completeness must compare counts themselves.
#[async_trait]
pub trait BlockService: Send + Sync {
    /// Returns whichever of the requested blocks the service holds.
    async fn get_blocks(&self, cids: &[Cid]) -> Result<Vec<(Cid, Vec<u8>)>, StorageError>;
}

#[async_trait]
impl BlockService for PgPool {
    async fn get_blocks(&self, cids: &[Cid]) -> Result<Vec<(Cid, Vec<u8>)>, StorageError> {
        if cids.is_empty() {
            return Ok(Vec::new());
        }
        let keys: Vec<String> = cids.iter().map(supernode_ipld::blockstore_key).collect();
        let rows: Vec<(String, Vec<u8>)> =
            sqlx::query_as("SELECT key, data FROM public.blocks WHERE key = ANY($1)")
                .bind(&keys)
                .fetch_all(self)
                .await?;
        let mut blocks = Vec::with_capacity(rows.len());
        for (key, data) in rows {
            if let Some(pos) = keys.iter().position(|k| *k == key) {
                blocks.push((cids[pos], data));
            }
        }
        Ok(blocks)
    }
}

/// Stores a blob under its blockstore key, returning the key.
pub async fn put_ipld(
    conn: &mut PgConnection,
    cid: &Cid,
    data: &[u8],
) -> Result<String, StorageError> {
    let key = supernode_ipld::blockstore_key(cid);
    sqlx::query("INSERT INTO public.blocks (key, data) VALUES ($1, $2) ON CONFLICT (key) DO NOTHING")
        .bind(&key)
        .bind(data)
        .execute(conn)
        .await?;
    Ok(key)
}

/// Fetches the blob for a CID string as stored in an index row.
pub async fn fetch_ipld(conn: &mut PgConnection, cid: &str) -> Result<Vec<u8>, StorageError> {
    let parsed = Cid::try_from(cid)?;
    fetch_ipld_by_key(conn, &supernode_ipld::blockstore_key(&parsed))
        .await?
        .ok_or_else(|| StorageError::BlobNotFound { cid: cid.to_string() })
}

/// Fetches a blob by its raw blockstore key, if present.
pub async fn fetch_ipld_by_key(
    conn: &mut PgConnection,
    key: &str,
) -> Result<Option<Vec<u8>>, StorageError> {
    let row: Option<(Vec<u8>,)> =
        sqlx::query_as("SELECT data FROM public.blocks WHERE key = $1")
            .bind(key)
            .fetch_optional(conn)
            .await?;
    Ok(row.map(|(data,)| data))
}
