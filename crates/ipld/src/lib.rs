//! Content addressing for supernode IPLD objects.
//!
//! Every structural piece of a block gets a deterministic CIDv1: a codec tag
//! distinguishing the object class plus a multihash over the object's
//! canonical serialized bytes. Identical bytes under the same codec always
//! produce the identical CID, which is what makes blob deduplication in the
//! blockstore work.

use alloy_primitives::keccak256;
use cid::Cid;
use data_encoding::BASE32_NOPAD;
use multihash::Multihash;
use sha2::{Digest, Sha256};
use thiserror::Error;

pub mod codec {
    //! Multicodec tags for the object classes this pipeline publishes.

    /// Ethereum block header.
    pub const ETH_HEADER: u64 = 0x90;
    /// Ethereum uncle header list.
    pub const ETH_HEADER_LIST: u64 = 0x91;
    /// Ethereum transaction.
    pub const ETH_TX: u64 = 0x93;
    /// Ethereum transaction receipt.
    pub const ETH_TX_RECEIPT: u64 = 0x95;
    /// Ethereum state trie node.
    pub const ETH_STATE_TRIE: u64 = 0x96;
    /// Ethereum storage trie node.
    pub const ETH_STORAGE_TRIE: u64 = 0x98;
    /// Bitcoin block (header).
    pub const BTC_BLOCK: u64 = 0xb0;
    /// Bitcoin transaction.
    pub const BTC_TX: u64 = 0xb1;
}

/// Multihash function code: keccak-256, used for all Ethereum objects.
pub const MH_KECCAK_256: u64 = 0x1b;

/// Multihash function code: double sha2-256, used for all Bitcoin objects.
pub const MH_DBL_SHA2_256: u64 = 0x56;

/// Errors raised while deriving a CID.
#[derive(Debug, Error)]
pub enum IpldError {
    /// The digest did not fit the multihash container.
    #[error("multihash wrap error")]
    Multihash(#[from] multihash::Error),
}

/// Derives the CIDv1 for `data` under `codec` using a keccak-256 multihash.
pub fn keccak_256_cid(codec: u64, data: &[u8]) -> Result<Cid, IpldError> {
    let digest = keccak256(data);
    let mh = Multihash::<64>::wrap(MH_KECCAK_256, digest.as_slice())?;
    Ok(Cid::new_v1(codec, mh))
}

/// Derives the CIDv1 for `data` under `codec` using a double-sha256
/// multihash.
pub fn dbl_sha2_256_cid(codec: u64, data: &[u8]) -> Result<Cid, IpldError> {
    let first = Sha256::digest(data);
    let digest = Sha256::digest(first);
    let mh = Multihash::<64>::wrap(MH_DBL_SHA2_256, digest.as_slice())?;
    Ok(Cid::new_v1(codec, mh))
}

/// The `public.blocks` key for a CID: the datastore prefix plus the base32
/// (RFC 4648, no padding, upper case) encoding of the raw multihash bytes.
///
/// Matches the go-ipfs datastore key layout so blobs written here are
/// addressable by any IPFS-compatible reader of the table.
pub fn blockstore_key(cid: &Cid) -> String {
    format!("/blocks/{}", BASE32_NOPAD.encode(&cid.hash().to_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cid_derivation_is_deterministic() {
        let a = keccak_256_cid(codec::ETH_HEADER, b"header bytes").unwrap();
        let b = keccak_256_cid(codec::ETH_HEADER, b"header bytes").unwrap();
        assert_eq!(a, b);
        assert_eq!(a.to_string(), b.to_string());
    }

    #[test]
    fn codec_distinguishes_object_classes() {
        let header = keccak_256_cid(codec::ETH_HEADER, b"same bytes").unwrap();
        let tx = keccak_256_cid(codec::ETH_TX, b"same bytes").unwrap();
        assert_ne!(header, tx);
        // Same content hash either way; only the codec differs.
        assert_eq!(header.hash(), tx.hash());
        assert_eq!(header.codec(), codec::ETH_HEADER);
        assert_eq!(tx.codec(), codec::ETH_TX);
    }

    #[test]
    fn btc_cids_use_double_sha256() {
        let cid = dbl_sha2_256_cid(codec::BTC_BLOCK, b"block").unwrap();
        assert_eq!(cid.hash().code(), MH_DBL_SHA2_256);
        let first = Sha256::digest(b"block");
        let expected = Sha256::digest(first);
        assert_eq!(cid.hash().digest(), expected.as_slice());
    }

    #[test]
    fn blockstore_keys_share_prefix_and_differ_by_hash() {
        let a = keccak_256_cid(codec::ETH_TX, b"one").unwrap();
        let b = keccak_256_cid(codec::ETH_TX, b"two").unwrap();
        let key_a = blockstore_key(&a);
        let key_b = blockstore_key(&b);
        assert!(key_a.starts_with("/blocks/"));
        assert_ne!(key_a, key_b);
        // The key is multihash-derived, so codec changes do not move the blob.
        let c = keccak_256_cid(codec::ETH_HEADER, b"one").unwrap();
        assert_eq!(key_a, blockstore_key(&c));
    }
}
