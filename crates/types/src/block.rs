//! The raw IPLD block unit returned by fetchers and filterers.

use serde::{Deserialize, Serialize};

/// One content-addressed object: its CID string plus the raw bytes it hashes
/// to. Every response leaving the pipeline is assembled from these.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IpldBlock {
    /// CIDv1 string of `data`.
    pub cid: String,
    /// Canonical serialized object bytes.
    #[serde(with = "serde_bytes_hex")]
    pub data: Vec<u8>,
}

/// Hex (de)serialization for blob bytes, keeping streamed payloads readable.
mod serde_bytes_hex {
    use alloy_primitives::hex;
    use serde::{Deserialize, Deserializer, Serializer, de::Error};

    pub(super) fn serialize<S: Serializer>(data: &[u8], ser: S) -> Result<S::Ok, S::Error> {
        ser.serialize_str(&hex::encode_prefixed(data))
    }

    pub(super) fn deserialize<'de, D: Deserializer<'de>>(de: D) -> Result<Vec<u8>, D::Error> {
        let s = String::deserialize(de)?;
        hex::decode(&s).map_err(D::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blob_bytes_stream_as_prefixed_hex() {
        let block = IpldBlock { cid: "bagyacvra".to_string(), data: vec![0xde, 0xad, 0xbe] };
        let json = serde_json::to_string(&block).unwrap();
        assert_eq!(json, r#"{"cid":"bagyacvra","data":"0xdeadbe"}"#);
        let back: IpldBlock = serde_json::from_str(&json).unwrap();
        assert_eq!(back, block);
    }
}
