//! Decoding of raw Bitcoin block bytes into a normalized payload.
//!
//! Conversion is pure: consensus-deserialize the block, then flatten each
//! transaction into its row model with inputs and outputs. Output scripts
//! are classified into the standard script classes so subscribers can filter
//! on them without reparsing scripts.

use bitcoin::consensus::deserialize;
use bitcoin::hex::DisplayHex;
use bitcoin::{Address, Block, Network, Script, Transaction};
use supernode_types::btc::{
    ConvertedPayload, RawBlockPayload, TxInput, TxModelWithInsAndOuts, TxOutput,
};

use crate::BtcError;

/// Standard output script classes, in their conventional small-int encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum ScriptClass {
    /// Not a recognized standard script.
    NonStandard = 0,
    /// Pay to public key.
    PubKey = 1,
    /// Pay to public key hash.
    PubKeyHash = 2,
    /// Pay to v0 witness public key hash.
    WitnessPubKeyHash = 3,
    /// Pay to script hash.
    ScriptHash = 4,
    /// Pay to v0 witness script hash.
    WitnessScriptHash = 5,
    /// Bare multi-signature.
    MultiSig = 6,
    /// Provably unspendable data carrier.
    NullData = 7,
}

/// Decodes a raw block payload into its normalized representation.
///
/// `network` selects the address encoding used for output address
/// extraction.
pub fn convert(payload: &RawBlockPayload, network: Network) -> Result<ConvertedPayload, BtcError> {
    let block: Block = deserialize(&payload.block_bytes)?;
    let mut tx_meta = Vec::with_capacity(block.txdata.len());
    for (index, tx) in block.txdata.iter().enumerate() {
        tx_meta.push(convert_transaction(tx, index as i64, network));
    }
    tracing::debug!(
        target: "btc::converter",
        height = payload.height,
        txs = block.txdata.len(),
        "Converted block payload"
    );
    Ok(ConvertedPayload {
        height: payload.height,
        header: block.header,
        txs: block.txdata,
        tx_meta,
    })
}

fn convert_transaction(tx: &Transaction, index: i64, network: Network) -> TxModelWithInsAndOuts {
    let tx_inputs = tx
        .input
        .iter()
        .enumerate()
        .map(|(i, input)| TxInput {
            index: i as i64,
            tx_witness: input.witness.iter().map(|item| item.to_lower_hex_string()).collect(),
            sig_script: input.script_sig.to_bytes(),
            previous_outpoint_hash: input.previous_output.txid.to_string(),
            previous_outpoint_index: i64::from(input.previous_output.vout),
        })
        .collect();
    let tx_outputs = tx
        .output
        .iter()
        .enumerate()
        .map(|(i, output)| {
            let class = classify_script(&output.script_pubkey);
            TxOutput {
                index: i as i64,
                value: output.value.to_sat() as i64,
                pk_script: output.script_pubkey.to_bytes(),
                script_class: class as i32,
                addresses: extract_addresses(&output.script_pubkey, network),
                required_sigs: required_sigs(&output.script_pubkey, class),
            }
        })
        .collect();
    TxModelWithInsAndOuts {
        index,
        tx_hash: tx.compute_txid().to_string(),
        cid: String::new(),
        segwit: tx.input.iter().any(|input| !input.witness.is_empty()),
        witness_hash: tx.compute_wtxid().to_string(),
        tx_inputs,
        tx_outputs,
    }
}

/// Classifies an output script into its standard class.
pub fn classify_script(script: &Script) -> ScriptClass {
    if script.is_p2pk() {
        ScriptClass::PubKey
    } else if script.is_p2pkh() {
        ScriptClass::PubKeyHash
    } else if script.is_p2wpkh() {
        ScriptClass::WitnessPubKeyHash
    } else if script.is_p2sh() {
        ScriptClass::ScriptHash
    } else if script.is_p2wsh() {
        ScriptClass::WitnessScriptHash
    } else if script.is_op_return() {
        ScriptClass::NullData
    } else if multisig_required_sigs(script).is_some() {
        ScriptClass::MultiSig
    } else {
        ScriptClass::NonStandard
    }
}

fn extract_addresses(script: &Script, network: Network) -> Vec<String> {
    match Address::from_script(script, network) {
        Ok(address) => vec![address.to_string()],
        Err(_) => Vec::new(),
    }
}

fn required_sigs(script: &Script, class: ScriptClass) -> i32 {
    match class {
        ScriptClass::PubKey
        | ScriptClass::PubKeyHash
        | ScriptClass::WitnessPubKeyHash
        | ScriptClass::ScriptHash
        | ScriptClass::WitnessScriptHash => 1,
        ScriptClass::MultiSig => match multisig_required_sigs(script) {
            Some(m) => m,
            None => 0,
        },
        ScriptClass::NonStandard | ScriptClass::NullData => 0,
    }
}

/// The `m` of a bare `m`-of-`n` multisig script, if the script is one.
///
/// Shape: `OP_m <n pubkeys> OP_n OP_CHECKMULTISIG` where `OP_1` through
/// `OP_16` are `0x51..=0x60` and `OP_CHECKMULTISIG` is `0xae`.
fn multisig_required_sigs(script: &Script) -> Option<i32> {
    let bytes = script.as_bytes();
    let len = bytes.len();
    if len < 4 || bytes[len - 1] != 0xae {
        return None;
    }
    let m = bytes[0];
    let n = bytes[len - 2];
    if !(0x51..=0x60).contains(&m) || !(0x51..=0x60).contains(&n) || m > n {
        return None;
    }
    Some((m - 0x50) as i32)
}

#[cfg(test)]
mod tests {
    use bitcoin::absolute::LockTime;
    use bitcoin::block::{Header, Version};
    use bitcoin::consensus::serialize;
    use bitcoin::hashes::Hash;
    use bitcoin::transaction::Version as TxVersion;
    use bitcoin::{
        Amount, BlockHash, CompactTarget, OutPoint, ScriptBuf, Sequence, TxIn, TxMerkleNode,
        TxOut, Witness,
    };

    use super::*;

    fn coinbase_block() -> Block {
        let coinbase = Transaction {
            version: TxVersion::ONE,
            lock_time: LockTime::ZERO,
            input: vec![TxIn {
                previous_output: OutPoint::null(),
                script_sig: ScriptBuf::from_bytes(vec![0x04, 0xff, 0xff, 0x00, 0x1d]),
                sequence: Sequence::MAX,
                witness: Witness::new(),
            }],
            output: vec![TxOut {
                value: Amount::from_sat(50_0000_0000),
                script_pubkey: ScriptBuf::new_op_return(&[0u8; 4]),
            }],
        };
        Block {
            header: Header {
                version: Version::ONE,
                prev_blockhash: BlockHash::all_zeros(),
                merkle_root: TxMerkleNode::all_zeros(),
                time: 1_231_006_505,
                bits: CompactTarget::from_consensus(0x1d00_ffff),
                nonce: 2_083_236_893,
            },
            txdata: vec![coinbase],
        }
    }

    #[test]
    fn convert_flattens_transactions_with_ins_and_outs() {
        let block = coinbase_block();
        let payload = RawBlockPayload { height: 1, block_bytes: serialize(&block) };
        let converted = convert(&payload, Network::Bitcoin).unwrap();
        assert_eq!(converted.height, 1);
        assert_eq!(converted.txs.len(), 1);
        let meta = &converted.tx_meta[0];
        assert_eq!(meta.index, 0);
        assert_eq!(meta.tx_hash, block.txdata[0].compute_txid().to_string());
        assert!(!meta.segwit);
        assert_eq!(meta.tx_inputs.len(), 1);
        assert_eq!(
            meta.tx_inputs[0].previous_outpoint_hash,
            OutPoint::null().txid.to_string()
        );
        assert_eq!(meta.tx_outputs.len(), 1);
        assert_eq!(meta.tx_outputs[0].script_class, ScriptClass::NullData as i32);
        assert_eq!(meta.tx_outputs[0].required_sigs, 0);
    }

    #[test]
    fn convert_rejects_garbage_bytes() {
        let payload = RawBlockPayload { height: 1, block_bytes: vec![0xde, 0xad, 0xbe, 0xef] };
        assert!(matches!(
            convert(&payload, Network::Bitcoin),
            Err(BtcError::Consensus(_))
        ));
    }

    #[test]
    fn multisig_scripts_report_required_signatures() {
        // OP_2 <33-byte key> <33-byte key> <33-byte key> OP_3 OP_CHECKMULTISIG
        let mut bytes = vec![0x52];
        for seed in 0u8..3 {
            bytes.push(33);
            bytes.push(0x02);
            bytes.extend(std::iter::repeat_n(seed, 32));
        }
        bytes.push(0x53);
        bytes.push(0xae);
        let script = ScriptBuf::from_bytes(bytes);
        assert_eq!(classify_script(&script), ScriptClass::MultiSig);
        assert_eq!(required_sigs(&script, ScriptClass::MultiSig), 2);
    }

    #[test]
    fn p2pkh_scripts_extract_an_address() {
        let script = ScriptBuf::new_p2pkh(&bitcoin::PubkeyHash::from_byte_array([7u8; 20]));
        assert_eq!(classify_script(&script), ScriptClass::PubKeyHash);
        let addresses = extract_addresses(&script, Network::Bitcoin);
        assert_eq!(addresses.len(), 1);
        assert_eq!(required_sigs(&script, ScriptClass::PubKeyHash), 1);
    }
}
