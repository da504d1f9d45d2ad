//! Mainnet miner reward computation.
//!
//! Rewards are computed at index time and stored on the header row so that
//! consumers never need the full receipt set to answer reward queries.

use alloy_consensus::{Block, ReceiptEnvelope, Transaction, TxEnvelope, TxReceipt};
use alloy_primitives::U256;

/// Frontier era static block reward, 5 ETH.
const FRONTIER_REWARD: u128 = 5_000_000_000_000_000_000;
/// Byzantium era static block reward, 3 ETH.
const BYZANTIUM_REWARD: u128 = 3_000_000_000_000_000_000;
/// Constantinople era static block reward, 2 ETH.
const CONSTANTINOPLE_REWARD: u128 = 2_000_000_000_000_000_000;

const BYZANTIUM_BLOCK: u64 = 4_370_000;
const CONSTANTINOPLE_BLOCK: u64 = 7_280_000;

/// The era-dependent static reward for a block at the given height.
pub const fn static_reward(block_number: u64) -> u128 {
    if block_number < BYZANTIUM_BLOCK {
        FRONTIER_REWARD
    } else if block_number < CONSTANTINOPLE_BLOCK {
        BYZANTIUM_REWARD
    } else {
        CONSTANTINOPLE_REWARD
    }
}

/// Total miner reward for a block: the static era reward, plus transaction
/// fees, plus one thirty-second of the static reward per included uncle.
///
/// Per-transaction gas consumption is recovered from the difference of
/// consecutive cumulative gas counters in the receipts.
pub fn block_reward(block: &Block<TxEnvelope>, receipts: &[ReceiptEnvelope]) -> U256 {
    let number = block.header.number;
    let mut reward = U256::from(static_reward(number));
    let mut prev_cumulative = 0u64;
    for (tx, receipt) in block.body.transactions.iter().zip(receipts) {
        let gas_used = receipt.cumulative_gas_used().saturating_sub(prev_cumulative);
        prev_cumulative = receipt.cumulative_gas_used();
        let gas_price = tx.gas_price().unwrap_or_else(|| tx.max_fee_per_gas());
        reward += U256::from(gas_used) * U256::from(gas_price);
    }
    reward += U256::from(static_reward(number) / 32) * U256::from(block.body.ommers.len() as u64);
    reward
}

/// Reward paid to the miner of an included uncle:
/// `(uncle_number + 8 - block_number) * static_reward / 8`.
pub fn uncle_reward(block_number: u64, uncle_number: u64) -> U256 {
    let base = U256::from(static_reward(block_number));
    let factor = (uncle_number + 8).saturating_sub(block_number);
    base * U256::from(factor) / U256::from(8u64)
}

#[cfg(test)]
mod tests {
    use alloy_consensus::{BlockBody, Header};

    use super::*;

    #[test]
    fn static_reward_follows_era_boundaries() {
        assert_eq!(static_reward(0), FRONTIER_REWARD);
        assert_eq!(static_reward(4_369_999), FRONTIER_REWARD);
        assert_eq!(static_reward(4_370_000), BYZANTIUM_REWARD);
        assert_eq!(static_reward(7_279_999), BYZANTIUM_REWARD);
        assert_eq!(static_reward(7_280_000), CONSTANTINOPLE_REWARD);
    }

    #[test]
    fn empty_block_reward_is_the_static_reward() {
        let block = Block::<TxEnvelope>::new(
            Header { number: 8_000_000, ..Default::default() },
            BlockBody { transactions: vec![], ommers: vec![], withdrawals: None },
        );
        assert_eq!(block_reward(&block, &[]), U256::from(CONSTANTINOPLE_REWARD));
    }

    #[test]
    fn uncle_inclusion_adds_a_thirty_second_per_uncle() {
        let block = Block::<TxEnvelope>::new(
            Header { number: 8_000_000, ..Default::default() },
            BlockBody {
                transactions: vec![],
                ommers: vec![Header::default(), Header::default()],
                withdrawals: None,
            },
        );
        let expected =
            U256::from(CONSTANTINOPLE_REWARD) + U256::from(CONSTANTINOPLE_REWARD / 32) * U256::from(2u64);
        assert_eq!(block_reward(&block, &[]), expected);
    }

    #[test]
    fn uncle_reward_scales_with_depth() {
        // An uncle one block back earns 7/8 of the static reward.
        assert_eq!(
            uncle_reward(8_000_000, 7_999_999),
            U256::from(CONSTANTINOPLE_REWARD) * U256::from(7u64) / U256::from(8u64)
        );
        // Deeper than eight blocks earns nothing.
        assert_eq!(uncle_reward(8_000_000, 7_999_990), U256::ZERO);
    }
}
