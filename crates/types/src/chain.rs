//! Chain and data-kind tags shared across the pipeline.

use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// The closed set of chains the supernode can run against.
///
/// Exactly one chain is selected at configuration time; every pipeline
/// component is instantiated for that chain and only that chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChainType {
    /// Ethereum mainnet-shaped chains (statediff payloads).
    Ethereum,
    /// Bitcoin mainnet-shaped chains (full block payloads).
    Bitcoin,
}

impl fmt::Display for ChainType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ethereum => write!(f, "ethereum"),
            Self::Bitcoin => write!(f, "bitcoin"),
        }
    }
}

/// Error returned when parsing a [`ChainType`] or [`DataKind`] from a string.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("unrecognized {kind}: {value}")]
pub struct ParseChainError {
    /// What was being parsed ("chain" or "data kind").
    pub kind: &'static str,
    /// The offending input.
    pub value: String,
}

impl FromStr for ChainType {
    type Err = ParseChainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "ethereum" | "eth" => Ok(Self::Ethereum),
            "bitcoin" | "btc" => Ok(Self::Bitcoin),
            other => Err(ParseChainError { kind: "chain", value: other.to_string() }),
        }
    }
}

/// The classes of indexed data a maintenance operation can target.
///
/// Used by the cleaner to scope deletes; `Full` covers everything reachable
/// from a header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataKind {
    /// All data for the block range.
    Full,
    /// Headers (cleaning headers implies cleaning everything below them).
    Headers,
    /// Uncle headers (Ethereum only).
    Uncles,
    /// Transactions, including their receipts / inputs / outputs.
    Transactions,
    /// Receipts (Ethereum only).
    Receipts,
    /// State trie nodes (Ethereum only).
    State,
    /// Storage trie nodes (Ethereum only).
    Storage,
}

impl fmt::Display for DataKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Full => "full",
            Self::Headers => "headers",
            Self::Uncles => "uncles",
            Self::Transactions => "transactions",
            Self::Receipts => "receipts",
            Self::State => "state",
            Self::Storage => "storage",
        };
        write!(f, "{s}")
    }
}

impl FromStr for DataKind {
    type Err = ParseChainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "full" => Ok(Self::Full),
            "headers" | "header" => Ok(Self::Headers),
            "uncles" | "uncle" => Ok(Self::Uncles),
            "transactions" | "transaction" | "txs" => Ok(Self::Transactions),
            "receipts" | "receipt" | "rcts" => Ok(Self::Receipts),
            "state" => Ok(Self::State),
            "storage" => Ok(Self::Storage),
            other => Err(ParseChainError { kind: "data kind", value: other.to_string() }),
        }
    }
}

/// An inclusive range of block heights with no indexed header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Gap {
    /// First missing height.
    pub start: u64,
    /// Last missing height.
    pub stop: u64,
}

/// Collapses a sorted list of heights into contiguous inclusive ranges.
///
/// Used to turn under-validated header heights into resync-able [`Gap`]s.
pub fn contiguous_ranges(heights: &[u64]) -> Vec<Gap> {
    let mut gaps = Vec::new();
    let Some(&first) = heights.first() else {
        return gaps;
    };
    let mut start = first;
    let mut prev = first;
    for &height in &heights[1..] {
        if height != prev + 1 {
            gaps.push(Gap { start, stop: prev });
            start = height;
        }
        prev = height;
    }
    gaps.push(Gap { start, stop: prev });
    gaps
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chain_round_trips_through_str() {
        assert_eq!("ethereum".parse::<ChainType>().unwrap(), ChainType::Ethereum);
        assert_eq!("btc".parse::<ChainType>().unwrap(), ChainType::Bitcoin);
        assert_eq!(ChainType::Ethereum.to_string(), "ethereum");
        assert!("dogecoin".parse::<ChainType>().is_err());
    }

    #[test]
    fn data_kind_parses_aliases() {
        assert_eq!("txs".parse::<DataKind>().unwrap(), DataKind::Transactions);
        assert_eq!("rcts".parse::<DataKind>().unwrap(), DataKind::Receipts);
    }

    #[test]
    fn contiguous_ranges_groups_runs() {
        assert_eq!(contiguous_ranges(&[]), vec![]);
        assert_eq!(contiguous_ranges(&[5]), vec![Gap { start: 5, stop: 5 }]);
        assert_eq!(
            contiguous_ranges(&[1, 2, 3, 7, 8, 12]),
            vec![
                Gap { start: 1, stop: 3 },
                Gap { start: 7, stop: 8 },
                Gap { start: 12, stop: 12 }
            ]
        );
    }
}
