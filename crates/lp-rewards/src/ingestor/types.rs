use crate::serializer;
use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::{fmt, str::FromStr};
use thiserror::Error;

/// Raw token amount in the token's smallest unit
pub type Amount = u128;

/// 20-byte account or contract address
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Address([u8; 20]);

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AddressParseError {
    #[error("invalid hex in address '{0}'")]
    Hex(String),
    #[error("address '{0}' must be 20 bytes")]
    Length(String),
}

impl Address {
    /// Mint/burn sentinel
    pub const ZERO: Address = Address([0u8; 20]);

    pub const fn new(bytes: [u8; 20]) -> Self {
        Self(bytes)
    }

    pub fn is_zero(&self) -> bool {
        *self == Self::ZERO
    }

    pub fn as_bytes(&self) -> &[u8; 20] {
        &self.0
    }
}

impl FromStr for Address {
    type Err = AddressParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let digits = trimmed
            .strip_prefix("0x")
            .or_else(|| trimmed.strip_prefix("0X"))
            .unwrap_or(trimmed);
        let bytes = hex::decode(digits).map_err(|_| AddressParseError::Hex(s.to_string()))?;
        let bytes: [u8; 20] = bytes
            .try_into()
            .map_err(|_| AddressParseError::Length(s.to_string()))?;
        Ok(Self(bytes))
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

impl Serialize for Address {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Address {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Address::from_str(&s).map_err(serde::de::Error::custom)
    }
}

/// A single pool-share token transfer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transfer {
    pub from: Address,
    pub to: Address,
    #[serde(with = "serializer::u128_string")]
    pub amount: Amount,
    pub block: u64,
    /// Position of the log within its block; breaks ties between same-block transfers
    #[serde(default)]
    pub log_index: u32,
    #[serde(default)]
    pub tx_hash: String,
}

impl Transfer {
    /// Stable identifier used to deduplicate overlapping fetches
    pub fn event_id(&self) -> String {
        format!("{}:{}", self.tx_hash, self.log_index)
    }

    /// Ordering key: block, then log emission order
    pub fn sort_key(&self) -> (u64, u32) {
        (self.block, self.log_index)
    }
}

/// Price of one pool share from `block` onwards
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValuePoint {
    pub block: u64,
    pub value: Decimal,
}

/// Pool totals observed at a block
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolSnapshot {
    pub block: u64,
    pub total_liquidity: Decimal,
    /// Outstanding shares, in whole share units
    pub total_shares: Decimal,
}

impl PoolSnapshot {
    /// Value of a single share; an empty pool is worth nothing
    pub fn share_value(&self) -> Decimal {
        if self.total_shares.is_zero() {
            return Decimal::ZERO;
        }
        self.total_liquidity
            .checked_div(self.total_shares)
            .unwrap_or(Decimal::ZERO)
    }

    pub fn value_point(&self) -> ValuePoint {
        ValuePoint {
            block: self.block,
            value: self.share_value(),
        }
    }
}
