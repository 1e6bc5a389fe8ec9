use crate::ingestor::types::{Address, Amount};
use rust_decimal::Decimal;
use thiserror::Error;

pub type Result<T = ()> = std::result::Result<T, EngineError>;

/// Fatal conditions raised by the allocation engine.
///
/// Every variant aborts the run: they indicate missing or malformed upstream
/// events (or an unusable configuration), never a transient condition.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum EngineError {
    #[error("balance of {address} would go negative at block {block}: holds {balance}, sends {amount}")]
    NegativeBalance {
        address: Address,
        block: u64,
        balance: Amount,
        amount: Amount,
    },
    #[error("withdrawal of {requested} by {address} at block {block} exceeds stacked amount {available}")]
    WithdrawalExceedsStack {
        address: Address,
        block: u64,
        requested: Amount,
        available: Amount,
    },
    #[error("loyalty stack of {address} holds {stacked} but its balance at block {block} is {balance}")]
    StackBalanceMismatch {
        address: Address,
        block: u64,
        stacked: Amount,
        balance: Amount,
    },
    #[error("{what} has length {actual}, expected {expected}")]
    LengthMismatch {
        what: &'static str,
        expected: usize,
        actual: usize,
    },
    #[error("value points are not strictly increasing: block {block} follows block {previous}")]
    NonMonotonicValuePoints { previous: u64, block: u64 },
    #[error("invalid block range [{start}, {end})")]
    InvalidRange { start: u64, end: u64 },
    #[error("normalized allocation sums to {sum}, expected 1")]
    NormalizationDrift { sum: Decimal },
    #[error("no address has a positive weighted contribution")]
    DegenerateAllocation,
    #[error("at least one pool is required")]
    NoPools,
    #[error("pool {pool} is missing from the {what} vectors")]
    MissingPool { pool: Address, what: &'static str },
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),
    #[error("arithmetic overflow while computing {0}")]
    Overflow(&'static str),
    #[error("spot check of {what} failed at block {block}: expected {expected}, found {found}")]
    SpotCheckMismatch {
        what: String,
        block: u64,
        expected: String,
        found: String,
    },
}
