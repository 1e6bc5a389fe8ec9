use crate::{
    calculator::constants::MAX_DECIMAL_SCALE,
    error::{EngineError, Result},
    ingestor::types::{Address, Amount},
};
use rust_decimal::Decimal;
use serde::Serialize;
use tabled::{Table, Tabled, settings::Style};

/// Convert a raw token amount into whole share units
pub fn shares_to_decimal(amount: Amount, decimals: u32) -> Result<Decimal> {
    if decimals > MAX_DECIMAL_SCALE {
        return Err(EngineError::InvalidParameter(format!(
            "share decimals must not exceed {MAX_DECIMAL_SCALE}, got {decimals}"
        )));
    }
    let raw = i128::try_from(amount).map_err(|_| EngineError::Overflow("share amount"))?;
    Decimal::try_from_i128_with_scale(raw, decimals).map_err(|_| EngineError::Overflow("share amount"))
}

/// Sum a slice of decimals, failing on overflow
pub fn checked_sum(values: &[Decimal], what: &'static str) -> Result<Decimal> {
    values.iter().try_fold(Decimal::ZERO, |acc, v| {
        acc.checked_add(*v).ok_or(EngineError::Overflow(what))
    })
}

/// Per-pool overview printed after each period
#[derive(Debug, Clone, Tabled, Serialize)]
pub struct PoolSummary {
    pub pool: Address,
    pub holders: usize,
    pub total_contribution: Decimal,
    pub mean_diversity: Decimal,
    pub mean_loyalty: Decimal,
}

/// Per-address overview of the allocation
#[derive(Debug, Clone, Tabled, Serialize)]
pub struct PayoutSummary {
    pub address: Address,
    pub weighted_contribution: Decimal,
    pub payout: Decimal,
}

pub fn print_pool_summaries(summaries: &[PoolSummary]) -> String {
    Table::new(summaries)
        .with(Style::psql().remove_horizontals())
        .to_string()
}

pub fn print_payout_summaries(summaries: &[PayoutSummary]) -> String {
    Table::new(summaries)
        .with(Style::psql().remove_horizontals())
        .to_string()
}

/// Mean of the entries belonging to holders (non-zero contribution)
pub fn holder_mean(values: &[Decimal], contributions: &[Decimal]) -> Decimal {
    let mut sum = Decimal::ZERO;
    let mut count = 0u64;
    for (value, contribution) in values.iter().zip(contributions) {
        if contribution.is_zero() {
            continue;
        }
        sum = sum.saturating_add(*value);
        count += 1;
    }
    if count == 0 {
        return Decimal::ZERO;
    }
    sum / Decimal::from(count)
}
