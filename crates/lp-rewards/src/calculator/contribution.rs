use crate::{
    calculator::{index::AddressIndex, ledger::BalanceLedger, util::shares_to_decimal, value_curve::ValueCurve},
    error::{EngineError, Result},
    ingestor::types::{Address, Transfer},
};
use rust_decimal::Decimal;
use tracing::debug;

/// Value-weighted balance integral of `address` over the curve's range:
/// `Σ_block shares(address, block) * value(block)`.
///
/// Computed per constant-balance run as `shares * Σ value(run)`.
pub fn contribution_of(
    ledger: &BalanceLedger<'_>,
    curve: &ValueCurve,
    address: &Address,
    share_decimals: u32,
) -> Result<Decimal> {
    if !ledger.has_history(address) {
        return Ok(Decimal::ZERO);
    }

    let runs = ledger.balance_runs(address, curve.start_block(), curve.end_block())?;
    let mut total = Decimal::ZERO;
    for run in runs {
        if run.balance == 0 {
            continue;
        }
        let shares = shares_to_decimal(run.balance, share_decimals)?;
        let value_sum = curve.segment_sum(run.from_block, run.to_block)?;
        let weighted = shares
            .checked_mul(value_sum)
            .ok_or(EngineError::Overflow("contribution"))?;
        total = total
            .checked_add(weighted)
            .ok_or(EngineError::Overflow("contribution"))?;
    }
    Ok(total)
}

/// Same integral as [`contribution_of`], walking the explicit per-block
/// balance series. Kept for verification of the run-length path.
pub fn dense_contribution_of(
    ledger: &BalanceLedger<'_>,
    curve: &ValueCurve,
    address: &Address,
    share_decimals: u32,
) -> Result<Decimal> {
    let balances = ledger.dense_balances(address, curve.start_block(), curve.end_block())?;
    if balances.len() != curve.len() {
        return Err(EngineError::LengthMismatch {
            what: "balance series",
            expected: curve.len(),
            actual: balances.len(),
        });
    }

    let mut total = Decimal::ZERO;
    for (balance, value) in balances.iter().zip(curve.values()) {
        if *balance == 0 {
            continue;
        }
        let weighted = shares_to_decimal(*balance, share_decimals)?
            .checked_mul(*value)
            .ok_or(EngineError::Overflow("contribution"))?;
        total = total
            .checked_add(weighted)
            .ok_or(EngineError::Overflow("contribution"))?;
    }
    Ok(total)
}

/// Contribution of a single address straight from a pool's transfer log
pub fn compute_contribution(
    transfers: &[Transfer],
    curve: &ValueCurve,
    address: &Address,
    share_decimals: u32,
) -> Result<Decimal> {
    let ledger = BalanceLedger::new(transfers);
    contribution_of(&ledger, curve, address, share_decimals)
}

/// Contribution vector aligned with `index`; addresses that never touched
/// this pool stay at zero without replaying anything
pub fn contribution_vector(
    ledger: &BalanceLedger<'_>,
    curve: &ValueCurve,
    index: &AddressIndex,
    share_decimals: u32,
) -> Result<Vec<Decimal>> {
    let mut vector = vec![Decimal::ZERO; index.len()];
    let mut holders = 0usize;
    for (position, address) in index.iter().enumerate() {
        if !ledger.has_history(address) {
            continue;
        }
        vector[position] = contribution_of(ledger, curve, address, share_decimals)?;
        holders += 1;
    }
    debug!(
        "Computed contributions for {} of {} addresses over blocks [{}, {})",
        holders,
        index.len(),
        curve.start_block(),
        curve.end_block()
    );
    Ok(vector)
}
