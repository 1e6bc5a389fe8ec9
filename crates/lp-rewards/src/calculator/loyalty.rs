use crate::{
    calculator::index::AddressIndex,
    error::{EngineError, Result},
    ingestor::types::{Address, Amount, Transfer},
    serializer,
};
use rust_decimal::{Decimal, MathematicalOps};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::debug;

/// A retained deposit and the multiplier it has earned so far
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tranche {
    #[serde(with = "serializer::u128_string")]
    pub amount: Amount,
    pub multiplier: Decimal,
}

/// Deposit tranches of one address, oldest first.
///
/// Withdrawals consume the most recent deposits first, so funds that stay
/// put keep the multiplier they accumulated.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TimeStack {
    tranches: Vec<Tranche>,
}

// key: holder address
pub type StackMap = BTreeMap<Address, TimeStack>;

impl TimeStack {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_tranches(tranches: Vec<Tranche>) -> Self {
        Self { tranches }
    }

    pub fn tranches(&self) -> &[Tranche] {
        &self.tranches
    }

    pub fn is_empty(&self) -> bool {
        self.tranches.is_empty()
    }

    /// Total stacked amount; equals the holder's balance
    pub fn total(&self) -> Amount {
        self.tranches.iter().map(|t| t.amount).sum()
    }

    /// Scale every tranche's multiplier at a period boundary
    pub fn grow(&mut self, factor: Decimal) -> Result<()> {
        for tranche in &mut self.tranches {
            tranche.multiplier = tranche
                .multiplier
                .checked_mul(factor)
                .ok_or(EngineError::Overflow("loyalty multiplier growth"))?;
        }
        Ok(())
    }

    pub fn deposit(&mut self, amount: Amount) {
        if amount == 0 {
            return;
        }
        self.tranches.push(Tranche {
            amount,
            multiplier: Decimal::ONE,
        });
    }

    /// Take `amount` off the top of the stack; never clamps
    pub fn withdraw(&mut self, amount: Amount, address: &Address, block: u64) -> Result<()> {
        let available = self.total();
        if amount > available {
            return Err(EngineError::WithdrawalExceedsStack {
                address: *address,
                block,
                requested: amount,
                available,
            });
        }

        let mut remaining = amount;
        while remaining > 0 {
            let Some(top) = self.tranches.last_mut() else {
                break;
            };
            if top.amount > remaining {
                top.amount -= remaining;
                remaining = 0;
            } else {
                remaining -= top.amount;
                self.tranches.pop();
            }
        }
        Ok(())
    }

    /// Amount-weighted mean multiplier; 1 for an empty stack
    pub fn multiplier(&self) -> Result<Decimal> {
        let total = self.total();
        if total == 0 {
            return Ok(Decimal::ONE);
        }
        let total = amount_to_decimal(total)?;

        let mut weighted = Decimal::ZERO;
        for tranche in &self.tranches {
            weighted = amount_to_decimal(tranche.amount)?
                .checked_mul(tranche.multiplier)
                .and_then(|w| weighted.checked_add(w))
                .ok_or(EngineError::Overflow("loyalty multiplier"))?;
        }
        weighted
            .checked_div(total)
            .ok_or(EngineError::Overflow("loyalty multiplier"))
    }
}

/// How the per-period growth factor applies to a period of a given length
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum GrowthPolicy {
    /// Full growth at every period boundary, whatever the period length
    #[default]
    PerPeriod,
    /// `growth ^ (period_blocks / nominal_period_blocks)`
    Proportional { nominal_period_blocks: u64 },
}

impl GrowthPolicy {
    pub fn effective_factor(&self, growth: Decimal, period_blocks: u64) -> Result<Decimal> {
        match self {
            GrowthPolicy::PerPeriod => Ok(growth),
            GrowthPolicy::Proportional {
                nominal_period_blocks,
            } => {
                if *nominal_period_blocks == 0 {
                    return Err(EngineError::InvalidParameter(
                        "nominal period length must be positive".to_string(),
                    ));
                }
                if period_blocks == *nominal_period_blocks {
                    return Ok(growth);
                }
                let exponent = Decimal::from(period_blocks)
                    .checked_div(Decimal::from(*nominal_period_blocks))
                    .ok_or(EngineError::Overflow("growth exponent"))?;
                growth
                    .checked_powd(exponent)
                    .ok_or(EngineError::Overflow("proportional growth"))
            }
        }
    }
}

/// Loyalty stacks of one pool persisted at the end of a period
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoyaltySnapshot {
    pub pool: Address,
    pub end_block: u64,
    pub stacks: StackMap,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LoyaltyOutcome {
    /// Aligned with the address index passed to [`advance`]
    pub multipliers: Vec<Decimal>,
    pub stacks: StackMap,
}

/// Carry loyalty stacks across one period.
///
/// Prior stacks are grown by `growth`, then the period's transfers in
/// `[start_block, end_block)` are replayed in `(block, log_index)` order:
/// incoming transfers push a fresh tranche, outgoing ones consume from the
/// top. Holders from `prior` absent from `addresses` are carried over as well.
/// Empty stacks are dropped from the returned state.
pub fn advance(
    transfers: &[Transfer],
    addresses: &AddressIndex,
    prior: &StackMap,
    start_block: u64,
    end_block: u64,
    growth: Decimal,
) -> Result<LoyaltyOutcome> {
    if end_block < start_block {
        return Err(EngineError::InvalidRange {
            start: start_block,
            end: end_block,
        });
    }
    if growth < Decimal::ONE {
        return Err(EngineError::InvalidParameter(format!(
            "loyalty growth factor must be at least 1, got {growth}"
        )));
    }

    let mut stacks = StackMap::new();
    for (address, stack) in prior {
        let mut grown = stack.clone();
        grown.grow(growth)?;
        stacks.insert(*address, grown);
    }

    let mut period: Vec<&Transfer> = transfers
        .iter()
        .filter(|t| t.block >= start_block && t.block < end_block)
        .collect();
    period.sort_by_key(|t| t.sort_key());

    for transfer in period {
        if transfer.amount == 0 || transfer.from == transfer.to {
            continue;
        }
        if !transfer.from.is_zero() {
            stacks.entry(transfer.from).or_default().withdraw(
                transfer.amount,
                &transfer.from,
                transfer.block,
            )?;
        }
        if !transfer.to.is_zero() {
            stacks.entry(transfer.to).or_default().deposit(transfer.amount);
        }
    }

    let mut multipliers = Vec::with_capacity(addresses.len());
    for address in addresses.iter() {
        let multiplier = match stacks.get(address) {
            Some(stack) => stack.multiplier()?,
            None => Decimal::ONE,
        };
        multipliers.push(multiplier);
    }

    stacks.retain(|_, stack| !stack.is_empty());
    debug!(
        "Advanced loyalty stacks over blocks [{}, {}): {} holders carried forward",
        start_block,
        end_block,
        stacks.len()
    );

    Ok(LoyaltyOutcome {
        multipliers,
        stacks,
    })
}

fn amount_to_decimal(amount: Amount) -> Result<Decimal> {
    let raw = i128::try_from(amount).map_err(|_| EngineError::Overflow("stacked amount"))?;
    Decimal::try_from_i128_with_scale(raw, 0).map_err(|_| EngineError::Overflow("stacked amount"))
}
