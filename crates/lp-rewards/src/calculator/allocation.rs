use crate::{
    calculator::{
        constants::NORMALIZATION_TOLERANCE, diversity::PoolVectors, index::AddressIndex,
        util::checked_sum,
    },
    error::{EngineError, Result},
    ingestor::types::Address,
};
use rust_decimal::Decimal;
use std::collections::BTreeMap;

/// Payout per address, keyed for stable iteration
pub type PayoutMap = BTreeMap<Address, Decimal>;

/// Weighted contribution `F = Σ_p Y_p ⊙ D_p ⊙ L_p`.
///
/// Every pool of `contribution_by_pool` must have a diversity and a loyalty
/// vector of the same length.
pub fn combine(
    contribution_by_pool: &PoolVectors,
    diversity_by_pool: &PoolVectors,
    loyalty_by_pool: &PoolVectors,
) -> Result<Vec<Decimal>> {
    let Some(len) = contribution_by_pool.values().next().map(Vec::len) else {
        return Err(EngineError::NoPools);
    };

    let mut combined = vec![Decimal::ZERO; len];
    for (pool, contribution) in contribution_by_pool {
        let diversity = diversity_by_pool
            .get(pool)
            .ok_or(EngineError::MissingPool {
                pool: *pool,
                what: "diversity",
            })?;
        let loyalty = loyalty_by_pool.get(pool).ok_or(EngineError::MissingPool {
            pool: *pool,
            what: "loyalty",
        })?;

        for (what, vector) in [
            ("contribution vector", contribution),
            ("diversity vector", diversity),
            ("loyalty vector", loyalty),
        ] {
            if vector.len() != len {
                return Err(EngineError::LengthMismatch {
                    what,
                    expected: len,
                    actual: vector.len(),
                });
            }
        }

        for i in 0..len {
            let term = contribution[i]
                .checked_mul(diversity[i])
                .and_then(|t| t.checked_mul(loyalty[i]))
                .ok_or(EngineError::Overflow("weighted contribution"))?;
            combined[i] = combined[i]
                .checked_add(term)
                .ok_or(EngineError::Overflow("weighted contribution"))?;
        }
    }
    Ok(combined)
}

/// Scale `weights` to sum to one.
///
/// Fails if nothing is positive, or if rounding pushes the sum further than
/// [`NORMALIZATION_TOLERANCE`] from one.
pub fn normalize(weights: &[Decimal]) -> Result<Vec<Decimal>> {
    let total = checked_sum(weights, "weight total")?;
    if total <= Decimal::ZERO {
        return Err(EngineError::DegenerateAllocation);
    }

    let mut normalized = Vec::with_capacity(weights.len());
    for weight in weights {
        normalized.push(
            weight
                .checked_div(total)
                .ok_or(EngineError::Overflow("normalized weight"))?,
        );
    }

    let sum = checked_sum(&normalized, "normalized total")?;
    if (sum - Decimal::ONE).abs() > NORMALIZATION_TOLERANCE {
        return Err(EngineError::NormalizationDrift { sum });
    }
    Ok(normalized)
}

/// Split `budget` proportionally to the weighted contribution.
///
/// Returns the weighted contribution alongside the payout vector, both aligned
/// with the address index of the inputs.
pub fn allocate(
    contribution_by_pool: &PoolVectors,
    diversity_by_pool: &PoolVectors,
    loyalty_by_pool: &PoolVectors,
    budget: Decimal,
) -> Result<Allocation> {
    if budget < Decimal::ZERO {
        return Err(EngineError::InvalidParameter(format!(
            "budget must not be negative, got {budget}"
        )));
    }

    let weighted = combine(contribution_by_pool, diversity_by_pool, loyalty_by_pool)?;
    let shares = normalize(&weighted)?;
    let mut payouts = Vec::with_capacity(shares.len());
    for share in shares {
        payouts.push(
            share
                .checked_mul(budget)
                .ok_or(EngineError::Overflow("payout"))?,
        );
    }

    Ok(Allocation { weighted, payouts })
}

#[derive(Debug, Clone, PartialEq)]
pub struct Allocation {
    pub weighted: Vec<Decimal>,
    pub payouts: Vec<Decimal>,
}

impl Allocation {
    /// Key the payout vector by address
    pub fn to_map(&self, index: &AddressIndex) -> Result<PayoutMap> {
        if self.payouts.len() != index.len() {
            return Err(EngineError::LengthMismatch {
                what: "payout vector",
                expected: index.len(),
                actual: self.payouts.len(),
            });
        }
        Ok(index.iter().copied().zip(self.payouts.iter().copied()).collect())
    }
}

/// Fold one sub-period's payouts into a running cumulative map
pub fn accumulate(cumulative: &mut PayoutMap, period: &PayoutMap) -> Result<()> {
    for (address, amount) in period {
        let entry = cumulative.entry(*address).or_insert(Decimal::ZERO);
        *entry = entry
            .checked_add(*amount)
            .ok_or(EngineError::Overflow("cumulative payout"))?;
    }
    Ok(())
}

/// Incremental payout: `current - previous`, aligned by address over the
/// current map's addresses. Addresses missing from `previous` count as 0.
pub fn subtract_cumulative(current: &PayoutMap, previous: &PayoutMap) -> Result<PayoutMap> {
    let mut incremental = PayoutMap::new();
    for (address, amount) in current {
        let already_paid = previous.get(address).copied().unwrap_or(Decimal::ZERO);
        let delta = amount
            .checked_sub(already_paid)
            .ok_or(EngineError::Overflow("incremental payout"))?;
        incremental.insert(*address, delta);
    }
    Ok(incremental)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::dec;

    fn pool(byte: u8) -> Address {
        let mut bytes = [0u8; 20];
        bytes[0] = byte;
        Address::new(bytes)
    }

    fn addr(byte: u8) -> Address {
        let mut bytes = [0u8; 20];
        bytes[19] = byte;
        Address::new(bytes)
    }

    fn ones(len: usize) -> Vec<Decimal> {
        vec![Decimal::ONE; len]
    }

    #[test]
    fn test_combine_sums_over_pools() {
        let mut contribution = PoolVectors::new();
        contribution.insert(pool(1), vec![dec!(10), dec!(0)]);
        contribution.insert(pool(2), vec![dec!(4), dec!(6)]);
        let mut diversity = PoolVectors::new();
        diversity.insert(pool(1), vec![dec!(1.2), dec!(1)]);
        diversity.insert(pool(2), vec![dec!(1.5), dec!(1)]);
        let mut loyalty = PoolVectors::new();
        loyalty.insert(pool(1), vec![dec!(1), dec!(1)]);
        loyalty.insert(pool(2), vec![dec!(2), dec!(1.1)]);

        let combined = combine(&contribution, &diversity, &loyalty).unwrap();
        // 10*1.2*1 + 4*1.5*2 = 24; 0 + 6*1*1.1 = 6.6
        assert_eq!(combined, vec![dec!(24), dec!(6.6)]);
    }

    #[test]
    fn test_combine_requires_every_pool() {
        let mut contribution = PoolVectors::new();
        contribution.insert(pool(1), ones(2));
        let diversity = PoolVectors::new();
        let mut loyalty = PoolVectors::new();
        loyalty.insert(pool(1), ones(2));

        assert_eq!(
            combine(&contribution, &diversity, &loyalty),
            Err(EngineError::MissingPool {
                pool: pool(1),
                what: "diversity"
            })
        );
        assert_eq!(
            combine(&PoolVectors::new(), &diversity, &loyalty),
            Err(EngineError::NoPools)
        );
    }

    #[test]
    fn test_combine_rejects_misaligned_vectors() {
        let mut contribution = PoolVectors::new();
        contribution.insert(pool(1), ones(3));
        let mut diversity = PoolVectors::new();
        diversity.insert(pool(1), ones(3));
        let mut loyalty = PoolVectors::new();
        loyalty.insert(pool(1), ones(2));

        assert_eq!(
            combine(&contribution, &diversity, &loyalty),
            Err(EngineError::LengthMismatch {
                what: "loyalty vector",
                expected: 3,
                actual: 2
            })
        );
    }

    #[test]
    fn test_normalize_sums_to_one() {
        let normalized = normalize(&[dec!(1), dec!(1), dec!(1)]).unwrap();
        let sum: Decimal = normalized.iter().sum();
        assert!((sum - Decimal::ONE).abs() <= NORMALIZATION_TOLERANCE);

        let normalized = normalize(&[dec!(3), Decimal::ZERO, dec!(1)]).unwrap();
        assert_eq!(normalized, vec![dec!(0.75), Decimal::ZERO, dec!(0.25)]);
    }

    #[test]
    fn test_degenerate_allocation() {
        assert_eq!(
            normalize(&[Decimal::ZERO, Decimal::ZERO]),
            Err(EngineError::DegenerateAllocation)
        );
        assert_eq!(normalize(&[]), Err(EngineError::DegenerateAllocation));
    }

    #[test]
    fn test_allocate_budget() {
        let mut contribution = PoolVectors::new();
        contribution.insert(pool(1), vec![dec!(2000), dec!(500), Decimal::ZERO]);
        let mut neutral = PoolVectors::new();
        neutral.insert(pool(1), ones(3));

        let allocation = allocate(&contribution, &neutral, &neutral, dec!(1000)).unwrap();
        assert_eq!(allocation.payouts, vec![dec!(800), dec!(200), Decimal::ZERO]);
        assert_eq!(allocation.weighted, vec![dec!(2000), dec!(500), Decimal::ZERO]);

        let index = AddressIndex::from_addresses([addr(1), addr(2), addr(3)]);
        let map = allocation.to_map(&index).unwrap();
        assert_eq!(map[&addr(1)], dec!(800));
        assert_eq!(map.len(), 3);

        assert!(allocation.to_map(&AddressIndex::default()).is_err());
        assert!(allocate(&contribution, &neutral, &neutral, dec!(-1)).is_err());
    }

    #[test]
    fn test_accumulate_and_subtract() {
        let mut cumulative = PayoutMap::new();
        let mut week_one = PayoutMap::new();
        week_one.insert(addr(1), dec!(60));
        week_one.insert(addr(2), dec!(40));
        let mut week_two = PayoutMap::new();
        week_two.insert(addr(1), dec!(50));
        week_two.insert(addr(3), dec!(50));

        accumulate(&mut cumulative, &week_one).unwrap();
        let previous = cumulative.clone();
        accumulate(&mut cumulative, &week_two).unwrap();

        assert_eq!(cumulative[&addr(1)], dec!(110));
        assert_eq!(cumulative[&addr(2)], dec!(40));
        assert_eq!(cumulative[&addr(3)], dec!(50));

        let incremental = subtract_cumulative(&cumulative, &previous).unwrap();
        assert_eq!(incremental[&addr(1)], dec!(50));
        assert_eq!(incremental[&addr(2)], Decimal::ZERO);
        // absent from the previous report
        assert_eq!(incremental[&addr(3)], dec!(50));
    }
}
