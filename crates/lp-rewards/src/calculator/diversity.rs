use crate::{
    error::{EngineError, Result},
    ingestor::types::Address,
};
use rust_decimal::Decimal;
use std::collections::BTreeMap;

/// Per-pool vectors aligned with the period's address index
pub type PoolVectors = BTreeMap<Address, Vec<Decimal>>;

/// Weight of each other-pool term: `(max_multiplier - 1) / (num_pools - 1)`.
///
/// With a single pool there is nothing to diversify into and the boost is 0.
pub fn diversity_boost(max_multiplier: Decimal, num_pools: usize) -> Result<Decimal> {
    if num_pools == 0 {
        return Err(EngineError::NoPools);
    }
    if max_multiplier < Decimal::ONE {
        return Err(EngineError::InvalidParameter(format!(
            "diversity max multiplier must be at least 1, got {max_multiplier}"
        )));
    }
    if num_pools == 1 {
        return Ok(Decimal::ZERO);
    }
    (max_multiplier - Decimal::ONE)
        .checked_div(Decimal::from(num_pools as u64 - 1))
        .ok_or(EngineError::Overflow("diversity boost"))
}

/// Cross-pool diversity multiplier.
///
/// For pool `p` and address `i`:
/// `M_p[i] = 1 + boost * Σ_{q ≠ p} min(1, Y_q[i] / Y_p[i])`, where a zero
/// `Y_p[i]` makes every term 0. An address spread evenly over all pools
/// reaches `max_multiplier`; one concentrated in a single pool stays at 1.
pub fn compute_diversity(
    contribution_by_pool: &PoolVectors,
    max_multiplier: Decimal,
) -> Result<PoolVectors> {
    let boost = diversity_boost(max_multiplier, contribution_by_pool.len())?;
    let len = contribution_by_pool
        .values()
        .next()
        .map(Vec::len)
        .unwrap_or_default();
    for vector in contribution_by_pool.values() {
        if vector.len() != len {
            return Err(EngineError::LengthMismatch {
                what: "contribution vector",
                expected: len,
                actual: vector.len(),
            });
        }
    }

    let mut multipliers = PoolVectors::new();
    for (pool, own) in contribution_by_pool {
        let mut vector = Vec::with_capacity(len);
        for (i, yp) in own.iter().enumerate() {
            let mut spread = Decimal::ZERO;
            if !yp.is_zero() {
                for (other_pool, other) in contribution_by_pool {
                    if other_pool == pool {
                        continue;
                    }
                    // capped at 1
                    let term = if other[i] >= *yp {
                        Decimal::ONE
                    } else {
                        // below 1, so a failed division can only be underflow
                        other[i].checked_div(*yp).unwrap_or(Decimal::ZERO)
                    };
                    spread = spread
                        .checked_add(term)
                        .ok_or(EngineError::Overflow("diversity spread"))?;
                }
            }
            let multiplier = boost
                .checked_mul(spread)
                .and_then(|b| b.checked_add(Decimal::ONE))
                .ok_or(EngineError::Overflow("diversity multiplier"))?;
            vector.push(multiplier);
        }
        multipliers.insert(*pool, vector);
    }

    Ok(multipliers)
}
