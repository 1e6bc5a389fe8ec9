//! Spot checks of rebuilt series against independent point queries.

use crate::{
    calculator::{ledger::BalanceLedger, value_curve::ValueCurve},
    error::EngineError,
    ingestor::{
        fetcher::{Fetcher, LedgerSource},
        types::Address,
    },
};
use anyhow::{Context, Result};
use rand::Rng;
use std::collections::BTreeSet;
use tracing::{debug, info};

/// Up to `samples` distinct blocks drawn from `[start_block, end_block)`, ascending
pub fn sample_blocks<R: Rng>(
    start_block: u64,
    end_block: u64,
    samples: usize,
    rng: &mut R,
) -> Vec<u64> {
    if end_block <= start_block {
        return Vec::new();
    }
    let span = end_block - start_block;
    if samples as u64 >= span {
        return (start_block..end_block).collect();
    }

    let mut picked = BTreeSet::new();
    while picked.len() < samples {
        picked.insert(rng.random_range(start_block..end_block));
    }
    picked.into_iter().collect()
}

/// Compare the rebuilt value curve with the source's pool state at `blocks`.
///
/// Returns the number of blocks checked; the first mismatch is an error.
pub async fn spot_check_values<S: LedgerSource>(
    fetcher: &Fetcher<S>,
    pool: Address,
    curve: &ValueCurve,
    blocks: &[u64],
) -> Result<usize> {
    let mut checked = 0;
    for block in blocks {
        let Some(expected) = curve.value_at(*block) else {
            continue;
        };
        let found = fetcher
            .fetch_pool_snapshot(pool, *block)
            .await
            .with_context(|| format!("Failed to read pool {pool} at block {block}"))?
            .share_value();
        if found != expected {
            return Err(EngineError::SpotCheckMismatch {
                what: format!("value of pool {pool}"),
                block: *block,
                expected: expected.to_string(),
                found: found.to_string(),
            }
            .into());
        }
        debug!("Pool {} value at block {} matches: {}", pool, block, found);
        checked += 1;
    }

    info!("Spot-checked {} value points of pool {}", checked, pool);
    Ok(checked)
}

/// Compare rebuilt balances of `address` with the source's `balance_of` at `blocks`
pub async fn spot_check_balances<S: LedgerSource>(
    fetcher: &Fetcher<S>,
    pool: Address,
    ledger: &BalanceLedger<'_>,
    address: &Address,
    blocks: &[u64],
) -> Result<usize> {
    let mut checked = 0;
    for block in blocks {
        let expected = ledger.balance_at(address, *block)?;
        let found = fetcher
            .fetch_balance(pool, *address, *block)
            .await
            .with_context(|| format!("Failed to read balance of {address} at block {block}"))?;
        if found != expected {
            return Err(EngineError::SpotCheckMismatch {
                what: format!("balance of {address}"),
                block: *block,
                expected: expected.to_string(),
                found: found.to_string(),
            }
            .into());
        }
        checked += 1;
    }

    debug!("Spot-checked {} balances of {}", checked, address);
    Ok(checked)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        calculator::value_curve::build_value_curve,
        ingestor::{
            fetcher::MockLedgerSource,
            types::{PoolSnapshot, Transfer, ValuePoint},
        },
        settings::FetchSettings,
    };
    use mockall::predicate::{always, eq};
    use rand::{SeedableRng, rngs::StdRng};
    use rust_decimal::dec;
    use std::{path::PathBuf, sync::Arc};

    fn fetch_settings() -> FetchSettings {
        FetchSettings {
            page_blocks: 100,
            max_records: 100,
            concurrency: 1,
            max_retries: 0,
            snapshot_dir: PathBuf::from("unused"),
        }
    }

    #[test]
    fn test_sample_blocks() {
        let mut rng = StdRng::seed_from_u64(7);
        let blocks = sample_blocks(100, 200, 10, &mut rng);
        assert_eq!(blocks.len(), 10);
        assert!(blocks.windows(2).all(|w| w[0] < w[1]));
        assert!(blocks.iter().all(|b| (100..200).contains(b)));

        assert_eq!(sample_blocks(5, 8, 10, &mut rng), vec![5, 6, 7]);
        assert!(sample_blocks(5, 5, 3, &mut rng).is_empty());
    }

    #[tokio::test]
    async fn test_spot_check_values() {
        let pool = Address::new([9u8; 20]);
        let curve = build_value_curve(
            &[ValuePoint {
                block: 15,
                value: dec!(2),
            }],
            dec!(1),
            10,
            20,
        )
        .unwrap();

        let mut source = MockLedgerSource::new();
        source.expect_pool_snapshot().returning(|_, block| {
            Ok(PoolSnapshot {
                block,
                total_liquidity: if block >= 15 { dec!(20) } else { dec!(10) },
                total_shares: dec!(10),
            })
        });
        let fetcher = Fetcher::new(Arc::new(source), fetch_settings());
        let checked = spot_check_values(&fetcher, pool, &curve, &[10, 14, 15, 19, 25])
            .await
            .unwrap();
        // block 25 lies outside the curve
        assert_eq!(checked, 4);
    }

    #[tokio::test]
    async fn test_spot_check_values_detects_missed_interaction() {
        let pool = Address::new([9u8; 20]);
        let curve = build_value_curve(&[], dec!(1), 10, 20).unwrap();

        let mut source = MockLedgerSource::new();
        source.expect_pool_snapshot().returning(|_, block| {
            Ok(PoolSnapshot {
                block,
                total_liquidity: if block >= 12 { dec!(30) } else { dec!(10) },
                total_shares: dec!(10),
            })
        });
        let fetcher = Fetcher::new(Arc::new(source), fetch_settings());
        let err = spot_check_values(&fetcher, pool, &curve, &[11, 13])
            .await
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<EngineError>(),
            Some(EngineError::SpotCheckMismatch { block: 13, .. })
        ));
    }

    #[tokio::test]
    async fn test_spot_check_balances() {
        let pool = Address::new([9u8; 20]);
        let holder = Address::new([1u8; 20]);
        let transfers = vec![
            Transfer {
                from: Address::ZERO,
                to: holder,
                amount: 50,
                block: 3,
                log_index: 0,
                tx_hash: "0x1".into(),
            },
            Transfer {
                from: holder,
                to: Address::ZERO,
                amount: 20,
                block: 8,
                log_index: 0,
                tx_hash: "0x2".into(),
            },
        ];
        let ledger = BalanceLedger::new(&transfers);

        let mut source = MockLedgerSource::new();
        source
            .expect_balance_of()
            .with(eq(pool), eq(holder), always())
            .returning(|_, _, block| {
                Ok(match block {
                    0..=2 => 0,
                    3..=7 => 50,
                    _ => 30,
                })
            });
        let fetcher = Fetcher::new(Arc::new(source), fetch_settings());
        assert_eq!(
            spot_check_balances(&fetcher, pool, &ledger, &holder, &[1, 3, 7, 8, 12])
                .await
                .unwrap(),
            5
        );

        let mut stale = MockLedgerSource::new();
        stale.expect_balance_of().returning(|_, _, _| Ok(50));
        let fetcher = Fetcher::new(Arc::new(stale), fetch_settings());
        let err = spot_check_balances(&fetcher, pool, &ledger, &holder, &[1])
            .await
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<EngineError>(),
            Some(EngineError::SpotCheckMismatch { block: 1, .. })
        ));
    }
}
