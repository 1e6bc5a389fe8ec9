use crate::{
    calculator::{
        allocation::{Allocation, PayoutMap, accumulate, allocate, subtract_cumulative},
        contribution::contribution_vector,
        data_prep::{PoolInputs, PreparedData},
        diversity::{PoolVectors, compute_diversity},
        index::AddressIndex,
        ledger::BalanceLedger,
        loyalty::{GrowthPolicy, LoyaltySnapshot, StackMap, advance},
        util::{PayoutSummary, PoolSummary, holder_mean, print_payout_summaries, print_pool_summaries},
    },
    error::{EngineError, Result as EngineResult},
    ingestor::{
        fetcher::{BlockClock, Fetcher, LedgerSource},
        paginate::with_retry,
        types::Address,
    },
    settings::Settings,
    store::state::{CumulativeReport, StateStore},
};
use anyhow::{Context, Result, ensure};
use itertools::Itertools;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::{
    collections::{BTreeMap, BTreeSet},
    sync::Arc,
};
use tracing::{debug, info};

/// Half-open block range `[start_block, end_block)`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Period {
    pub start_block: u64,
    pub end_block: u64,
}

impl Period {
    pub fn new(start_block: u64, end_block: u64) -> EngineResult<Self> {
        if end_block <= start_block {
            return Err(EngineError::InvalidRange {
                start: start_block,
                end: end_block,
            });
        }
        Ok(Self {
            start_block,
            end_block,
        })
    }

    pub fn blocks(&self) -> u64 {
        self.end_block - self.start_block
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EngineParams {
    pub budget: Decimal,
    pub diversity_max_multiplier: Decimal,
    pub growth_factor: Decimal,
    pub growth_policy: GrowthPolicy,
}

impl EngineParams {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            budget: settings.allocation.budget,
            diversity_max_multiplier: settings.allocation.diversity_max_multiplier,
            growth_factor: settings.loyalty.growth_factor,
            growth_policy: settings.loyalty.policy,
        }
    }
}

/// Result of one period; vectors are aligned with `index`
#[derive(Debug, Clone, PartialEq)]
pub struct PeriodOutcome {
    pub period: Period,
    pub index: AddressIndex,
    pub contribution: PoolVectors,
    pub diversity: PoolVectors,
    pub loyalty: PoolVectors,
    pub allocation: Allocation,
    pub payouts: PayoutMap,
    /// Loyalty stacks to persist at `period.end_block`
    pub snapshots: Vec<LoyaltySnapshot>,
}

impl PeriodOutcome {
    pub fn pool_summaries(&self) -> Vec<PoolSummary> {
        self.contribution
            .iter()
            .map(|(pool, contribution)| {
                let holders = contribution.iter().filter(|c| !c.is_zero()).count();
                let total = contribution
                    .iter()
                    .fold(Decimal::ZERO, |acc, c| acc.saturating_add(*c));
                let diversity = self.diversity.get(pool).map(Vec::as_slice).unwrap_or_default();
                let loyalty = self.loyalty.get(pool).map(Vec::as_slice).unwrap_or_default();
                PoolSummary {
                    pool: *pool,
                    holders,
                    total_contribution: total.round_dp(6),
                    mean_diversity: holder_mean(diversity, contribution).round_dp(6),
                    mean_loyalty: holder_mean(loyalty, contribution).round_dp(6),
                }
            })
            .collect()
    }

    /// Addresses with a positive weighted contribution, largest payout first
    pub fn payout_summaries(&self) -> Vec<PayoutSummary> {
        let mut summaries: Vec<PayoutSummary> = self
            .index
            .iter()
            .zip(self.allocation.weighted.iter().zip(&self.allocation.payouts))
            .filter(|(_, (weighted, _))| **weighted > Decimal::ZERO)
            .map(|(address, (weighted, payout))| PayoutSummary {
                address: *address,
                weighted_contribution: weighted.round_dp(6),
                payout: payout.round_dp(6),
            })
            .collect();
        summaries.sort_by(|a, b| b.payout.cmp(&a.payout).then(a.address.cmp(&b.address)));
        summaries
    }
}

/// Run the allocation engine over fully materialized pool inputs.
///
/// `prior` holds each pool's loyalty stacks saved at `period.start_block`.
/// A pool without prior stacks is bootstrapped by replaying its whole
/// transfer history into fresh tranches.
pub fn run_period(
    pools: &[PoolInputs],
    prior: &BTreeMap<Address, StackMap>,
    period: Period,
    params: &EngineParams,
) -> EngineResult<PeriodOutcome> {
    if pools.is_empty() {
        return Err(EngineError::NoPools);
    }
    let mut seen = BTreeSet::new();
    for inputs in pools {
        if !seen.insert(inputs.pool) {
            return Err(EngineError::InvalidParameter(format!(
                "pool {} supplied more than once",
                inputs.pool
            )));
        }
        if inputs.curve.start_block() != period.start_block
            || inputs.curve.end_block() != period.end_block
        {
            return Err(EngineError::InvalidParameter(format!(
                "value curve of pool {} covers [{}, {}), period is [{}, {})",
                inputs.pool,
                inputs.curve.start_block(),
                inputs.curve.end_block(),
                period.start_block,
                period.end_block
            )));
        }
    }

    let index = AddressIndex::from_transfers(pools.iter().flat_map(|p| p.transfers.iter()));
    let growth = params
        .growth_policy
        .effective_factor(params.growth_factor, period.blocks())?;

    let mut contribution = PoolVectors::new();
    let mut loyalty = PoolVectors::new();
    let mut snapshots = Vec::with_capacity(pools.len());

    for inputs in pools {
        let ledger = BalanceLedger::new(&inputs.transfers);
        contribution.insert(
            inputs.pool,
            contribution_vector(&ledger, &inputs.curve, &index, inputs.share_decimals)?,
        );

        let outcome = match prior.get(&inputs.pool) {
            Some(stacks) => advance(
                &inputs.transfers,
                &index,
                stacks,
                period.start_block,
                period.end_block,
                growth,
            )?,
            None => {
                debug!(
                    "No prior loyalty stacks for pool {}, replaying from genesis",
                    inputs.pool
                );
                advance(
                    &inputs.transfers,
                    &index,
                    &StackMap::new(),
                    0,
                    period.end_block,
                    growth,
                )?
            }
        };
        verify_stacks(&ledger, &outcome.stacks, &index, period.end_block)?;

        loyalty.insert(inputs.pool, outcome.multipliers);
        snapshots.push(LoyaltySnapshot {
            pool: inputs.pool,
            end_block: period.end_block,
            stacks: outcome.stacks,
        });
    }

    let diversity = compute_diversity(&contribution, params.diversity_max_multiplier)?;
    let allocation = allocate(&contribution, &diversity, &loyalty, params.budget)?;
    let payouts = allocation.to_map(&index)?;

    Ok(PeriodOutcome {
        period,
        index,
        contribution,
        diversity,
        loyalty,
        allocation,
        payouts,
        snapshots,
    })
}

/// Every stack must hold exactly the holder's balance at the period end
fn verify_stacks(
    ledger: &BalanceLedger<'_>,
    stacks: &StackMap,
    index: &AddressIndex,
    end_block: u64,
) -> EngineResult<()> {
    let Some(last_block) = end_block.checked_sub(1) else {
        return Ok(());
    };
    let addresses: BTreeSet<&Address> = index.iter().chain(stacks.keys()).collect();
    for address in addresses {
        let stacked = stacks.get(address).map(|s| s.total()).unwrap_or_default();
        let balance = ledger.balance_at(address, last_block)?;
        if stacked != balance {
            return Err(EngineError::StackBalanceMismatch {
                address: *address,
                block: last_block,
                stacked,
                balance,
            });
        }
    }
    Ok(())
}

/// A sub-period of a super-period, resolved to blocks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlannedPeriod {
    pub start_timestamp: i64,
    pub end_timestamp: i64,
    pub period: Period,
}

#[derive(Debug, Clone)]
pub struct SuperPeriodOutcome {
    pub start_timestamp: i64,
    pub end_timestamp: i64,
    pub periods: Vec<(PlannedPeriod, PeriodOutcome)>,
    /// Sum of every sub-period's payouts
    pub cumulative: PayoutMap,
    /// Latest cumulative report persisted before this run's end, if any
    pub previous: Option<CumulativeReport>,
    /// `cumulative - previous`
    pub incremental: PayoutMap,
}

/// Fetches, computes and persists periods end to end
pub struct Orchestrator<S, C> {
    fetcher: Fetcher<S>,
    clock: Arc<C>,
    store: StateStore,
    pub settings: Settings,
}

impl<S: LedgerSource, C: BlockClock> Orchestrator<S, C> {
    pub fn new(source: Arc<S>, clock: Arc<C>, settings: &Settings) -> Self {
        Self {
            fetcher: Fetcher::new(source, settings.fetch.clone()),
            clock,
            store: StateStore::new(settings.state.dir.clone()),
            settings: settings.clone(),
        }
    }

    pub fn fetcher(&self) -> &Fetcher<S> {
        &self.fetcher
    }

    pub fn store(&self) -> &StateStore {
        &self.store
    }

    pub fn params(&self) -> EngineParams {
        EngineParams::from_settings(&self.settings)
    }

    /// Stacks of every configured pool saved at `end_block`; pools without a
    /// snapshot are left out and get bootstrapped
    pub fn load_prior_stacks(&self, end_block: u64) -> Result<BTreeMap<Address, StackMap>> {
        let mut prior = BTreeMap::new();
        for pool in &self.settings.pools {
            if let Some(snapshot) = self.store.load_stacks(&pool.address, end_block)? {
                prior.insert(pool.address, snapshot.stacks);
            }
        }
        Ok(prior)
    }

    /// One period, resuming from the loyalty stacks saved at its start block
    pub async fn calculate_period(
        &self,
        period: Period,
        params: &EngineParams,
    ) -> Result<PeriodOutcome> {
        let prior = self.load_prior_stacks(period.start_block)?;
        self.calculate_period_with(period, params, &prior).await
    }

    async fn calculate_period_with(
        &self,
        period: Period,
        params: &EngineParams,
        prior: &BTreeMap<Address, StackMap>,
    ) -> Result<PeriodOutcome> {
        info!(
            "Calculating period [{}, {}) for {} pools ({} resumed from saved stacks)",
            period.start_block,
            period.end_block,
            self.settings.pools.len(),
            prior.len()
        );

        let prepared = PreparedData::new(
            &self.fetcher,
            &self.settings.pools,
            period.start_block,
            period.end_block,
        )
        .await?;

        let outcome = run_period(&prepared.pools, prior, period, params).with_context(|| {
            format!(
                "Allocation failed for period [{}, {})",
                period.start_block, period.end_block
            )
        })?;

        let transfers: usize = prepared.pools.iter().map(|p| p.transfers.len()).sum();
        metrics::counter!("lp_rewards_periods_processed").increment(1);
        metrics::counter!("lp_rewards_pools_processed").increment(prepared.pools.len() as u64);
        metrics::counter!("lp_rewards_transfers_processed").increment(transfers as u64);
        metrics::gauge!("lp_rewards_addresses").set(outcome.index.len() as f64);

        info!(
            "Pool summary for [{}, {}):\n{}",
            period.start_block,
            period.end_block,
            print_pool_summaries(&outcome.pool_summaries())
        );
        debug!(
            "Payout summary:\n{}",
            print_payout_summaries(&outcome.payout_summaries())
        );

        Ok(outcome)
    }

    /// Save the loyalty stacks produced by `outcome`
    pub fn persist_stacks(&self, outcome: &PeriodOutcome) -> Result<()> {
        for snapshot in &outcome.snapshots {
            self.store.save_stacks(snapshot)?;
        }
        Ok(())
    }

    /// Split `[start_timestamp, end_timestamp)` into sub-periods of the
    /// configured length and resolve their boundaries to blocks
    pub async fn plan_periods(
        &self,
        start_timestamp: i64,
        end_timestamp: i64,
    ) -> Result<Vec<PlannedPeriod>> {
        ensure!(
            end_timestamp > start_timestamp,
            "End timestamp {end_timestamp} must be after start timestamp {start_timestamp}"
        );
        let length = i64::try_from(self.settings.period.length_seconds)
            .context("Period length does not fit in a timestamp")?;

        let mut boundaries = vec![start_timestamp];
        let mut cursor = start_timestamp;
        while cursor < end_timestamp {
            cursor = cursor.saturating_add(length).min(end_timestamp);
            boundaries.push(cursor);
        }

        let mut blocks = Vec::with_capacity(boundaries.len());
        for ts in &boundaries {
            let block = with_retry(
                || self.clock.block_at_or_before(*ts),
                self.settings.fetch.max_retries,
                "block_at_or_before",
            )
            .await
            .with_context(|| format!("Failed to resolve timestamp {ts} to a block"))?;
            blocks.push(block);
        }

        let planned = boundaries
            .iter()
            .copied()
            .zip(blocks)
            .tuple_windows()
            .map(|((start_ts, start_block), (end_ts, end_block))| {
                let period = Period::new(start_block, end_block).with_context(|| {
                    format!("Sub-period [{start_ts}, {end_ts}) resolves to an empty block range")
                })?;
                Ok(PlannedPeriod {
                    start_timestamp: start_ts,
                    end_timestamp: end_ts,
                    period,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        info!(
            "Planned {} sub-periods over [{}, {})",
            planned.len(),
            start_timestamp,
            end_timestamp
        );
        Ok(planned)
    }

    /// Run every sub-period of `[start_timestamp, end_timestamp)` in order,
    /// carrying loyalty stacks forward, then derive cumulative and incremental
    /// payouts.
    ///
    /// Nothing is written unless every sub-period succeeds; with `persist`
    /// the outcome is saved through [`Orchestrator::persist_super_period`].
    /// Callers producing reports should pass `false` and persist once the
    /// reports are written.
    pub async fn run_super_period(
        &self,
        start_timestamp: i64,
        end_timestamp: i64,
        params: &EngineParams,
        persist: bool,
    ) -> Result<SuperPeriodOutcome> {
        let planned = self.plan_periods(start_timestamp, end_timestamp).await?;

        let mut periods = Vec::with_capacity(planned.len());
        let mut cumulative = PayoutMap::new();
        let mut carried: Option<BTreeMap<Address, StackMap>> = None;

        for plan in planned {
            let prior = match carried.take() {
                Some(prior) => prior,
                None => self.load_prior_stacks(plan.period.start_block)?,
            };
            let outcome = self
                .calculate_period_with(plan.period, params, &prior)
                .await?;
            accumulate(&mut cumulative, &outcome.payouts)?;

            carried = Some(
                outcome
                    .snapshots
                    .iter()
                    .map(|s| (s.pool, s.stacks.clone()))
                    .collect(),
            );
            periods.push((plan, outcome));
        }

        let previous = self.store.latest_cumulative_before(end_timestamp)?;
        let incremental = match &previous {
            Some(report) => subtract_cumulative(&cumulative, &report.payouts)?,
            None => cumulative.clone(),
        };

        info!(
            "Processed {} sub-periods over [{}, {}); previous cumulative report: {}",
            periods.len(),
            start_timestamp,
            end_timestamp,
            previous
                .as_ref()
                .map(|r| r.end_timestamp.to_string())
                .unwrap_or_else(|| "none".to_string())
        );

        let outcome = SuperPeriodOutcome {
            start_timestamp,
            end_timestamp,
            periods,
            cumulative,
            previous,
            incremental,
        };
        if persist {
            self.persist_super_period(&outcome)?;
        }
        Ok(outcome)
    }

    /// Save every sub-period's stacks and the cumulative report
    pub fn persist_super_period(&self, outcome: &SuperPeriodOutcome) -> Result<()> {
        for (_, period) in &outcome.periods {
            self.persist_stacks(period)?;
        }
        self.store.save_cumulative(&CumulativeReport {
            end_timestamp: outcome.end_timestamp,
            payouts: outcome.cumulative.clone(),
        })
    }
}
