use crate::{
    calculator::value_curve::{ValueCurve, build_value_curve},
    ingestor::{
        fetcher::{Fetcher, LedgerSource},
        types::{Address, Transfer},
    },
    settings::PoolSettings,
};
use anyhow::{Context, Result};
use tracing::info;

/// Everything the engine needs about one pool for one period
#[derive(Debug, Clone, PartialEq)]
pub struct PoolInputs {
    pub pool: Address,
    pub share_decimals: u32,
    /// Every transfer of the pool-share token before the period end, ordered
    pub transfers: Vec<Transfer>,
    /// Share value over the period
    pub curve: ValueCurve,
}

pub struct PreparedData {
    pub start_block: u64,
    pub end_block: u64,
    pub pools: Vec<PoolInputs>,
}

impl PreparedData {
    /// Fetches and prepares the inputs of every configured pool.
    ///
    /// Transfers are fetched from genesis so opening balances and loyalty
    /// bootstraps can be replayed; value points only cover the period.
    pub async fn new<S: LedgerSource>(
        fetcher: &Fetcher<S>,
        pools: &[PoolSettings],
        start_block: u64,
        end_block: u64,
    ) -> Result<PreparedData> {
        let mut prepared = Vec::with_capacity(pools.len());
        // sequential: a failed pool aborts before later pools are fetched
        for pool in pools {
            prepared.push(prepare_pool(fetcher, pool, start_block, end_block).await?);
        }

        info!(
            "Prepared {} pools for blocks [{}, {})",
            prepared.len(),
            start_block,
            end_block
        );
        Ok(PreparedData {
            start_block,
            end_block,
            pools: prepared,
        })
    }
}

async fn prepare_pool<S: LedgerSource>(
    fetcher: &Fetcher<S>,
    pool: &PoolSettings,
    start_block: u64,
    end_block: u64,
) -> Result<PoolInputs> {
    let transfers = fetcher
        .fetch_transfers(pool.address, 0, end_block)
        .await
        .with_context(|| format!("Failed to fetch transfers for pool {}", pool.address))?;

    let inputs = fetcher
        .fetch_value_inputs(pool.address, start_block, end_block)
        .await
        .with_context(|| format!("Failed to fetch value points for pool {}", pool.address))?;

    let curve = build_value_curve(&inputs.points, inputs.initial_value, start_block, end_block)
        .with_context(|| format!("Failed to build value curve for pool {}", pool.address))?;

    info!(
        "Pool {}: {} transfers, {} value points, opening value {}",
        pool.address,
        transfers.len(),
        inputs.points.len(),
        inputs.initial_value
    );

    Ok(PoolInputs {
        pool: pool.address,
        share_decimals: pool.share_decimals,
        transfers,
        curve,
    })
}
