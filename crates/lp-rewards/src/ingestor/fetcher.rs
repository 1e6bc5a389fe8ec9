use crate::{
    ingestor::{
        error::{FetchError, Result},
        paginate::{dedup_by_id, fetch_pages, split_range, with_retry},
        types::{Address, Amount, PoolSnapshot, Transfer, ValuePoint},
    },
    settings::FetchSettings,
};
use async_trait::async_trait;
use futures::{StreamExt, TryStreamExt, stream};
use mockall::automock;
use rust_decimal::Decimal;
use std::sync::Arc;
use tracing::{debug, info};

/// Raw on-chain data needed to rebuild balances and pool values
#[automock]
#[async_trait]
pub trait LedgerSource: Send + Sync {
    /// Share-token transfers of `token` in `[from_block, to_block)`
    async fn transfers(&self, token: Address, from_block: u64, to_block: u64)
    -> Result<Vec<Transfer>>;

    /// Blocks in `[from_block, to_block)` where a swap, join or exit touched `pool`
    async fn interaction_blocks(
        &self,
        pool: Address,
        from_block: u64,
        to_block: u64,
    ) -> Result<Vec<u64>>;

    /// Pool totals in effect at `block`
    async fn pool_snapshot(&self, pool: Address, block: u64) -> Result<PoolSnapshot>;

    /// `holder`'s balance of `token` after every transfer in `block`
    async fn balance_of(&self, token: Address, holder: Address, block: u64) -> Result<Amount>;
}

/// Block height <-> wall-clock mapping
#[automock]
#[async_trait]
pub trait BlockClock: Send + Sync {
    /// Latest block whose timestamp is at or before `timestamp`
    async fn block_at_or_before(&self, timestamp: i64) -> Result<u64>;

    async fn timestamp_of(&self, block: u64) -> Result<i64>;
}

/// Value curve inputs for one pool and range
#[derive(Debug, Clone, PartialEq)]
pub struct ValueInputs {
    /// Share value in effect at the range start
    pub initial_value: Decimal,
    pub points: Vec<ValuePoint>,
}

/// Complete, deduplicated retrieval on top of a [`LedgerSource`]
pub struct Fetcher<S> {
    source: Arc<S>,
    settings: FetchSettings,
}

impl<S> Clone for Fetcher<S> {
    fn clone(&self) -> Self {
        Self {
            source: Arc::clone(&self.source),
            settings: self.settings.clone(),
        }
    }
}

impl<S: LedgerSource> Fetcher<S> {
    pub fn new(source: Arc<S>, settings: FetchSettings) -> Self {
        Self { source, settings }
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    /// Every transfer of `token` in `[from_block, to_block)`, ordered by
    /// `(block, log_index)` and deduplicated by `tx_hash:log_index`
    pub async fn fetch_transfers(
        &self,
        token: Address,
        from_block: u64,
        to_block: u64,
    ) -> Result<Vec<Transfer>> {
        let ranges = split_range(from_block, to_block, self.settings.page_blocks);
        let source = &self.source;
        let transfers = fetch_pages(
            ranges,
            self.settings.concurrency,
            self.settings.max_records,
            self.settings.max_retries,
            |from, to| source.transfers(token, from, to),
        )
        .await?;

        let fetched = transfers.len();
        let mut transfers = dedup_by_id(transfers, |t: &Transfer| {
            (!t.tx_hash.is_empty()).then(|| t.event_id())
        });
        transfers.sort_by_key(Transfer::sort_key);

        if fetched != transfers.len() {
            debug!(
                "Dropped {} duplicate transfers for {}",
                fetched - transfers.len(),
                token
            );
        }
        info!(
            "Fetched {} transfers for {} over blocks [{}, {})",
            transfers.len(),
            token,
            from_block,
            to_block
        );
        Ok(transfers)
    }

    /// Sorted, deduplicated interaction blocks of `pool` in `[from_block, to_block)`
    pub async fn fetch_interaction_blocks(
        &self,
        pool: Address,
        from_block: u64,
        to_block: u64,
    ) -> Result<Vec<u64>> {
        let ranges = split_range(from_block, to_block, self.settings.page_blocks);
        let source = &self.source;
        let mut blocks = fetch_pages(
            ranges,
            self.settings.concurrency,
            self.settings.max_records,
            self.settings.max_retries,
            |from, to| source.interaction_blocks(pool, from, to),
        )
        .await?;
        blocks.sort_unstable();
        blocks.dedup();
        Ok(blocks)
    }

    /// Single pool-state read with retry
    pub async fn fetch_pool_snapshot(&self, pool: Address, block: u64) -> Result<PoolSnapshot> {
        with_retry(
            || self.source.pool_snapshot(pool, block),
            self.settings.max_retries,
            "pool_snapshot",
        )
        .await
    }

    /// Single balance read with retry
    pub async fn fetch_balance(&self, token: Address, holder: Address, block: u64) -> Result<Amount> {
        with_retry(
            || self.source.balance_of(token, holder, block),
            self.settings.max_retries,
            "balance_of",
        )
        .await
    }

    /// Value points at every interaction block of the range plus the value
    /// in effect at `from_block`
    pub async fn fetch_value_inputs(
        &self,
        pool: Address,
        from_block: u64,
        to_block: u64,
    ) -> Result<ValueInputs> {
        let blocks = self
            .fetch_interaction_blocks(pool, from_block, to_block)
            .await?;
        let initial = self.fetch_pool_snapshot(pool, from_block).await?;

        let snapshots: Vec<PoolSnapshot> = stream::iter(blocks)
            .map(|block| self.fetch_pool_snapshot(pool, block))
            .buffered(self.settings.concurrency.max(1))
            .try_collect()
            .await?;

        if let Some(snapshot) = snapshots.iter().find(|s| s.total_shares.is_sign_negative()) {
            return Err(FetchError::Source(format!(
                "pool {} reports negative total shares at block {}",
                pool, snapshot.block
            )));
        }

        debug!(
            "Fetched {} value points for pool {} over blocks [{}, {})",
            snapshots.len(),
            pool,
            from_block,
            to_block
        );
        Ok(ValueInputs {
            initial_value: initial.share_value(),
            points: snapshots.iter().map(PoolSnapshot::value_point).collect(),
        })
    }
}
