//! Offline data source backed by a directory of JSON files.
//!
//! Layout:
//! - `blocks.json`: `[{"block": 100, "timestamp": 1700000000}, ...]`
//! - `pools/<pool address>.json`: a [`PoolRecord`] with the pool's share-token
//!   transfers and its totals at every interaction block.

use crate::ingestor::{
    error::{FetchError, Result},
    fetcher::{BlockClock, LedgerSource},
    types::{Address, Amount, PoolSnapshot, Transfer},
};
use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::{collections::HashMap, fs, path::Path};
use tracing::info;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockTime {
    pub block: u64,
    pub timestamp: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PoolRecord {
    pub transfers: Vec<Transfer>,
    /// Pool totals after each value-changing interaction
    pub snapshots: Vec<PoolSnapshot>,
}

#[derive(Debug, Clone, Default)]
pub struct SnapshotSource {
    blocks: Vec<BlockTime>,
    pools: HashMap<Address, PoolRecord>,
}

impl SnapshotSource {
    pub fn new(mut blocks: Vec<BlockTime>, pools: HashMap<Address, PoolRecord>) -> Self {
        blocks.sort_by_key(|b| b.block);
        let pools = pools
            .into_iter()
            .map(|(address, mut record)| {
                record.snapshots.sort_by_key(|s| s.block);
                (address, record)
            })
            .collect();
        Self { blocks, pools }
    }

    /// Read `blocks.json` and every `pools/*.json` below `dir`
    pub fn load(dir: &Path) -> Result<Self> {
        let blocks: Vec<BlockTime> = serde_json::from_slice(&fs::read(dir.join("blocks.json"))?)?;

        let mut pools = HashMap::new();
        let pools_dir = dir.join("pools");
        if pools_dir.exists() {
            for entry in fs::read_dir(&pools_dir)? {
                let path = entry?.path();
                if path.extension().and_then(|e| e.to_str()) != Some("json") {
                    continue;
                }
                let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
                    continue;
                };
                let address: Address = stem
                    .parse()
                    .map_err(|e| FetchError::Source(format!("{}: {e}", path.display())))?;
                let record: PoolRecord = serde_json::from_slice(&fs::read(&path)?)?;
                pools.insert(address, record);
            }
        }

        info!(
            "Loaded snapshot source from {}: {} blocks, {} pools",
            dir.display(),
            blocks.len(),
            pools.len()
        );
        Ok(Self::new(blocks, pools))
    }

    /// Write the source back out in the layout [`SnapshotSource::load`] reads
    pub fn save(&self, dir: &Path) -> Result<()> {
        fs::create_dir_all(dir.join("pools"))?;
        fs::write(dir.join("blocks.json"), serde_json::to_vec_pretty(&self.blocks)?)?;
        for (address, record) in &self.pools {
            fs::write(
                dir.join("pools").join(format!("{address}.json")),
                serde_json::to_vec_pretty(record)?,
            )?;
        }
        Ok(())
    }

    pub fn pool_addresses(&self) -> Vec<Address> {
        let mut addresses: Vec<Address> = self.pools.keys().copied().collect();
        addresses.sort();
        addresses
    }

    fn record(&self, pool: &Address) -> Result<&PoolRecord> {
        self.pools
            .get(pool)
            .ok_or_else(|| FetchError::NotFound(format!("pool {pool}")))
    }
}

#[async_trait]
impl LedgerSource for SnapshotSource {
    async fn transfers(&self, token: Address, from_block: u64, to_block: u64) -> Result<Vec<Transfer>> {
        Ok(self
            .record(&token)?
            .transfers
            .iter()
            .filter(|t| t.block >= from_block && t.block < to_block)
            .cloned()
            .collect())
    }

    async fn interaction_blocks(&self, pool: Address, from_block: u64, to_block: u64) -> Result<Vec<u64>> {
        Ok(self
            .record(&pool)?
            .snapshots
            .iter()
            .map(|s| s.block)
            .filter(|block| *block >= from_block && *block < to_block)
            .collect())
    }

    async fn pool_snapshot(&self, pool: Address, block: u64) -> Result<PoolSnapshot> {
        let record = self.record(&pool)?;
        let position = record.snapshots.partition_point(|s| s.block <= block);
        // before the first interaction the pool held nothing
        let snapshot = match position {
            0 => PoolSnapshot {
                block,
                total_liquidity: Decimal::ZERO,
                total_shares: Decimal::ZERO,
            },
            _ => PoolSnapshot {
                block,
                ..record.snapshots[position - 1]
            },
        };
        Ok(snapshot)
    }

    /// A snapshot keeps no token state of its own, so the point query sums
    /// the recorded transfers. It catches replay and paging faults, not
    /// transfers the indexer never recorded.
    async fn balance_of(&self, token: Address, holder: Address, block: u64) -> Result<Amount> {
        let mut transfers: Vec<&Transfer> = self
            .record(&token)?
            .transfers
            .iter()
            .filter(|t| t.block <= block && t.from != t.to)
            .collect();
        transfers.sort_by_key(|t| t.sort_key());

        let mut balance: Amount = 0;
        for transfer in transfers {
            if transfer.to == holder {
                balance = balance.checked_add(transfer.amount).ok_or_else(|| {
                    FetchError::Source(format!(
                        "balance of {holder} overflows at block {}",
                        transfer.block
                    ))
                })?;
            }
            if transfer.from == holder {
                balance = balance.checked_sub(transfer.amount).ok_or_else(|| {
                    FetchError::Source(format!(
                        "balance of {holder} goes negative at block {}",
                        transfer.block
                    ))
                })?;
            }
        }
        Ok(balance)
    }
}

#[async_trait]
impl BlockClock for SnapshotSource {
    async fn block_at_or_before(&self, timestamp: i64) -> Result<u64> {
        let position = self.blocks.partition_point(|b| b.timestamp <= timestamp);
        match position {
            0 => Err(FetchError::NotFound(format!(
                "no block at or before timestamp {timestamp}"
            ))),
            _ => Ok(self.blocks[position - 1].block),
        }
    }

    async fn timestamp_of(&self, block: u64) -> Result<i64> {
        self.blocks
            .binary_search_by_key(&block, |b| b.block)
            .map(|i| self.blocks[i].timestamp)
            .map_err(|_| FetchError::NotFound(format!("timestamp of block {block}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::dec;

    fn pool() -> Address {
        "0x00000000000000000000000000000000000000a1".parse().unwrap()
    }

    fn source() -> SnapshotSource {
        let holder: Address = "0x0000000000000000000000000000000000000001".parse().unwrap();
        let record = PoolRecord {
            transfers: vec![
                Transfer {
                    from: Address::ZERO,
                    to: holder,
                    amount: 100,
                    block: 10,
                    log_index: 0,
                    tx_hash: "0x01".into(),
                },
                Transfer {
                    from: holder,
                    to: Address::ZERO,
                    amount: 40,
                    block: 25,
                    log_index: 0,
                    tx_hash: "0x02".into(),
                },
            ],
            snapshots: vec![
                PoolSnapshot {
                    block: 20,
                    total_liquidity: dec!(300),
                    total_shares: dec!(100),
                },
                PoolSnapshot {
                    block: 10,
                    total_liquidity: dec!(200),
                    total_shares: dec!(100),
                },
            ],
        };
        let blocks = vec![
            BlockTime { block: 10, timestamp: 1_000 },
            BlockTime { block: 20, timestamp: 1_120 },
            BlockTime { block: 30, timestamp: 1_240 },
        ];
        SnapshotSource::new(blocks, HashMap::from([(pool(), record)]))
    }

    #[tokio::test]
    async fn test_ledger_queries() {
        let source = source();
        assert_eq!(source.transfers(pool(), 0, 20).await.unwrap().len(), 1);
        assert_eq!(source.transfers(pool(), 0, 26).await.unwrap().len(), 2);
        assert_eq!(source.interaction_blocks(pool(), 0, 20).await.unwrap(), vec![10]);

        let snapshot = source.pool_snapshot(pool(), 25).await.unwrap();
        assert_eq!(snapshot.block, 25);
        assert_eq!(snapshot.share_value(), dec!(3));
        assert_eq!(
            source.pool_snapshot(pool(), 5).await.unwrap().share_value(),
            Decimal::ZERO
        );

        let unknown = Address::new([7u8; 20]);
        assert!(matches!(
            source.transfers(unknown, 0, 10).await,
            Err(FetchError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_balance_of() {
        let source = source();
        let holder: Address = "0x0000000000000000000000000000000000000001".parse().unwrap();
        assert_eq!(source.balance_of(pool(), holder, 9).await.unwrap(), 0);
        assert_eq!(source.balance_of(pool(), holder, 10).await.unwrap(), 100);
        assert_eq!(source.balance_of(pool(), holder, 25).await.unwrap(), 60);
        assert_eq!(source.balance_of(pool(), Address::new([7u8; 20]), 25).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_balance_of_rejects_inconsistent_records() {
        let holder = Address::new([1u8; 20]);
        let mint = |amount, log_index| Transfer {
            from: Address::ZERO,
            to: holder,
            amount,
            block: 1,
            log_index,
            tx_hash: format!("0x{log_index}"),
        };
        let overflowing = PoolRecord {
            transfers: vec![mint(u128::MAX, 0), mint(1, 1)],
            snapshots: vec![],
        };
        // a burn recorded ahead of the mint that funds it
        let spending = PoolRecord {
            transfers: vec![
                Transfer {
                    from: holder,
                    to: Address::ZERO,
                    amount: 5,
                    block: 1,
                    log_index: 0,
                    tx_hash: "0xb".into(),
                },
                mint(5, 1),
            ],
            snapshots: vec![],
        };
        let source = SnapshotSource::new(
            vec![],
            HashMap::from([(pool(), overflowing), (Address::new([2u8; 20]), spending)]),
        );
        assert!(matches!(
            source.balance_of(pool(), holder, 1).await,
            Err(FetchError::Source(_))
        ));
        assert!(matches!(
            source.balance_of(Address::new([2u8; 20]), holder, 1).await,
            Err(FetchError::Source(_))
        ));
    }

    #[tokio::test]
    async fn test_block_clock() {
        let source = source();
        assert_eq!(source.block_at_or_before(1_119).await.unwrap(), 10);
        assert_eq!(source.block_at_or_before(1_120).await.unwrap(), 20);
        assert_eq!(source.block_at_or_before(9_999).await.unwrap(), 30);
        assert!(source.block_at_or_before(999).await.is_err());
        assert_eq!(source.timestamp_of(20).await.unwrap(), 1_120);
        assert!(source.timestamp_of(21).await.is_err());
    }

    #[tokio::test]
    async fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let original = source();
        original.save(dir.path()).unwrap();

        let loaded = SnapshotSource::load(dir.path()).unwrap();
        assert_eq!(loaded.pool_addresses(), vec![pool()]);
        assert_eq!(
            loaded.transfers(pool(), 0, 100).await.unwrap(),
            original.transfers(pool(), 0, 100).await.unwrap()
        );
        assert_eq!(loaded.block_at_or_before(1_200).await.unwrap(), 20);
    }
}
