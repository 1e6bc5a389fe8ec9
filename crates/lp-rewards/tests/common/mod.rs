#![allow(dead_code)]

use lp_rewards::{
    calculator::loyalty::GrowthPolicy,
    ingestor::{
        snapshot::{BlockTime, PoolRecord, SnapshotSource},
        types::{Address, Amount, PoolSnapshot, Transfer},
    },
    settings,
};
use rust_decimal::{Decimal, dec};
use std::{collections::HashMap, path::Path};

/// Seconds between consecutive fixture blocks
pub const BLOCK_TIME: i64 = 10;

pub fn pool_a() -> Address {
    "0x00000000000000000000000000000000000000a1".parse().unwrap()
}

pub fn pool_b() -> Address {
    "0x00000000000000000000000000000000000000b1".parse().unwrap()
}

pub fn alice() -> Address {
    "0x0000000000000000000000000000000000000001".parse().unwrap()
}

pub fn bob() -> Address {
    "0x0000000000000000000000000000000000000002".parse().unwrap()
}

pub fn carol() -> Address {
    "0x0000000000000000000000000000000000000003".parse().unwrap()
}

/// Create test settings for the given pools and directories
pub fn create_test_settings(pools: &[Address], root: &Path) -> settings::Settings {
    settings::Settings {
        log_level: "info".to_string(),
        pools: pools
            .iter()
            .map(|address| settings::PoolSettings {
                address: *address,
                share_decimals: 0,
            })
            .collect(),
        allocation: settings::AllocationSettings {
            budget: dec!(1000),
            diversity_max_multiplier: dec!(1.5),
        },
        loyalty: settings::LoyaltySettings {
            growth_factor: dec!(1.05),
            policy: GrowthPolicy::PerPeriod,
        },
        period: settings::PeriodSettings {
            length_seconds: 100,
        },
        report: settings::ReportSettings {
            precision: 6,
            asset: None,
            output_dir: root.join("reports"),
        },
        state: settings::StateSettings {
            dir: root.join("state"),
        },
        fetch: settings::FetchSettings {
            page_blocks: 5,
            max_records: 10_000,
            concurrency: 2,
            max_retries: 0,
            snapshot_dir: root.join("snapshot"),
        },
        metrics: None,
    }
}

pub fn mint(to: Address, amount: Amount, block: u64, log_index: u32) -> Transfer {
    Transfer {
        from: Address::ZERO,
        to,
        amount,
        block,
        log_index,
        tx_hash: format!("0x{block:04x}{log_index:04x}"),
    }
}

pub fn snapshot(block: u64, total_liquidity: Decimal, total_shares: Decimal) -> PoolSnapshot {
    PoolSnapshot {
        block,
        total_liquidity,
        total_shares,
    }
}

/// Blocks `0..=last` spaced `BLOCK_TIME` seconds apart from timestamp 0
pub fn block_times(last: u64) -> Vec<BlockTime> {
    (0..=last)
        .map(|block| BlockTime {
            block,
            timestamp: block as i64 * BLOCK_TIME,
        })
        .collect()
}

/// Write a snapshot source to `dir` and load it back
pub fn write_source(dir: &Path, last_block: u64, pools: Vec<(Address, PoolRecord)>) -> SnapshotSource {
    let pools: HashMap<Address, PoolRecord> = pools.into_iter().collect();
    SnapshotSource::new(block_times(last_block), pools)
        .save(dir)
        .unwrap();
    SnapshotSource::load(dir).unwrap()
}

/// Sum of all values in a payout map
pub fn total(payouts: &std::collections::BTreeMap<Address, Decimal>) -> Decimal {
    payouts.values().sum()
}

pub fn assert_close(actual: Decimal, expected: Decimal) {
    assert!(
        (actual - expected).abs() < dec!(0.000000000001),
        "expected {expected}, got {actual}"
    );
}
