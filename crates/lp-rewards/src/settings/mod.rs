pub mod validation;

use crate::{
    calculator::{constants::DEFAULT_SHARE_DECIMALS, loyalty::GrowthPolicy},
    ingestor::types::Address,
};
use anyhow::{Context, Result};
use config::{Config as ConfigBuilder, Environment, File};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::{fmt, net::SocketAddr, path::Path, path::PathBuf};
use validation::validate_config;

/// Main settings configuration for lp-rewards
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Log level for application logging (e.g., "info", "debug", "warn", "error")
    pub log_level: String,
    /// Pools participating in the incentive program
    pub pools: Vec<PoolSettings>,
    /// Budget and diversity parameters
    pub allocation: AllocationSettings,
    /// Loyalty growth parameters
    pub loyalty: LoyaltySettings,
    /// Sub-period length used when splitting a super-period
    #[serde(default)]
    pub period: PeriodSettings,
    /// Report output configuration
    pub report: ReportSettings,
    /// Where loyalty snapshots and cumulative reports are persisted
    pub state: StateSettings,
    /// Data retrieval configuration
    pub fetch: FetchSettings,
    /// Prometheus exporter (optional)
    pub metrics: Option<MetricsSettings>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoolSettings {
    /// Pool (and pool-share token) address
    pub address: Address,
    /// Decimals of the pool-share token
    #[serde(default = "default_share_decimals")]
    pub share_decimals: u32,
}

fn default_share_decimals() -> u32 {
    DEFAULT_SHARE_DECIMALS
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AllocationSettings {
    /// Amount distributed per sub-period
    pub budget: Decimal,
    /// Multiplier reached by an address spread evenly over every pool
    pub diversity_max_multiplier: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoyaltySettings {
    /// Factor applied to every retained tranche at each period boundary
    pub growth_factor: Decimal,
    #[serde(default)]
    pub policy: GrowthPolicy,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PeriodSettings {
    /// Sub-period length in seconds (default: one week)
    pub length_seconds: u64,
}

impl Default for PeriodSettings {
    fn default() -> Self {
        Self {
            length_seconds: crate::calculator::constants::SECONDS_PER_WEEK,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportSettings {
    /// Decimal places kept in payout reports
    pub precision: u32,
    /// Asset tag written next to each payout row (optional)
    pub asset: Option<String>,
    pub output_dir: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateSettings {
    pub dir: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchSettings {
    /// Block span requested per page
    pub page_blocks: u64,
    /// Hard ceiling on records fetched for a single query
    pub max_records: usize,
    /// Concurrent page requests in flight
    pub concurrency: usize,
    /// Retries per page on transient failures
    pub max_retries: usize,
    /// Directory backing the offline snapshot source
    pub snapshot_dir: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsSettings {
    pub addr: SocketAddr,
}

impl Settings {
    /// Load configuration from a specific config file path
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let _ = dotenvy::dotenv();

        // env vars take priority over the file
        let settings = ConfigBuilder::builder()
            .add_source(File::with_name(&path.as_ref().to_string_lossy()))
            .add_source(
                Environment::with_prefix("LP")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .context("Failed to build configuration")?
            .try_deserialize()
            .context("Failed to deserialize configuration")?;

        validate_config(&settings)?;

        Ok(settings)
    }

    /// Load configuration from environment variables only
    pub fn from_env() -> Result<Self> {
        // NOTE: It's ok if this fails (file might not exist)
        let _ = dotenvy::dotenv();

        let settings: Settings = ConfigBuilder::builder()
            .add_source(
                Environment::with_prefix("LP")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .context("Failed to build configuration")?
            .try_deserialize()
            .context("Failed to deserialize configuration")?;

        validate_config(&settings)?;

        Ok(settings)
    }

    pub fn pool_addresses(&self) -> Vec<Address> {
        self.pools.iter().map(|p| p.address).collect()
    }

    pub fn pool(&self, address: &Address) -> Option<&PoolSettings> {
        self.pools.iter().find(|p| p.address == *address)
    }
}

impl fmt::Display for Settings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Settings {{\n\
             \tLog Level: {}\n\
             \tPools: {}\n\
             \tBudget: {}\n\
             \tDiversity Max Multiplier: {}\n\
             \tLoyalty Growth Factor: {}\n\
             \tLoyalty Growth Policy: {:?}\n\
             \tPeriod Length (s): {}\n\
             \tReport Precision: {}\n\
             \tState Dir: {}\n\
             \tSnapshot Dir: {}\n\
             }}",
            self.log_level,
            self.pools.len(),
            self.allocation.budget,
            self.allocation.diversity_max_multiplier,
            self.loyalty.growth_factor,
            self.loyalty.policy,
            self.period.length_seconds,
            self.report.precision,
            self.state.dir.display(),
            self.fetch.snapshot_dir.display(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::dec;
    use std::io::Write;

    const CONFIG: &str = r#"
log_level = "debug"

[[pools]]
address = "0x00000000000000000000000000000000000000a1"

[[pools]]
address = "0x00000000000000000000000000000000000000a2"
share_decimals = 6

[allocation]
budget = "1000"
diversity_max_multiplier = "1.5"

[loyalty]
growth_factor = "1.05"

[loyalty.policy]
kind = "proportional"
nominal_period_blocks = 50400

[report]
precision = 6
asset = "GOV"
output_dir = "out"

[state]
dir = "state"

[fetch]
page_blocks = 10000
max_records = 100000
concurrency = 4
max_retries = 3
snapshot_dir = "snapshot"
"#;

    #[test]
    fn test_from_path() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        file.write_all(CONFIG.as_bytes()).unwrap();

        let settings = Settings::from_path(file.path()).unwrap();
        assert_eq!(settings.log_level, "debug");
        assert_eq!(settings.pools.len(), 2);
        assert_eq!(settings.pools[0].share_decimals, DEFAULT_SHARE_DECIMALS);
        assert_eq!(settings.pools[1].share_decimals, 6);
        assert_eq!(settings.allocation.budget, dec!(1000));
        assert_eq!(settings.loyalty.growth_factor, dec!(1.05));
        assert_eq!(
            settings.loyalty.policy,
            GrowthPolicy::Proportional {
                nominal_period_blocks: 50400
            }
        );
        assert_eq!(settings.period.length_seconds, 604_800);
        assert_eq!(settings.report.asset.as_deref(), Some("GOV"));
        assert!(settings.metrics.is_none());

        let address = settings.pools[1].address;
        assert_eq!(settings.pool(&address).map(|p| p.share_decimals), Some(6));
        assert_eq!(settings.pool_addresses().len(), 2);
    }
}
