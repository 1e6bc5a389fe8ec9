use crate::{calculator::constants::MAX_DECIMAL_SCALE, calculator::loyalty::GrowthPolicy, settings::Settings};
use anyhow::{Result, bail};
use rust_decimal::Decimal;
use std::{
    collections::BTreeSet,
    net::{IpAddr, SocketAddr},
};

/// Validate the configuration values
pub fn validate_config(settings: &Settings) -> Result<()> {
    // Validate pools
    if settings.pools.is_empty() {
        bail!("At least one pool must be configured");
    }
    let mut seen = BTreeSet::new();
    for pool in &settings.pools {
        if pool.address.is_zero() {
            bail!("Pool address cannot be the zero address");
        }
        if !seen.insert(pool.address) {
            bail!("Pool {} is configured more than once", pool.address);
        }
        if pool.share_decimals > MAX_DECIMAL_SCALE {
            bail!(
                "Pool {} share_decimals must not exceed {}, got {}",
                pool.address,
                MAX_DECIMAL_SCALE,
                pool.share_decimals
            );
        }
    }

    // Validate allocation settings
    if settings.allocation.budget <= Decimal::ZERO {
        bail!(
            "Allocation budget must be positive, got {}",
            settings.allocation.budget
        );
    }
    if settings.allocation.diversity_max_multiplier < Decimal::ONE {
        bail!(
            "Allocation diversity_max_multiplier must be at least 1, got {}",
            settings.allocation.diversity_max_multiplier
        );
    }

    // Validate loyalty settings
    if settings.loyalty.growth_factor < Decimal::ONE {
        bail!(
            "Loyalty growth_factor must be at least 1, got {}",
            settings.loyalty.growth_factor
        );
    }
    if let GrowthPolicy::Proportional {
        nominal_period_blocks: 0,
    } = settings.loyalty.policy
    {
        bail!("Loyalty nominal_period_blocks must be greater than 0");
    }

    if settings.period.length_seconds == 0 {
        bail!("Period length_seconds must be greater than 0");
    }

    if settings.report.precision > MAX_DECIMAL_SCALE {
        bail!(
            "Report precision must not exceed {}, got {}",
            MAX_DECIMAL_SCALE,
            settings.report.precision
        );
    }
    if let Some(asset) = &settings.report.asset {
        if asset.trim().is_empty() {
            bail!("Report asset tag cannot be empty when set");
        }
    }

    // Validate fetch settings
    if settings.fetch.page_blocks == 0 {
        bail!("Fetch page_blocks must be greater than 0");
    }
    if settings.fetch.max_records == 0 {
        bail!("Fetch max_records must be greater than 0");
    }
    if settings.fetch.concurrency == 0 {
        bail!("Fetch concurrency must be greater than 0");
    }

    // Validate log level
    let valid_log_levels = ["trace", "debug", "info", "warn", "error"];
    if !valid_log_levels.contains(&settings.log_level.to_lowercase().as_str()) {
        bail!(
            "Invalid log level '{}'. Valid options are: {:?}",
            settings.log_level,
            valid_log_levels
        );
    }

    if let Some(metrics) = &settings.metrics {
        if !validate_socket_addr(&metrics.addr) {
            bail!("Invalid SocketAddr: {}", metrics.addr)
        }
    }

    Ok(())
}

fn validate_socket_addr(addr: &SocketAddr) -> bool {
    match addr.ip() {
        IpAddr::V4(ipv4) => !ipv4.is_broadcast() && !ipv4.is_multicast(),
        IpAddr::V6(ipv6) => !ipv6.is_unspecified() && !ipv6.is_multicast(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::{
        AllocationSettings, FetchSettings, LoyaltySettings, MetricsSettings, PeriodSettings,
        PoolSettings, ReportSettings, StateSettings,
    };
    use rust_decimal::dec;
    use std::{net::SocketAddr, path::PathBuf, str::FromStr};

    fn create_valid_config() -> Settings {
        Settings {
            log_level: "info".to_string(),
            pools: vec![
                PoolSettings {
                    address: "0x00000000000000000000000000000000000000a1".parse().unwrap(),
                    share_decimals: 18,
                },
                PoolSettings {
                    address: "0x00000000000000000000000000000000000000a2".parse().unwrap(),
                    share_decimals: 18,
                },
            ],
            allocation: AllocationSettings {
                budget: dec!(10000),
                diversity_max_multiplier: dec!(1.5),
            },
            loyalty: LoyaltySettings {
                growth_factor: dec!(1.05),
                policy: GrowthPolicy::PerPeriod,
            },
            period: PeriodSettings::default(),
            report: ReportSettings {
                precision: 6,
                asset: None,
                output_dir: PathBuf::from("/tmp/lp-rewards/out"),
            },
            state: StateSettings {
                dir: PathBuf::from("/tmp/lp-rewards/state"),
            },
            fetch: FetchSettings {
                page_blocks: 10_000,
                max_records: 1_000_000,
                concurrency: 4,
                max_retries: 3,
                snapshot_dir: PathBuf::from("/tmp/lp-rewards/snapshot"),
            },
            metrics: Some(MetricsSettings {
                addr: SocketAddr::from_str("127.0.0.1:9090").unwrap(),
            }),
        }
    }

    #[test]
    fn test_valid_config() {
        let config = create_valid_config();
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn test_pools_required_and_unique() {
        let mut config = create_valid_config();
        config.pools.clear();
        assert!(validate_config(&config).is_err());

        let mut config = create_valid_config();
        config.pools[1].address = config.pools[0].address;
        assert!(validate_config(&config).is_err());

        let mut config = create_valid_config();
        config.pools[0].share_decimals = 29;
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_invalid_allocation() {
        let mut config = create_valid_config();
        config.allocation.budget = Decimal::ZERO;
        assert!(validate_config(&config).is_err());

        let mut config = create_valid_config();
        config.allocation.diversity_max_multiplier = dec!(0.9);
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_invalid_loyalty() {
        let mut config = create_valid_config();
        config.loyalty.growth_factor = dec!(0.99);
        assert!(validate_config(&config).is_err());

        let mut config = create_valid_config();
        config.loyalty.policy = GrowthPolicy::Proportional {
            nominal_period_blocks: 0,
        };
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_invalid_fetch() {
        let mut config = create_valid_config();
        config.fetch.concurrency = 0;
        assert!(validate_config(&config).is_err());

        let mut config = create_valid_config();
        config.fetch.page_blocks = 0;
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_invalid_log_level() {
        let mut config = create_valid_config();
        config.log_level = "invalid".to_string();
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_metrics_disabled() {
        let mut config = create_valid_config();
        config.metrics = None;
        assert!(validate_config(&config).is_ok());
    }
}
