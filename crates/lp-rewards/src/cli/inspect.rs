use crate::cli::common::{OutputOptions, parse_timestamp};
use anyhow::{Result, bail};
use clap::Subcommand;
use lp_rewards::{
    audit::{sample_blocks, spot_check_balances, spot_check_values},
    calculator::{
        ledger::BalanceLedger, orchestrator::Orchestrator, value_curve::build_value_curve,
    },
    ingestor::{
        fetcher::{BlockClock, LedgerSource},
        types::{Address, Amount},
    },
    serializer::u128_string,
};
use rand::{SeedableRng, rngs::StdRng};
use rust_decimal::Decimal;
use serde::Serialize;
use tracing::info;

/// One holder's loyalty stack
#[derive(Debug, Clone, Serialize)]
pub struct StackRow {
    pub address: Address,
    #[serde(with = "u128_string")]
    pub holding: Amount,
    pub tranches: usize,
    pub multiplier: Decimal,
}

/// One planned sub-period
#[derive(Debug, Clone, Serialize)]
pub struct PeriodRow {
    pub start_timestamp: i64,
    pub end_timestamp: i64,
    pub start_block: u64,
    pub end_block: u64,
}

/// Inspect commands for analyzing inputs and saved state
#[derive(Subcommand, Debug)]
pub enum InspectCommands {
    #[command(
        about = "Show the share value curve of a pool as value steps",
        after_help = r#"Examples:
    # Value steps of a pool over blocks [1000, 2000)
    inspect value-curve --pool <ADDRESS> --start-block 1000 --end-block 2000

    # Export as CSV
    inspect value-curve --pool <ADDRESS> --start-block 1000 --end-block 2000 -f csv -o out"#
    )]
    ValueCurve {
        /// Pool address
        #[arg(short, long, value_name = "ADDRESS")]
        pool: Address,

        /// First block of the range
        #[arg(long, value_name = "BLOCK")]
        start_block: u64,

        /// Block after the last block of the range
        #[arg(long, value_name = "BLOCK")]
        end_block: u64,

        #[command(flatten)]
        output: OutputOptions,
    },

    #[command(
        about = "Show the loyalty stacks saved for a pool at a period end",
        after_help = r#"Examples:
    # Stacks saved at block 2000
    inspect stacks --pool <ADDRESS> --block 2000

    # List the blocks with saved stacks
    inspect stacks --pool <ADDRESS>"#
    )]
    Stacks {
        /// Pool address
        #[arg(short, long, value_name = "ADDRESS")]
        pool: Address,

        /// Period end block of the snapshot (lists available blocks if omitted)
        #[arg(short, long, value_name = "BLOCK")]
        block: Option<u64>,

        #[command(flatten)]
        output: OutputOptions,
    },

    #[command(
        about = "Show how a time range splits into sub-periods and blocks",
        after_help = r#"Examples:
    # Sub-periods of one month
    inspect periods --start 2024-03-01 --end 2024-04-01"#
    )]
    Periods {
        /// Range start: unix seconds, RFC 3339 or YYYY-MM-DD
        #[arg(long, value_name = "TIME", value_parser = parse_timestamp)]
        start: i64,

        /// Range end (exclusive)
        #[arg(long, value_name = "TIME", value_parser = parse_timestamp)]
        end: i64,

        #[command(flatten)]
        output: OutputOptions,
    },

    #[command(
        about = "Compare rebuilt values and balances with direct queries at random blocks",
        after_help = r#"Examples:
    # Check 20 random blocks of a pool's value curve
    inspect spot-check --pool <ADDRESS> --start-block 1000 --end-block 2000

    # Also check a holder's balance, reproducibly
    inspect spot-check --pool <ADDRESS> --start-block 1000 --end-block 2000 --address <ADDRESS> --seed 7"#
    )]
    SpotCheck {
        /// Pool address
        #[arg(short, long, value_name = "ADDRESS")]
        pool: Address,

        /// First block of the range
        #[arg(long, value_name = "BLOCK")]
        start_block: u64,

        /// Block after the last block of the range
        #[arg(long, value_name = "BLOCK")]
        end_block: u64,

        /// Number of blocks to sample
        #[arg(short, long, default_value_t = 20)]
        samples: usize,

        /// Holder whose balance should be checked as well
        #[arg(short, long, value_name = "ADDRESS")]
        address: Option<Address>,

        /// Seed for block sampling
        #[arg(long)]
        seed: Option<u64>,
    },
}

/// Handle inspect commands
pub async fn handle<S: LedgerSource, C: BlockClock>(
    orchestrator: &Orchestrator<S, C>,
    cmd: InspectCommands,
) -> Result<()> {
    match cmd {
        InspectCommands::ValueCurve {
            pool,
            start_block,
            end_block,
            output,
        } => {
            let inputs = orchestrator
                .fetcher()
                .fetch_value_inputs(pool, start_block, end_block)
                .await?;
            let curve =
                build_value_curve(&inputs.points, inputs.initial_value, start_block, end_block)?;
            let steps = curve.steps();
            info!(
                "Pool {} has {} value steps over [{}, {})",
                pool,
                steps.len(),
                start_block,
                end_block
            );
            output.write(&steps, &format!("value-curve-{pool}-{start_block}-{end_block}"))
        }
        InspectCommands::Stacks {
            pool,
            block,
            output,
        } => {
            let store = orchestrator.store();
            let Some(block) = block else {
                let blocks = store.stack_blocks(&pool)?;
                if blocks.is_empty() {
                    info!("No loyalty stacks saved for pool {}", pool);
                } else {
                    info!(
                        "Loyalty stacks of pool {} saved at blocks: {}",
                        pool,
                        blocks
                            .iter()
                            .map(u64::to_string)
                            .collect::<Vec<_>>()
                            .join(", ")
                    );
                }
                return Ok(());
            };

            let Some(snapshot) = store.load_stacks(&pool, block)? else {
                bail!("No loyalty stacks saved for pool {pool} at block {block}");
            };
            let rows = snapshot
                .stacks
                .iter()
                .map(|(address, stack)| {
                    Ok(StackRow {
                        address: *address,
                        holding: stack.total(),
                        tranches: stack.tranches().len(),
                        multiplier: stack.multiplier()?,
                    })
                })
                .collect::<Result<Vec<_>>>()?;
            output.write(&rows, &format!("stacks-{pool}-{block}"))
        }
        InspectCommands::Periods { start, end, output } => {
            let rows: Vec<PeriodRow> = orchestrator
                .plan_periods(start, end)
                .await?
                .into_iter()
                .map(|p| PeriodRow {
                    start_timestamp: p.start_timestamp,
                    end_timestamp: p.end_timestamp,
                    start_block: p.period.start_block,
                    end_block: p.period.end_block,
                })
                .collect();
            output.write(&rows, &format!("periods-{start}-{end}"))
        }
        InspectCommands::SpotCheck {
            pool,
            start_block,
            end_block,
            samples,
            address,
            seed,
        } => {
            let mut rng = StdRng::seed_from_u64(seed.unwrap_or_else(rand::random));
            let blocks = sample_blocks(start_block, end_block, samples, &mut rng);
            let fetcher = orchestrator.fetcher();

            let inputs = fetcher
                .fetch_value_inputs(pool, start_block, end_block)
                .await?;
            let curve =
                build_value_curve(&inputs.points, inputs.initial_value, start_block, end_block)?;
            let checked = spot_check_values(fetcher, pool, &curve, &blocks).await?;
            info!("{} value samples of pool {} match", checked, pool);

            if let Some(address) = address {
                let transfers = fetcher.fetch_transfers(pool, 0, end_block).await?;
                let ledger = BalanceLedger::new(&transfers);
                let checked =
                    spot_check_balances(fetcher, pool, &ledger, &address, &blocks).await?;
                info!("{} balance samples of {} match", checked, address);
            }
            Ok(())
        }
    }
}
