use crate::cli::common::{OutputOptions, parse_timestamp};
use anyhow::{Result, ensure};
use clap::Subcommand;
use lp_rewards::{
    calculator::{
        allocation::PayoutMap,
        orchestrator::{EngineParams, Orchestrator, Period},
    },
    ingestor::fetcher::{BlockClock, LedgerSource},
    report::PayoutReport,
};
use rust_decimal::Decimal;
use tracing::{info, warn};

/// Reward allocation commands
#[derive(Subcommand, Debug)]
pub enum RewardsCommands {
    #[command(
        about = "Allocate rewards over a time range split into sub-periods",
        after_help = r#"Examples:
    # Allocate one week and persist loyalty stacks and the cumulative report
    calculate --start 2024-03-01 --end 2024-03-08

    # Preview without touching saved state
    calculate --start 1709251200 --end 1709856000 --dry-run

    # Override the per-period budget and write CSV
    calculate --start 2024-03-01 --end 2024-03-08 --budget 5000 -f csv"#
    )]
    Calculate {
        /// Range start: unix seconds, RFC 3339 or YYYY-MM-DD
        #[arg(long, value_name = "TIME", value_parser = parse_timestamp)]
        start: i64,

        /// Range end (exclusive): unix seconds, RFC 3339 or YYYY-MM-DD
        #[arg(long, value_name = "TIME", value_parser = parse_timestamp)]
        end: i64,

        /// Skip persisting loyalty stacks and the cumulative report
        #[arg(long)]
        dry_run: bool,

        /// Budget per sub-period (defaults to the configured budget)
        #[arg(long, value_name = "AMOUNT")]
        budget: Option<Decimal>,

        #[command(flatten)]
        output: OutputOptions,
    },
    #[command(
        about = "Allocate rewards over a single block range",
        after_help = r#"Examples:
    # Allocate blocks [1000, 2000) and save the resulting loyalty stacks
    run-period --start-block 1000 --end-block 2000

    # Preview to stdout
    run-period --start-block 1000 --end-block 2000 --dry-run --output-file /dev/stdout"#
    )]
    RunPeriod {
        /// First block of the period
        #[arg(long, value_name = "BLOCK")]
        start_block: u64,

        /// Block after the last block of the period
        #[arg(long, value_name = "BLOCK")]
        end_block: u64,

        /// Skip persisting loyalty stacks
        #[arg(long)]
        dry_run: bool,

        /// Budget for the period (defaults to the configured budget)
        #[arg(long, value_name = "AMOUNT")]
        budget: Option<Decimal>,

        #[command(flatten)]
        output: OutputOptions,
    },
}

/// Handle rewards commands
pub async fn handle<S: LedgerSource, C: BlockClock>(
    orchestrator: &Orchestrator<S, C>,
    cmd: RewardsCommands,
) -> Result<()> {
    match cmd {
        RewardsCommands::Calculate {
            start,
            end,
            dry_run,
            budget,
            output,
        } => {
            let params = params_with_budget(orchestrator, budget)?;
            let outcome = orchestrator
                .run_super_period(start, end, &params, false)
                .await?;

            let incremental = payout_report(orchestrator, &outcome.incremental);
            let cumulative = payout_report(orchestrator, &outcome.cumulative);
            let clawbacks = outcome
                .incremental
                .values()
                .filter(|v| **v < Decimal::ZERO)
                .count();
            if clawbacks > 0 {
                warn!(
                    "{} addresses earned less than previously reported; their rows are omitted",
                    clawbacks
                );
            }
            info!(
                "Incremental payout over {} sub-periods: {} to {} addresses (cumulative {})",
                outcome.periods.len(),
                incremental.total(),
                incremental.len(),
                cumulative.total()
            );

            let output = output.or_dir(&orchestrator.settings.report.output_dir);
            output.write(&incremental, &format!("payouts-{end}"))?;
            if output.output_file.is_none() {
                output.write(&cumulative, &format!("cumulative-{end}"))?;
            }
            // state only moves forward once the reports are on disk
            if dry_run {
                info!("Dry run: no state was persisted");
            } else {
                orchestrator.persist_super_period(&outcome)?;
            }
            Ok(())
        }
        RewardsCommands::RunPeriod {
            start_block,
            end_block,
            dry_run,
            budget,
            output,
        } => {
            let params = params_with_budget(orchestrator, budget)?;
            let period = Period::new(start_block, end_block)?;
            let outcome = orchestrator.calculate_period(period, &params).await?;

            let report = payout_report(orchestrator, &outcome.payouts);
            info!(
                "Allocated {} to {} addresses",
                report.total(),
                report.len()
            );
            output
                .or_dir(&orchestrator.settings.report.output_dir)
                .write(&report, &format!("payouts-{start_block}-{end_block}"))?;
            if !dry_run {
                orchestrator.persist_stacks(&outcome)?;
            }
            Ok(())
        }
    }
}

fn params_with_budget<S: LedgerSource, C: BlockClock>(
    orchestrator: &Orchestrator<S, C>,
    budget: Option<Decimal>,
) -> Result<EngineParams> {
    let mut params = orchestrator.params();
    if let Some(budget) = budget {
        ensure!(budget > Decimal::ZERO, "Budget must be positive, got {budget}");
        params.budget = budget;
    }
    Ok(params)
}

fn payout_report<S: LedgerSource, C: BlockClock>(
    orchestrator: &Orchestrator<S, C>,
    payouts: &PayoutMap,
) -> PayoutReport {
    let report = &orchestrator.settings.report;
    PayoutReport::from_payouts(payouts, report.precision, report.asset.as_deref())
}
