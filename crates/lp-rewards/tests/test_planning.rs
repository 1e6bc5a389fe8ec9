mod common;

use common::*;
use lp_rewards::{
    calculator::orchestrator::Orchestrator,
    ingestor::{
        error::FetchError,
        fetcher::{MockBlockClock, MockLedgerSource},
    },
};
use mockall::{Sequence, predicate::eq};
use std::sync::Arc;

#[tokio::test]
async fn test_plan_periods_resolves_boundaries() {
    let dir = tempfile::tempdir().unwrap();
    let settings = create_test_settings(&[pool_a()], dir.path());

    let mut clock = MockBlockClock::new();
    clock
        .expect_block_at_or_before()
        .returning(|ts| Ok((ts / BLOCK_TIME) as u64 + 1000));

    let orchestrator = Orchestrator::new(Arc::new(MockLedgerSource::new()), Arc::new(clock), &settings);
    let planned = orchestrator.plan_periods(1_000, 1_250).await.unwrap();

    assert_eq!(planned.len(), 3);
    assert_eq!(planned[0].start_timestamp, 1_000);
    assert_eq!(planned[0].period.start_block, 1_100);
    assert_eq!(planned[0].period.end_block, 1_110);
    assert_eq!(planned[2].period.start_block, 1_120);
    assert_eq!(planned[2].period.end_block, 1_125);
}

#[tokio::test]
async fn test_plan_periods_rejects_empty_block_range() {
    let dir = tempfile::tempdir().unwrap();
    let settings = create_test_settings(&[pool_a()], dir.path());

    // no blocks produced between the two boundaries
    let mut clock = MockBlockClock::new();
    clock.expect_block_at_or_before().returning(|_| Ok(500));

    let orchestrator = Orchestrator::new(Arc::new(MockLedgerSource::new()), Arc::new(clock), &settings);
    assert!(orchestrator.plan_periods(0, 100).await.is_err());
}

#[tokio::test]
async fn test_plan_periods_retries_transient_clock_errors() {
    let dir = tempfile::tempdir().unwrap();
    let mut settings = create_test_settings(&[pool_a()], dir.path());
    settings.fetch.max_retries = 2;

    let mut seq = Sequence::new();
    let mut clock = MockBlockClock::new();
    clock
        .expect_block_at_or_before()
        .with(eq(0))
        .times(1)
        .in_sequence(&mut seq)
        .returning(|_| Err(FetchError::Transient("node restarting".into())));
    clock
        .expect_block_at_or_before()
        .with(eq(0))
        .times(1)
        .in_sequence(&mut seq)
        .returning(|_| Ok(1));
    clock
        .expect_block_at_or_before()
        .with(eq(100))
        .times(1)
        .in_sequence(&mut seq)
        .returning(|_| Ok(11));

    let orchestrator = Orchestrator::new(Arc::new(MockLedgerSource::new()), Arc::new(clock), &settings);
    let planned = orchestrator.plan_periods(0, 100).await.unwrap();
    assert_eq!(planned.len(), 1);
    assert_eq!(planned[0].period.start_block, 1);
    assert_eq!(planned[0].period.end_block, 11);
}

#[tokio::test]
async fn test_source_failure_aborts_period() {
    let dir = tempfile::tempdir().unwrap();
    let settings = create_test_settings(&[pool_a()], dir.path());

    let mut source = MockLedgerSource::new();
    source
        .expect_transfers()
        .returning(|_, _, _| Err(FetchError::Source("malformed log".into())));

    let mut clock = MockBlockClock::new();
    clock
        .expect_block_at_or_before()
        .returning(|ts| Ok((ts / BLOCK_TIME) as u64));

    let orchestrator = Orchestrator::new(Arc::new(source), Arc::new(clock), &settings);
    let err = orchestrator
        .run_super_period(100, 200, &orchestrator.params(), true)
        .await
        .unwrap_err();
    assert!(format!("{err:#}").contains("malformed log"));
    assert!(!settings.state.dir.exists());
}
