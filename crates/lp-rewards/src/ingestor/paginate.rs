use crate::ingestor::error::{FetchError, Result};
use backon::{ExponentialBuilder, Retryable};
use futures::{StreamExt, stream};
use std::{
    collections::HashSet,
    future::Future,
    hash::Hash,
    sync::atomic::{AtomicUsize, Ordering},
    time::Duration,
};
use tracing::{debug, warn};

/// Split `[from_block, to_block)` into consecutive pages of at most
/// `page_blocks` blocks
pub fn split_range(from_block: u64, to_block: u64, page_blocks: u64) -> Vec<(u64, u64)> {
    let step = page_blocks.max(1);
    let mut pages = Vec::new();
    let mut cursor = from_block;
    while cursor < to_block {
        let next = cursor.saturating_add(step).min(to_block);
        pages.push((cursor, next));
        cursor = next;
    }
    pages
}

/// Run `operation`, retrying transient failures with exponential backoff
pub async fn with_retry<F, Fut, T>(operation: F, max_retries: usize, label: &'static str) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut op = operation;
    let attempts = AtomicUsize::new(0);
    let backoff = ExponentialBuilder::default()
        .with_min_delay(Duration::from_millis(200))
        .with_max_delay(Duration::from_secs(10))
        .with_max_times(max_retries)
        .with_jitter();

    (move || op())
        .retry(backoff)
        .when(|err: &FetchError| err.is_retryable())
        .notify(|err: &FetchError, delay: Duration| {
            let attempt = attempts.fetch_add(1, Ordering::Relaxed) + 1;
            warn!(attempt, retry_in = ?delay, error = ?err, operation = label, "transient fetch failure");
        })
        .await
}

/// Fetch every page of `ranges` with at most `concurrency` requests in flight.
///
/// Each page is retried on its own. Pages complete in any order; callers sort
/// and deduplicate the merged result. Crossing `max_records` fails the whole
/// fetch instead of returning a truncated result.
pub async fn fetch_pages<F, Fut, T>(
    ranges: Vec<(u64, u64)>,
    concurrency: usize,
    max_records: usize,
    max_retries: usize,
    fetch_page: F,
) -> Result<Vec<T>>
where
    F: Fn(u64, u64) -> Fut,
    Fut: Future<Output = Result<Vec<T>>>,
{
    let page_count = ranges.len();
    let fetch_page = &fetch_page;
    let mut pages = stream::iter(ranges)
        .map(|(from, to)| with_retry(move || fetch_page(from, to), max_retries, "fetch_page"))
        .buffer_unordered(concurrency.max(1));

    let mut records = Vec::new();
    while let Some(page) = pages.next().await {
        let page = page?;
        records.extend(page);
        if records.len() > max_records {
            return Err(FetchError::PageLimitExceeded {
                limit: max_records,
                fetched: records.len(),
            });
        }
    }

    debug!("Fetched {} records over {} pages", records.len(), page_count);
    Ok(records)
}

/// Drop repeated records, keeping the first occurrence.
///
/// Records for which `key` returns `None` carry no stable identifier and are
/// always kept.
pub fn dedup_by_id<T, K, F>(records: Vec<T>, key: F) -> Vec<T>
where
    K: Eq + Hash,
    F: Fn(&T) -> Option<K>,
{
    let mut seen = HashSet::new();
    records
        .into_iter()
        .filter(|record| match key(record) {
            Some(id) => seen.insert(id),
            None => true,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_range() {
        assert_eq!(split_range(0, 10, 4), vec![(0, 4), (4, 8), (8, 10)]);
        assert_eq!(split_range(5, 6, 100), vec![(5, 6)]);
        assert!(split_range(10, 10, 4).is_empty());
        // zero page size still makes progress
        assert_eq!(split_range(0, 2, 0), vec![(0, 1), (1, 2)]);
    }

    #[tokio::test]
    async fn test_fetch_pages_collects_all() {
        let ranges = split_range(0, 100, 10);
        let mut records = fetch_pages(ranges, 3, 1_000, 0, |from, to| async move {
            Ok::<_, FetchError>((from..to).collect::<Vec<u64>>())
        })
        .await
        .unwrap();
        records.sort_unstable();
        assert_eq!(records, (0..100).collect::<Vec<u64>>());
    }

    #[tokio::test]
    async fn test_fetch_pages_ceiling_is_fatal() {
        let ranges = split_range(0, 100, 10);
        let result = fetch_pages(ranges, 2, 25, 0, |from, to| async move {
            Ok::<_, FetchError>((from..to).collect::<Vec<u64>>())
        })
        .await;
        assert!(matches!(
            result,
            Err(FetchError::PageLimitExceeded { limit: 25, .. })
        ));
    }

    #[tokio::test]
    async fn test_transient_failures_are_retried() {
        let calls = AtomicUsize::new(0);
        let value = with_retry(
            || {
                let attempt = calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if attempt < 2 {
                        Err(FetchError::Transient("flaky".into()))
                    } else {
                        Ok(7u64)
                    }
                }
            },
            5,
            "test",
        )
        .await
        .unwrap();
        assert_eq!(value, 7);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_permanent_failures_are_not_retried() {
        let calls = AtomicUsize::new(0);
        let result: Result<u64> = with_retry(
            || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(FetchError::Source("bad request".into())) }
            },
            5,
            "test",
        )
        .await;
        assert!(matches!(result, Err(FetchError::Source(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_dedup_by_id() {
        let records = vec![(1, "a"), (2, "b"), (3, "a"), (4, ""), (5, "")];
        let deduped = dedup_by_id(records, |(_, id)| (!id.is_empty()).then_some(*id));
        assert_eq!(deduped, vec![(1, "a"), (2, "b"), (4, ""), (5, "")]);
    }
}
