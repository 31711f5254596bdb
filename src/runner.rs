//! Generic bounded-concurrency task runner
//!
//! Drives an arbitrary per-item async operation over a sequence of work
//! items with at most `concurrency` operations in flight; as each completes
//! the next queued item starts. Results are collected in input order
//! regardless of completion order, and a progress callback fires with a
//! monotonically increasing completion count. One item's failure never
//! cancels its in-flight siblings: each item resolves to its own `Result`.

use crate::error::Result;
use futures::stream::{self, StreamExt};
use std::future::Future;

/// Default concurrency limit for metadata/name fetches
pub const DEFAULT_CONCURRENCY: usize = 5;

/// Run `op` over `items` with at most `concurrency` operations in flight.
///
/// `progress` receives `(percent, completed, total)` after every completion.
/// The returned vector has one entry per input item, in input order.
///
/// # Examples
/// ```
/// use roistat::runner::run_bounded;
///
/// # async fn example() {
/// let results = run_bounded(
///     vec![1u64, 2, 3],
///     2,
///     |n, _index| async move { Ok(n * 10) },
///     |_percent, _completed, _total| {},
/// )
/// .await;
/// assert_eq!(results.len(), 3);
/// # }
/// ```
pub async fn run_bounded<I, T, F, Fut, P>(
    items: Vec<I>,
    concurrency: usize,
    mut op: F,
    mut progress: P,
) -> Vec<Result<T>>
where
    F: FnMut(I, usize) -> Fut,
    Fut: Future<Output = Result<T>>,
    P: FnMut(f64, usize, usize),
{
    let total = items.len();
    if total == 0 {
        return Vec::new();
    }

    let mut slots: Vec<Option<Result<T>>> = Vec::with_capacity(total);
    slots.resize_with(total, || None);

    let mut in_flight = stream::iter(items.into_iter().enumerate())
        .map(|(index, item)| {
            let fut = op(item, index);
            async move { (index, fut.await) }
        })
        .buffer_unordered(concurrency.max(1));

    let mut completed = 0usize;
    while let Some((index, result)) = in_flight.next().await {
        completed += 1;
        progress((completed as f64 / total as f64) * 100.0, completed, total);
        slots[index] = Some(result);
    }
    drop(in_flight);

    slots
        .into_iter()
        .map(|slot| slot.expect("every scheduled item completes exactly once"))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RoistatError;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::time::{Duration, sleep};

    #[tokio::test]
    async fn test_results_preserve_input_order() {
        // Earlier items sleep longer, so completion order is reversed
        let results = run_bounded(
            vec![30u64, 20, 10],
            3,
            |delay_ms, index| async move {
                sleep(Duration::from_millis(delay_ms)).await;
                Ok(index)
            },
            |_, _, _| {},
        )
        .await;

        let order: Vec<usize> = results.into_iter().map(|r| r.unwrap()).collect();
        assert_eq!(order, vec![0, 1, 2]);
    }

    #[tokio::test]
    async fn test_failure_does_not_abort_siblings() {
        let results = run_bounded(
            vec![0usize, 1, 2, 3, 4],
            2,
            |n, _| async move {
                sleep(Duration::from_millis(5)).await;
                if n == 2 {
                    Err(RoistatError::InvalidArgument("item 3 failed".to_string()))
                } else {
                    Ok(n * 100)
                }
            },
            |_, _, _| {},
        )
        .await;

        assert_eq!(results.len(), 5);
        assert!(results[2].is_err());
        let succeeded: Vec<usize> =
            results.iter().filter_map(|r| r.as_ref().ok().copied()).collect();
        assert_eq!(succeeded, vec![0, 100, 300, 400]);
    }

    #[tokio::test]
    async fn test_concurrency_limit_is_respected() {
        let active = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let active_ref = Arc::clone(&active);
        let peak_ref = Arc::clone(&peak);
        let _ = run_bounded(
            (0..10u64).collect(),
            2,
            move |_, _| {
                let active = Arc::clone(&active_ref);
                let peak = Arc::clone(&peak_ref);
                async move {
                    let now = active.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    sleep(Duration::from_millis(10)).await;
                    active.fetch_sub(1, Ordering::SeqCst);
                    Ok(())
                }
            },
            |_, _, _| {},
        )
        .await;

        assert!(peak.load(Ordering::SeqCst) <= 2);
    }

    #[tokio::test]
    async fn test_progress_is_monotonic_and_complete() {
        let mut seen = Vec::new();
        let _ = run_bounded(
            vec![1u64, 2, 3, 4],
            2,
            |_, _| async move { Ok(()) },
            |percent, completed, total| {
                seen.push((percent, completed, total));
            },
        )
        .await;

        assert_eq!(seen.len(), 4);
        for pair in seen.windows(2) {
            assert!(pair[1].1 > pair[0].1);
        }
        assert_eq!(seen.last(), Some(&(100.0, 4, 4)));
    }

    #[tokio::test]
    async fn test_empty_input() {
        let results: Vec<crate::error::Result<()>> =
            run_bounded(Vec::<u8>::new(), 4, |_, _| async move { Ok(()) }, |_, _, _| {}).await;
        assert!(results.is_empty());
    }
}
