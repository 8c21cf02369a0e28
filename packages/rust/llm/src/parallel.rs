//! Bounded-concurrency fan-out for independent LLM calls.

use std::future::Future;
use std::sync::Arc;

use tokio::sync::Semaphore;
use tracing::warn;

use brandlens_shared::{BrandlensError, Result};

/// Run `task` over `items` with at most `concurrency` in flight.
///
/// Results come back in input order. A failing or panicking item yields
/// its own `Err` and never affects the others.
pub async fn run_bounded<T, R, F, Fut>(items: Vec<T>, concurrency: usize, task: F) -> Vec<Result<R>>
where
    T: Send + 'static,
    R: Send + 'static,
    F: Fn(T) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<R>> + Send + 'static,
{
    let semaphore = Arc::new(Semaphore::new(concurrency.max(1)));
    let task = Arc::new(task);

    let handles: Vec<_> = items
        .into_iter()
        .map(|item| {
            let sem = semaphore.clone();
            let task = task.clone();
            tokio::spawn(async move {
                let _permit = sem
                    .acquire_owned()
                    .await
                    .map_err(|e| BrandlensError::Task(e.to_string()))?;
                task(item).await
            })
        })
        .collect();

    let mut results = Vec::with_capacity(handles.len());
    for (index, handle) in handles.into_iter().enumerate() {
        let result = match handle.await {
            Ok(result) => result,
            Err(e) => {
                warn!(index, error = %e, "bounded task did not complete");
                Err(BrandlensError::Task(e.to_string()))
            }
        };
        results.push(result);
    }
    results
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn preserves_order_and_isolates_failures() {
        let results = run_bounded(vec![1u32, 2, 3, 4], 2, |n| async move {
            if n == 3 {
                Err(BrandlensError::Network("boom".into()))
            } else {
                Ok(n * 10)
            }
        })
        .await;

        assert_eq!(results.len(), 4);
        assert_eq!(results[0].as_ref().unwrap(), &10);
        assert_eq!(results[1].as_ref().unwrap(), &20);
        assert!(results[2].is_err());
        assert_eq!(results[3].as_ref().unwrap(), &40);
    }

    #[tokio::test]
    async fn never_exceeds_the_gate() {
        let in_flight = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        let (f, p) = (in_flight.clone(), peak.clone());

        let results = run_bounded((0..12).collect(), 3, move |_: u32| {
            let (f, p) = (f.clone(), p.clone());
            async move {
                let now = f.fetch_add(1, Ordering::SeqCst) + 1;
                p.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(5)).await;
                f.fetch_sub(1, Ordering::SeqCst);
                Ok(())
            }
        })
        .await;

        assert!(results.iter().all(|r| r.is_ok()));
        assert!(peak.load(Ordering::SeqCst) <= 3);
    }

    #[tokio::test]
    async fn zero_concurrency_still_runs() {
        let results = run_bounded(vec![1u8], 0, |n| async move { Ok(n) }).await;
        assert_eq!(results[0].as_ref().unwrap(), &1);
    }

    #[tokio::test]
    async fn empty_input_is_empty_output() {
        let results: Vec<Result<u8>> = run_bounded(Vec::<u8>::new(), 4, |n| async move { Ok(n) }).await;
        assert!(results.is_empty());
    }
}
