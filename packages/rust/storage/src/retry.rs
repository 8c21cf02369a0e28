//! Bounded retry for transient write contention.

use std::future::Future;
use std::time::Duration;

use tracing::warn;

use brandlens_shared::{BrandlensError, Result, RetryPolicy};

/// True for the "database is locked / busy" family of failures.
pub fn is_busy(err: &BrandlensError) -> bool {
    match err {
        BrandlensError::Storage(message) => {
            let lower = message.to_lowercase();
            lower.contains("database is locked")
                || lower.contains("database is busy")
                || lower.contains("sqlite_busy")
                || lower.contains("sqlite_locked")
        }
        _ => false,
    }
}

/// Run `op` until it succeeds, fails with a non-busy error, or the policy's
/// attempts are spent. Exhaustion becomes [`BrandlensError::StoreContention`].
pub async fn with_busy_retry<T, F, Fut>(operation: &str, policy: RetryPolicy, mut op: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 0;
    loop {
        attempt += 1;
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) if is_busy(&e) => {
                if attempt >= max_attempts {
                    return Err(BrandlensError::contention(operation, attempt, e.to_string()));
                }
                let delay = policy.delay_ms(attempt);
                warn!(operation, attempt, delay_ms = delay, "store busy, retrying");
                tokio::time::sleep(Duration::from_millis(delay)).await;
            }
            Err(e) => return Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast_policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            base_delay_ms: 1,
            max_delay_ms: 2,
        }
    }

    #[test]
    fn recognises_busy_messages() {
        assert!(is_busy(&BrandlensError::Storage("database is locked".into())));
        assert!(is_busy(&BrandlensError::Storage("SQLITE_BUSY: database is busy".into())));
        assert!(!is_busy(&BrandlensError::Storage("no such table".into())));
        assert!(!is_busy(&BrandlensError::validation("database is locked")));
    }

    #[tokio::test]
    async fn gives_up_after_max_attempts() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();
        let result: Result<()> = with_busy_retry("upsert_mapping", fast_policy(5), || {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err(BrandlensError::Storage("database is locked".into()))
            }
        })
        .await;
        assert_eq!(calls.load(Ordering::SeqCst), 5);
        match result {
            Err(BrandlensError::StoreContention { operation, attempts, .. }) => {
                assert_eq!(operation, "upsert_mapping");
                assert_eq!(attempts, 5);
            }
            other => panic!("expected contention, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn recovers_when_the_lock_clears() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();
        let result = with_busy_retry("op", fast_policy(5), || {
            let counter = counter.clone();
            async move {
                if counter.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err(BrandlensError::Storage("database is busy".into()))
                } else {
                    Ok(42)
                }
            }
        })
        .await;
        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn other_errors_are_not_retried() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();
        let result: Result<()> = with_busy_retry("op", fast_policy(5), || {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err(BrandlensError::Storage("constraint failed".into()))
            }
        })
        .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn locked_store_writes_surface_as_contention() {
        use crate::test_support::{contended_storage, hold_write_lock};
        use brandlens_shared::EntityType;

        let (storage, path) = contended_storage(3).await;
        let vertical = storage.ensure_vertical("Cars", None).await.unwrap();
        let lock = hold_write_lock(&path).await;

        match storage.upsert_entity(&vertical.id, EntityType::Brand, "Toyota", 1, false).await {
            Err(BrandlensError::StoreContention { operation, attempts, .. }) => {
                assert_eq!(operation, "upsert_entity");
                assert_eq!(attempts, 3);
            }
            other => panic!("expected contention, got {other:?}"),
        }
        let rejected = storage.reject_entity(&vertical.id, EntityType::Brand, "SUV", "generic").await;
        assert!(matches!(rejected, Err(BrandlensError::StoreContention { .. })), "{rejected:?}");

        lock.execute_batch("ROLLBACK").await.unwrap();
        let toyota = storage
            .upsert_entity(&vertical.id, EntityType::Brand, "Toyota", 1, false)
            .await
            .unwrap();
        assert_eq!(toyota.mention_count, 1);
    }

    #[tokio::test]
    async fn store_writes_wait_out_a_short_lock() {
        use crate::test_support::{contended_storage, hold_write_lock};
        use brandlens_shared::EntityType;

        let (storage, path) = contended_storage(6).await;
        let vertical = storage.ensure_vertical("Cars", None).await.unwrap();
        let lock = hold_write_lock(&path).await;
        let release = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(30)).await;
            lock.execute_batch("ROLLBACK").await.unwrap();
        });

        storage
            .reject_entity(&vertical.id, EntityType::Brand, "SUV", "generic")
            .await
            .unwrap();
        release.await.unwrap();
        assert!(storage.is_rejected(&vertical.id, EntityType::Brand, "suv").await.unwrap());
    }
}
