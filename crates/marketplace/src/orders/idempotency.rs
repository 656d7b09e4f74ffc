//! In-process idempotency for order creation.
//!
//! Concurrent requests sharing an `Idempotency-Key` are coalesced into one
//! execution; completed keys are remembered for [`IDEMPOTENCY_TTL`]. Failed
//! executions are not cached, so a retry runs again (and resumes from the
//! durable record in `pedidos`).

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use moka::future::Cache;

use ingresso_core::OrderId;

use super::OrderError;

/// How long a completed key is remembered in memory.
pub const IDEMPOTENCY_TTL: Duration = Duration::from_secs(24 * 60 * 60);

const MAX_ENTRIES: u64 = 10_000;

/// Outcome stored for a key.
#[derive(Debug)]
struct CompletedOrder {
    fingerprint: serde_json::Value,
    order_id: OrderId,
}

/// Map of idempotency keys to created orders.
#[derive(Clone)]
pub struct IdempotencyCache {
    entries: Cache<String, Arc<CompletedOrder>>,
}

impl Default for IdempotencyCache {
    fn default() -> Self {
        Self::new(IDEMPOTENCY_TTL)
    }
}

impl IdempotencyCache {
    /// Create a cache remembering keys for `ttl`.
    #[must_use]
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: Cache::builder()
                .max_capacity(MAX_ENTRIES)
                .time_to_live(ttl)
                .build(),
        }
    }

    /// Run `create` at most once per key.
    ///
    /// `fingerprint` identifies the request body; reusing a key with a
    /// different body fails with [`OrderError::IdempotencyConflict`].
    ///
    /// # Errors
    ///
    /// Returns the error of `create` (shared by coalesced callers), or a
    /// conflict on fingerprint mismatch.
    pub async fn run<F>(
        &self,
        key: &str,
        fingerprint: &serde_json::Value,
        create: F,
    ) -> Result<OrderId, OrderError>
    where
        F: Future<Output = Result<OrderId, OrderError>>,
    {
        let stored_fingerprint = fingerprint.clone();
        let entry = self
            .entries
            .try_get_with(key.to_owned(), async move {
                create.await.map(|order_id| {
                    Arc::new(CompletedOrder {
                        fingerprint: stored_fingerprint,
                        order_id,
                    })
                })
            })
            .await
            .map_err(|shared: Arc<OrderError>| (*shared).clone())?;

        if entry.fingerprint != *fingerprint {
            return Err(OrderError::IdempotencyConflict);
        }
        Ok(entry.order_id.clone())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use ingresso_core::ValidationError;

    use super::*;

    #[tokio::test]
    async fn test_second_call_reuses_outcome() {
        let cache = IdempotencyCache::default();
        let calls = AtomicUsize::new(0);
        let body = serde_json::json!({ "total": 10 });

        for _ in 0..2 {
            let id = cache
                .run("key-1", &body, async {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok(OrderId::new("42"))
                })
                .await
                .unwrap();
            assert_eq!(id.as_str(), "42");
        }

        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_concurrent_calls_are_coalesced() {
        let cache = IdempotencyCache::default();
        let calls = Arc::new(AtomicUsize::new(0));
        let body = serde_json::json!({ "total": 10 });

        let run = || {
            let cache = cache.clone();
            let calls = Arc::clone(&calls);
            let body = body.clone();
            async move {
                cache
                    .run("key-1", &body, async {
                        calls.fetch_add(1, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(50)).await;
                        Ok(OrderId::new("7"))
                    })
                    .await
            }
        };

        let (a, b) = tokio::join!(run(), run());

        assert_eq!(a.unwrap().as_str(), "7");
        assert_eq!(b.unwrap().as_str(), "7");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_different_body_is_conflict() {
        let cache = IdempotencyCache::default();
        cache
            .run("key-1", &serde_json::json!({ "total": 10 }), async {
                Ok(OrderId::new("1"))
            })
            .await
            .unwrap();

        let err = cache
            .run("key-1", &serde_json::json!({ "total": 99 }), async {
                Ok(OrderId::new("2"))
            })
            .await
            .unwrap_err();

        assert!(matches!(err, OrderError::IdempotencyConflict));
    }

    #[tokio::test]
    async fn test_failures_are_not_cached() {
        let cache = IdempotencyCache::default();
        let body = serde_json::json!({});

        let err = cache
            .run("key-1", &body, async {
                Err(OrderError::Validation(ValidationError::EmptyCart))
            })
            .await
            .unwrap_err();
        assert!(matches!(err, OrderError::Validation(_)));

        let id = cache
            .run("key-1", &body, async { Ok(OrderId::new("3")) })
            .await
            .unwrap();
        assert_eq!(id.as_str(), "3");
    }
}
