//! Small shared utilities. `TtlCache` backs both the region-client cache
//! (spec.md §4.5) and the region-map cache (SPEC_FULL.md supplement 2).

use std::collections::HashMap;
use std::hash::Hash;
use std::time::{Duration, Instant};

struct Entry<V> {
    value: V,
    inserted_at: Instant,
}

/// A tiny TTL-expiring cache. Not LRU-bounded: the driver's keyspaces
/// (region ids, a single region-map slot) are small enough that unbounded
/// growth within one TTL window is not a concern.
pub struct TtlCache<K, V> {
    ttl: Duration,
    entries: HashMap<K, Entry<V>>,
}

impl<K: Eq + Hash, V: Clone> TtlCache<K, V> {
    pub fn new(ttl: Duration) -> Self {
        TtlCache {
            ttl,
            entries: HashMap::new(),
        }
    }

    pub fn get(&self, key: &K) -> Option<V> {
        self.entries.get(key).and_then(|entry| {
            if entry.inserted_at.elapsed() < self.ttl {
                Some(entry.value.clone())
            } else {
                None
            }
        })
    }

    pub fn insert(&mut self, key: K, value: V) {
        self.entries.insert(
            key,
            Entry {
                value,
                inserted_at: Instant::now(),
            },
        );
    }

    pub fn invalidate(&mut self, key: &K) {
        self.entries.remove(key);
    }
}

/// Bounded retry with exponential backoff, cancellation-aware. Shaped after
/// `storage_controller/src/peer_client.rs`'s `step_down`, which wraps a
/// single fallible RPC in the sibling `utils::backoff::retry` helper; that
/// helper lives in Neon's internal `utils` crate and isn't vendored here,
/// so this reimplements its call shape locally.
///
/// Returns `None` if `cancel` fires before the operation succeeds, `Some`
/// of the last result otherwise (error or success) once retries are
/// exhausted or the operation succeeds.
pub async fn retry_with_backoff<T, E, F, Fut>(
    mut op: F,
    base_delay: Duration,
    max_retries: u32,
    description: &str,
    cancel: &tokio_util::sync::CancellationToken,
) -> Option<Result<T, E>>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T, E>>,
{
    let mut attempt = 0u32;
    loop {
        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => return None,
            result = op() => result,
        };

        match result {
            Ok(value) => return Some(Ok(value)),
            Err(err) => {
                if attempt >= max_retries {
                    tracing::warn!(
                        attempt,
                        max_retries,
                        description,
                        "retries exhausted"
                    );
                    return Some(Err(err));
                }
                let delay = base_delay * 2u32.saturating_pow(attempt);
                tracing::debug!(attempt, ?delay, description, "retrying after failure");
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => return None,
                    _ = tokio::time::sleep(delay) => {},
                }
                attempt += 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread::sleep;

    #[test]
    fn expires_after_ttl() {
        let mut cache: TtlCache<u64, &'static str> = TtlCache::new(Duration::from_millis(10));
        cache.insert(1, "a");
        assert_eq!(cache.get(&1), Some("a"));
        sleep(Duration::from_millis(20));
        assert_eq!(cache.get(&1), None);
    }

    #[test]
    fn invalidate_removes_before_ttl() {
        let mut cache: TtlCache<u64, &'static str> = TtlCache::new(Duration::from_secs(30));
        cache.insert(1, "a");
        cache.invalidate(&1);
        assert_eq!(cache.get(&1), None);
    }

    #[tokio::test]
    async fn retry_succeeds_after_transient_failures() {
        let attempts = std::sync::atomic::AtomicU32::new(0);
        let cancel = tokio_util::sync::CancellationToken::new();
        let result = retry_with_backoff(
            || {
                let n = attempts.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
                async move {
                    if n < 2 {
                        Err::<(), &'static str>("transient")
                    } else {
                        Ok(())
                    }
                }
            },
            Duration::from_millis(1),
            5,
            "test op",
            &cancel,
        )
        .await;
        assert!(matches!(result, Some(Ok(()))));
        assert_eq!(attempts.load(std::sync::atomic::Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn retry_gives_up_after_max_retries() {
        let cancel = tokio_util::sync::CancellationToken::new();
        let result = retry_with_backoff(
            || async { Err::<(), &'static str>("always fails") },
            Duration::from_millis(1),
            2,
            "test op",
            &cancel,
        )
        .await;
        assert!(matches!(result, Some(Err("always fails"))));
    }

    #[tokio::test]
    async fn retry_returns_none_on_cancellation() {
        let cancel = tokio_util::sync::CancellationToken::new();
        cancel.cancel();
        let result = retry_with_backoff(
            || async { Err::<(), &'static str>("fails") },
            Duration::from_millis(1),
            5,
            "test op",
            &cancel,
        )
        .await;
        assert!(result.is_none());
    }
}
