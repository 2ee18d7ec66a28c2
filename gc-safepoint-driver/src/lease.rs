//! Distributed lease, spec.md §4.1. Grounded on two examples: the CAS-based
//! acquire loop and background renewal task in
//! `examples/other_examples/65e1789a_catterer-rust-kube-lease__src-lease.rs.rs`
//! (`LeaseLockClient::acquire` / `schedule_renewal`), and the `async_trait`
//! `DistributedLock` interface shape in
//! `examples/other_examples/6b9f847a_penserai-acteon__acteon-state-etcd-src-lock.rs.rs`.
//!
//! The coordinator's actual CAS/session-TTL backend is an external
//! collaborator (spec.md §1 Non-goals); this module is the typed interface
//! plus the cancellation-token wiring the scheduler needs to observe loss.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

#[derive(Debug, thiserror::Error)]
pub enum LeaseError {
    #[error("lease backend request failed: {0}")]
    Backend(#[source] anyhow::Error),
}

/// A held lease. `lost` fires when the coordinator revokes the lease or the
/// session dies; the scheduler selects on it to cancel an in-flight tick
/// (spec.md §4.1 "On lease loss the driver must cancel any in-flight
/// periodic tick").
pub struct Lease {
    pub lost: CancellationToken,
    _renewal_task: tokio::task::JoinHandle<()>,
}

impl Lease {
    pub fn lost_token(&self) -> CancellationToken {
        self.lost.clone()
    }
}

impl Drop for Lease {
    fn drop(&mut self) {
        self._renewal_task.abort();
    }
}

#[async_trait]
pub trait LeaseBackend: Send + Sync + 'static {
    /// Attempts a single acquire-or-renew compare-and-set. `Ok(true)` means
    /// this process now holds (or still holds) the lease.
    async fn try_acquire_or_renew(&self, holder_id: &str, ttl: Duration) -> Result<bool, LeaseError>;

    async fn release(&self, holder_id: &str) -> Result<(), LeaseError>;
}

const RENEW_INTERVAL_FRACTION: u32 = 3;

/// Blocks until `holder_id` holds the named lease, then spawns a background
/// renewal loop and returns a `Lease` whose `lost` token fires the moment a
/// renewal attempt observes the lease is no longer held.
pub async fn acquire<B: LeaseBackend>(
    backend: Arc<B>,
    holder_id: String,
    ttl: Duration,
    poll_interval: Duration,
) -> Lease {
    loop {
        match backend.try_acquire_or_renew(&holder_id, ttl).await {
            Ok(true) => break,
            Ok(false) => tokio::time::sleep(poll_interval).await,
            Err(err) => {
                tracing::warn!(?err, "lease acquire attempt failed, retrying");
                tokio::time::sleep(poll_interval).await;
            }
        }
    }

    let lost = CancellationToken::new();
    let renewal_task = {
        let lost = lost.clone();
        let backend = backend.clone();
        let renew_interval = ttl / RENEW_INTERVAL_FRACTION;
        tokio::spawn(async move {
            loop {
                tokio::time::sleep(renew_interval).await;
                match backend.try_acquire_or_renew(&holder_id, ttl).await {
                    Ok(true) => continue,
                    Ok(false) => {
                        tracing::warn!("lease lost: renewal observed another holder");
                        lost.cancel();
                        return;
                    }
                    Err(err) => {
                        tracing::warn!(?err, "lease renewal request failed");
                        lost.cancel();
                        return;
                    }
                }
            }
        })
    };

    Lease {
        lost,
        _renewal_task: renewal_task,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

    struct FlakyBackend {
        acquired_after: u32,
        attempts: AtomicU32,
        keep_holding: AtomicBool,
    }

    #[async_trait]
    impl LeaseBackend for FlakyBackend {
        async fn try_acquire_or_renew(&self, _holder_id: &str, _ttl: Duration) -> Result<bool, LeaseError> {
            let n = self.attempts.fetch_add(1, Ordering::SeqCst);
            if n < self.acquired_after {
                return Ok(false);
            }
            Ok(self.keep_holding.load(Ordering::SeqCst))
        }

        async fn release(&self, _holder_id: &str) -> Result<(), LeaseError> {
            Ok(())
        }
    }

    #[tokio::test(start_paused = true)]
    async fn acquire_retries_until_backend_grants_lease() {
        let backend = Arc::new(FlakyBackend {
            acquired_after: 2,
            attempts: AtomicU32::new(0),
            keep_holding: AtomicBool::new(true),
        });
        let lease = acquire(
            backend.clone(),
            "node-1".into(),
            Duration::from_secs(30),
            Duration::from_millis(1),
        )
        .await;
        assert!(!lease.lost.is_cancelled());
    }

    #[tokio::test(start_paused = true)]
    async fn renewal_failure_fires_lost_token() {
        let backend = Arc::new(FlakyBackend {
            acquired_after: 0,
            attempts: AtomicU32::new(0),
            keep_holding: AtomicBool::new(true),
        });
        let lease = acquire(
            backend.clone(),
            "node-1".into(),
            Duration::from_millis(30),
            Duration::from_millis(1),
        )
        .await;
        let lost = lease.lost_token();
        backend.keep_holding.store(false, Ordering::SeqCst);
        tokio::time::timeout(Duration::from_secs(5), lost.cancelled())
            .await
            .expect("lost token should fire once renewal observes the lease is gone");
    }
}
