//! Driver scheduler, spec.md §4.2 and §9 Design Notes. Owns the
//! lease-acquire / periodic-tick / lease-loss-cancels-tick loop:
//!
//! ```text
//! loop {
//!     lease <- acquire()
//!     schedule(tick, every tick_period, after initial_delay)
//!     wait(lease.on_lost())
//!     schedule.cancel()
//! }
//! ```
//!
//! Grounded on `safekeeper.rs`'s top-level `FuturesUnordered` task
//! supervision loop and its `tokio::select!` between work and a shutdown
//! signal.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use gc_safepoint_api::control_keys::SAFE_POINT_UPDATE_DISABLE_KEY;
use gc_safepoint_api::Timestamp;
use tokio_util::sync::CancellationToken;

use crate::coordinator::CoordinatorClient;
use crate::error::TickError;
use crate::lease::{Lease, LeaseBackend};
use crate::metrics;
use crate::peer::PeerDirectory;
use crate::region::RegionClientFactory;
use crate::safepoint::SafePointComputer;
use crate::scan::ScanEngine;
use crate::tso::TsoClient;

pub enum TickOutcome {
    Published(Timestamp),
    SkippedDisabled(Timestamp),
}

/// The per-tick pipeline: safe-point computation followed by the
/// scan-and-resolve walk, gated by the coordinator's disable control key.
/// Separated from the scheduling loop below so it can be driven directly
/// in tests without any periodic timing involved.
pub struct Driver<T: TsoClient, C: CoordinatorClient, F: RegionClientFactory, D: PeerDirectory> {
    coordinator: Arc<C>,
    safepoint: SafePointComputer<T, C, D>,
    scan: ScanEngine<F, C>,
}

impl<T: TsoClient, C: CoordinatorClient, F: RegionClientFactory, D: PeerDirectory> Driver<T, C, F, D> {
    pub fn new(
        coordinator: Arc<C>,
        safepoint: SafePointComputer<T, C, D>,
        scan: ScanEngine<F, C>,
    ) -> Self {
        Driver {
            coordinator,
            safepoint,
            scan,
        }
    }

    #[tracing::instrument(skip(self, cancel))]
    pub async fn run_tick(&self, cancel: &CancellationToken) -> Result<TickOutcome, TickError> {
        let start = Instant::now();
        metrics::record_tick_start();

        let result = self.run_tick_inner(cancel).await;

        match &result {
            Ok((TickOutcome::Published(ts), stats)) => {
                tracing::info!(safe_ts = %ts, elapsed = ?start.elapsed(), locks_scanned = stats.locks_scanned, locks_resolved = stats.locks_resolved, locks_left = stats.locks_left, "tick published new safe point");
                metrics::record_scan_stats(*ts, stats);
                metrics::record_tick_result("success", start.elapsed());
            }
            Ok((TickOutcome::SkippedDisabled(ts), stats)) => {
                tracing::info!(computed_safe_ts = %ts, "safe point publication disabled, skipping");
                metrics::record_scan_stats(*ts, stats);
                metrics::record_tick_result("skipped_disabled", start.elapsed());
            }
            Err(err) => {
                tracing::warn!(kind = err.kind(), "tick failed: {err:#}");
                metrics::record_tick_failure(err, start.elapsed());
            }
        }
        result.map(|(outcome, _)| outcome)
    }

    async fn run_tick_inner(
        &self,
        cancel: &CancellationToken,
    ) -> Result<(TickOutcome, crate::scan::ScanStats), TickError> {
        if cancel.is_cancelled() {
            return Err(TickError::LeaseLost);
        }

        let disabled = self
            .coordinator
            .kv_get(SAFE_POINT_UPDATE_DISABLE_KEY)
            .await
            .map_err(|err| TickError::CoordinatorUnreachable(err.into()))?
            .is_some();

        let candidate = self
            .safepoint
            .compute(cancel)
            .await
            .map_err(tick_error_from_safepoint)?;

        let outcome = self
            .scan
            .run(candidate.req_ts, candidate.safe_ts, cancel)
            .await?;

        let publishable = outcome.safe_ts.prev();

        if disabled {
            return Ok((TickOutcome::SkippedDisabled(publishable), outcome.stats));
        }

        self.coordinator
            .update_gc_safe_point(candidate.req_ts, publishable)
            .await
            .map_err(|err| TickError::CoordinatorUnreachable(err.into()))?;

        Ok((TickOutcome::Published(publishable), outcome.stats))
    }
}

fn tick_error_from_safepoint(err: crate::safepoint::SafePointError) -> TickError {
    use crate::safepoint::SafePointError;
    match err {
        SafePointError::Tso(e) => TickError::Internal(e.into()),
        SafePointError::Coordinator(e) => TickError::CoordinatorUnreachable(e.into()),
        SafePointError::Peer(e) => TickError::PeerUnreachable(e.into()),
    }
}

/// Single-flight latch: guarantees at most one tick runs at a time even if
/// a tick overruns its period (spec.md §4.2 "Re-entrancy"). Released on
/// drop so a panicking tick can't wedge the scheduler permanently.
struct TickGuard(Arc<AtomicBool>);

impl TickGuard {
    fn try_acquire(flag: &Arc<AtomicBool>) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .ok()
            .map(|_| TickGuard(flag.clone()))
    }
}

impl Drop for TickGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Runs ticks on a fixed period, skipping a tick outright (rather than
/// queueing it) if the previous one is still in flight.
pub async fn run_periodic<T, C, F, D>(
    driver: Arc<Driver<T, C, F, D>>,
    tick_period: Duration,
    initial_delay: Duration,
    cancel: CancellationToken,
) where
    T: TsoClient + 'static,
    C: CoordinatorClient + 'static,
    F: RegionClientFactory + 'static,
    D: PeerDirectory + 'static,
{
    let in_flight = Arc::new(AtomicBool::new(false));

    tokio::select! {
        _ = cancel.cancelled() => return,
        _ = tokio::time::sleep(initial_delay) => {}
    }

    let mut interval = tokio::time::interval(tick_period);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => return,
            _ = interval.tick() => {}
        }

        let Some(guard) = TickGuard::try_acquire(&in_flight) else {
            tracing::warn!("previous tick still running, skipping this period");
            continue;
        };

        let driver = driver.clone();
        let tick_cancel = cancel.clone();
        tokio::spawn(async move {
            let _guard = guard;
            let _ = driver.run_tick(&tick_cancel).await;
        });
    }
}

/// The outer lease loop: acquire the cluster-wide lease, run the periodic
/// scheduler with a cancellation token tied to lease loss, and repeat once
/// the lease is lost (or exit once `shutdown` fires).
pub async fn run<B, T, C, F, D>(
    lease_backend: Arc<B>,
    holder_id: String,
    lease_ttl: Duration,
    lease_poll_interval: Duration,
    driver: Arc<Driver<T, C, F, D>>,
    tick_period: Duration,
    initial_delay: Duration,
    shutdown: CancellationToken,
) where
    B: LeaseBackend,
    T: TsoClient + 'static,
    C: CoordinatorClient + 'static,
    F: RegionClientFactory + 'static,
    D: PeerDirectory + 'static,
{
    while !shutdown.is_cancelled() {
        let lease: Lease = tokio::select! {
            _ = shutdown.cancelled() => return,
            lease = crate::lease::acquire(
                lease_backend.clone(),
                holder_id.clone(),
                lease_ttl,
                lease_poll_interval,
            ) => lease,
        };

        let tick_cancel = CancellationToken::new();
        let lost = lease.lost_token();
        let periodic = tokio::spawn(run_periodic(
            driver.clone(),
            tick_period,
            initial_delay,
            tick_cancel.clone(),
        ));

        tokio::select! {
            _ = shutdown.cancelled() => {
                tick_cancel.cancel();
                let _ = periodic.await;
                return;
            }
            _ = lost.cancelled() => {
                tracing::warn!("lease lost, cancelling in-flight tick and re-acquiring");
                tick_cancel.cancel();
                let _ = periodic.await;
            }
        }
    }
}
