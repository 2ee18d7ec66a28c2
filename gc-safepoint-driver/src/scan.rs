//! Scan-and-resolve engine, spec.md §4.6. The core per-region pagination
//! loop: page through `txnScanLock`, probe each lock's transaction status,
//! classify it, and dispatch to pessimistic rollback / resolve / leave.
//! Any lock this driver cannot conclusively retire (indeterminate probe,
//! failed rollback/resolve, or a lock left alone) downgrades the candidate
//! safe point to that lock's own start timestamp — the monotone downgrade
//! invariant P1. The final `-1` publish-time conservatism is applied once,
//! after the whole scan, by the scheduler.

use std::sync::Arc;

use gc_safepoint_api::{classify, Disposition, Region, Timestamp};
use tokio_util::sync::CancellationToken;

use crate::coordinator::CoordinatorClient;
use crate::error::TickError;
use crate::region::{
    CheckTxnStatusRequest, RegionClientFactory, RegionError, RegionServiceRouter, ScanLockRequest,
};

#[derive(Debug, Default, Clone, Copy)]
pub struct ScanStats {
    pub locks_scanned: u64,
    pub locks_resolved: u64,
    pub locks_left: u64,
}

pub struct ScanOutcome {
    pub safe_ts: Timestamp,
    pub stats: ScanStats,
}

pub struct ScanEngine<F: RegionClientFactory, C: CoordinatorClient> {
    router: Arc<RegionServiceRouter<F>>,
    coordinator: Arc<C>,
    scan_limit: u32,
}

trait CancelExt {
    fn bail_if_cancelled(&self) -> Result<(), TickError>;
}

impl CancelExt for CancellationToken {
    fn bail_if_cancelled(&self) -> Result<(), TickError> {
        if self.is_cancelled() {
            Err(TickError::LeaseLost)
        } else {
            Ok(())
        }
    }
}

impl<F: RegionClientFactory, C: CoordinatorClient> ScanEngine<F, C> {
    pub fn new(router: Arc<RegionServiceRouter<F>>, coordinator: Arc<C>, scan_limit: u32) -> Self {
        ScanEngine {
            router,
            coordinator,
            scan_limit,
        }
    }

    /// Walks every table-keyspace region (P4: non-table regions are never
    /// scanned) and returns the downgraded candidate safe point plus
    /// per-tick counters for the metrics surface (SPEC_FULL.md A.4).
    pub async fn run(
        &self,
        req_ts: Timestamp,
        mut safe_ts: Timestamp,
        cancel: &CancellationToken,
    ) -> Result<ScanOutcome, TickError> {
        let regions: Vec<Region> = self
            .coordinator
            .get_region_map(req_ts)
            .await
            .map_err(|err| TickError::CoordinatorUnreachable(err.into()))?
            .into_iter()
            .filter(|r| r.range.is_table_keyspace())
            .collect();

        let mut stats = ScanStats::default();

        for region in &regions {
            cancel.bail_if_cancelled()?;
            self.scan_region(region, &regions, req_ts, &mut safe_ts, &mut stats, cancel)
                .await?;
        }

        Ok(ScanOutcome { safe_ts, stats })
    }

    /// Finds the region owning `key` among the already-fetched table-keyspace
    /// regions, per spec.md §4.6 step 1: `checkTxn` is addressed to the
    /// store shard owning `lock.primaryLock`, which may be a different
    /// region from the one the lock was scanned on.
    fn find_region_for_key<'a>(regions: &'a [Region], key: &[u8]) -> Option<&'a Region> {
        regions.iter().find(|r| r.range.contains(key))
    }

    async fn scan_region(
        &self,
        region: &Region,
        all_regions: &[Region],
        req_ts: Timestamp,
        safe_ts: &mut Timestamp,
        stats: &mut ScanStats,
        cancel: &CancellationToken,
    ) -> Result<(), TickError> {
        let client = self
            .router
            .client_for(region.id, region.kind)
            .await
            .map_err(|err| TickError::Internal(err.into()))?;

        let mut start_key = region.range.start.clone();
        loop {
            cancel.bail_if_cancelled()?;

            let page = client
                .scan_lock(ScanLockRequest {
                    start_key: start_key.clone(),
                    end_key: region.range.end.clone(),
                    max_ts: req_ts,
                    limit: self.scan_limit,
                })
                .await
                .map_err(|err| TickError::Internal(err.into()))?;

            for lock in &page.locks {
                stats.locks_scanned += 1;
                cancel.bail_if_cancelled()?;

                let primary_region = match Self::find_region_for_key(all_regions, &lock.primary_lock) {
                    Some(primary_region) => primary_region,
                    None => {
                        tracing::warn!(
                            key = ?lock.key,
                            primary_key = ?lock.primary_lock,
                            "no region owns this lock's primary key, capping safe point"
                        );
                        *safe_ts = (*safe_ts).min(lock.lock_ts);
                        stats.locks_left += 1;
                        continue;
                    }
                };
                let primary_client = if primary_region.id == region.id {
                    client.clone()
                } else {
                    match self
                        .router
                        .client_for(primary_region.id, primary_region.kind)
                        .await
                    {
                        Ok(primary_client) => primary_client,
                        Err(err) => {
                            tracing::warn!(?err, key = ?lock.key, "probe indeterminate, capping safe point");
                            *safe_ts = (*safe_ts).min(lock.lock_ts);
                            stats.locks_left += 1;
                            continue;
                        }
                    }
                };

                let status = match primary_client
                    .check_txn_status(CheckTxnStatusRequest {
                        caller_start_ts: req_ts,
                        current_ts: req_ts,
                        lock_ts: lock.lock_ts,
                        primary_key: lock.primary_lock.clone(),
                    })
                    .await
                {
                    Ok(status) => status,
                    Err(RegionError::Request(_, err)) => {
                        tracing::warn!(?err, key = ?lock.key, "probe indeterminate, capping safe point");
                        *safe_ts = (*safe_ts).min(lock.lock_ts);
                        stats.locks_left += 1;
                        continue;
                    }
                };

                if status.is_indeterminate() {
                    tracing::warn!(
                        key = ?lock.key,
                        reason = ?status.txn_result,
                        "probe indeterminate, capping safe point"
                    );
                    *safe_ts = (*safe_ts).min(lock.lock_ts);
                    stats.locks_left += 1;
                    continue;
                }

                match classify(lock, &status) {
                    Disposition::PessimisticRollback => {
                        let result = client
                            .pessimistic_rollback(
                                lock.lock_ts,
                                lock.for_update_ts,
                                std::slice::from_ref(&lock.key),
                            )
                            .await
                            .map_err(|err| TickError::Internal(err.into()))?;
                        if result.is_success() {
                            stats.locks_resolved += 1;
                        } else {
                            tracing::warn!(
                                key = ?lock.key,
                                reason = ?result.txn_result,
                                "pessimistic rollback failed, capping safe point"
                            );
                            *safe_ts = (*safe_ts).min(lock.lock_ts);
                            stats.locks_left += 1;
                        }
                    }
                    Disposition::Resolve => {
                        let result = client
                            .resolve_lock(
                                lock.lock_ts,
                                status.commit_ts,
                                std::slice::from_ref(&lock.key),
                            )
                            .await
                            .map_err(|err| TickError::Internal(err.into()))?;
                        if result.is_success() {
                            stats.locks_resolved += 1;
                        } else {
                            tracing::warn!(
                                key = ?lock.key,
                                reason = ?result.txn_result,
                                "resolve failed, capping safe point"
                            );
                            *safe_ts = (*safe_ts).min(lock.lock_ts);
                            stats.locks_left += 1;
                        }
                    }
                    Disposition::Leave => {
                        *safe_ts = (*safe_ts).min(lock.lock_ts);
                        stats.locks_left += 1;
                    }
                }
            }

            if !page.has_more {
                break;
            }
            start_key = page.end_key;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coordinator::FakeCoordinator;
    use crate::region::{FakeRegionClientFactory, FakeRegionState, FakeRegionStore};
    use gc_safepoint_api::{
        ActionResult, KeyRange, LockInfo, LockType, RegionId, RegionType, TxnAction, TxnStatus,
    };

    fn region(id: u64) -> Region {
        Region {
            id: RegionId(id),
            kind: RegionType::Data,
            range: KeyRange::new(b"t".to_vec(), b"t\xff".to_vec()),
        }
    }

    fn lock(key: &[u8], ts: u64, for_update_ts: u64, lock_type: LockType) -> LockInfo {
        LockInfo {
            key: key.to_vec(),
            primary_lock: key.to_vec(),
            lock_ts: Timestamp::new(ts),
            for_update_ts: Timestamp::new(for_update_ts),
            lock_type,
            lock_ttl_ms: 1000,
        }
    }

    fn engine(
        store: Arc<FakeRegionStore>,
        coordinator: Arc<FakeCoordinator>,
    ) -> ScanEngine<FakeRegionClientFactory, FakeCoordinator> {
        let factory = FakeRegionClientFactory::new(store, 1024);
        let router = Arc::new(RegionServiceRouter::new(factory, std::time::Duration::from_secs(30)));
        ScanEngine::new(router, coordinator, 1024)
    }

    /// spec.md §8 scenario 1: no locks anywhere leaves the candidate intact.
    #[tokio::test]
    async fn clean_cluster_leaves_candidate_untouched() {
        let store = Arc::new(FakeRegionStore::new());
        store.set_region(RegionId(1), FakeRegionState::default());
        let coordinator = Arc::new(FakeCoordinator::new(vec![region(1)]));
        let eng = engine(store, coordinator);

        let cancel = CancellationToken::new();
        let outcome = eng
            .run(Timestamp::new(1000), Timestamp::new(900), &cancel)
            .await
            .unwrap();
        assert_eq!(outcome.safe_ts, Timestamp::new(900));
        assert_eq!(outcome.stats.locks_scanned, 0);
    }

    /// spec.md §8 scenario 3: a non-table region is never scanned.
    #[tokio::test]
    async fn non_table_region_is_skipped() {
        let store = Arc::new(FakeRegionStore::new());
        store.set_region(
            RegionId(2),
            FakeRegionState {
                locks: vec![lock(b"m1", 1, 0, LockType::Put)],
                ..Default::default()
            },
        );
        let meta_region = Region {
            id: RegionId(2),
            kind: RegionType::Data,
            range: KeyRange::new(b"m".to_vec(), b"m\xff".to_vec()),
        };
        let coordinator = Arc::new(FakeCoordinator::new(vec![meta_region]));
        let eng = engine(store, coordinator);

        let cancel = CancellationToken::new();
        let outcome = eng
            .run(Timestamp::new(1000), Timestamp::new(900), &cancel)
            .await
            .unwrap();
        assert_eq!(outcome.stats.locks_scanned, 0);
        assert_eq!(outcome.safe_ts, Timestamp::new(900));
    }

    /// spec.md §8 scenario 4: optimistic committed lock resolves and does
    /// not cap the safe point.
    #[tokio::test]
    async fn committed_optimistic_lock_resolves() {
        let store = Arc::new(FakeRegionStore::new());
        let l = lock(b"t1", 100, 0, LockType::Put);
        let mut primary_statuses = std::collections::HashMap::new();
        primary_statuses.insert(
            l.primary_lock.clone(),
            TxnStatus {
                commit_ts: Timestamp::new(110),
                lock_ttl_ms: 0,
                action: TxnAction::NoAction,
                txn_result: None,
            },
        );
        store.set_region(
            RegionId(1),
            FakeRegionState {
                locks: vec![l],
                primary_statuses,
                resolve_results: Default::default(),
                ..Default::default()
            },
        );
        let coordinator = Arc::new(FakeCoordinator::new(vec![region(1)]));
        let eng = engine(store, coordinator);

        let cancel = CancellationToken::new();
        let outcome = eng
            .run(Timestamp::new(1000), Timestamp::new(900), &cancel)
            .await
            .unwrap();
        assert_eq!(outcome.stats.locks_resolved, 1);
        assert_eq!(outcome.stats.locks_left, 0);
        assert_eq!(outcome.safe_ts, Timestamp::new(900));
    }

    /// spec.md §8 scenario 5: expired pessimistic lock rolls back.
    #[tokio::test]
    async fn expired_pessimistic_lock_rolls_back() {
        let store = Arc::new(FakeRegionStore::new());
        let l = lock(b"t2", 100, 150, LockType::Lock);
        let mut primary_statuses = std::collections::HashMap::new();
        primary_statuses.insert(
            l.primary_lock.clone(),
            TxnStatus {
                commit_ts: Timestamp::UNSET,
                lock_ttl_ms: 0,
                action: TxnAction::TtlExpirePessimisticRollback,
                txn_result: None,
            },
        );
        let mut rollback_results = std::collections::HashMap::new();
        rollback_results.insert(l.key.clone(), ActionResult::ok());
        store.set_region(
            RegionId(1),
            FakeRegionState {
                locks: vec![l],
                primary_statuses,
                rollback_results,
                ..Default::default()
            },
        );
        let coordinator = Arc::new(FakeCoordinator::new(vec![region(1)]));
        let eng = engine(store, coordinator);

        let cancel = CancellationToken::new();
        let outcome = eng
            .run(Timestamp::new(1000), Timestamp::new(900), &cancel)
            .await
            .unwrap();
        assert_eq!(outcome.stats.locks_resolved, 1);
        assert_eq!(outcome.safe_ts, Timestamp::new(900));
    }

    /// spec.md §8 scenario 6: an undecided live lock caps the safe point
    /// to just below its start timestamp.
    #[tokio::test]
    async fn undecided_lock_caps_safe_point() {
        let store = Arc::new(FakeRegionStore::new());
        let l = lock(b"t3", 500, 0, LockType::Put);
        let mut primary_statuses = std::collections::HashMap::new();
        primary_statuses.insert(
            l.primary_lock.clone(),
            TxnStatus {
                commit_ts: Timestamp::UNSET,
                lock_ttl_ms: 5000,
                action: TxnAction::NoAction,
                txn_result: None,
            },
        );
        store.set_region(
            RegionId(1),
            FakeRegionState {
                locks: vec![l],
                primary_statuses,
                ..Default::default()
            },
        );
        let coordinator = Arc::new(FakeCoordinator::new(vec![region(1)]));
        let eng = engine(store, coordinator);

        let cancel = CancellationToken::new();
        let outcome = eng
            .run(Timestamp::new(1000), Timestamp::new(900), &cancel)
            .await
            .unwrap();
        assert_eq!(outcome.stats.locks_left, 1);
        assert_eq!(outcome.safe_ts, Timestamp::new(500));
    }

    /// spec.md §4.6 step 1: the lock's primary key can live in a different
    /// region from the one it was scanned on. `check_txn_status` must be
    /// addressed to the primary's owning region, not the scanned one.
    #[tokio::test]
    async fn check_txn_status_routes_to_primary_key_region() {
        let store = Arc::new(FakeRegionStore::new());
        let l = LockInfo {
            key: b"t1-row".to_vec(),
            primary_lock: b"t9-row".to_vec(),
            lock_ts: Timestamp::new(100),
            for_update_ts: Timestamp::new(0),
            lock_type: LockType::Put,
            lock_ttl_ms: 1000,
        };
        store.set_region(
            RegionId(1),
            FakeRegionState {
                locks: vec![l.clone()],
                ..Default::default()
            },
        );
        let mut primary_statuses = std::collections::HashMap::new();
        primary_statuses.insert(
            l.primary_lock.clone(),
            TxnStatus {
                commit_ts: Timestamp::new(110),
                lock_ttl_ms: 0,
                action: TxnAction::NoAction,
                txn_result: None,
            },
        );
        store.set_region(
            RegionId(9),
            FakeRegionState {
                primary_statuses,
                ..Default::default()
            },
        );

        let scanned_region = Region {
            id: RegionId(1),
            kind: RegionType::Data,
            range: KeyRange::new(b"t1".to_vec(), b"t2".to_vec()),
        };
        let primary_region = Region {
            id: RegionId(9),
            kind: RegionType::Data,
            range: KeyRange::new(b"t9".to_vec(), b"t9\xff".to_vec()),
        };
        let coordinator = Arc::new(FakeCoordinator::new(vec![scanned_region, primary_region]));
        let eng = engine(store, coordinator);

        let cancel = CancellationToken::new();
        let outcome = eng
            .run(Timestamp::new(1000), Timestamp::new(900), &cancel)
            .await
            .unwrap();
        // Region 9 has no rollback/resolve fixtures; the fake falls back to
        // `ActionResult::ok()`, so the lock resolves instead of capping the
        // safe point — this only happens if the probe reached region 9's
        // fixture, not region 1's (which has none configured at all for
        // this primary key and would have errored the probe).
        assert_eq!(outcome.stats.locks_resolved, 1);
        assert_eq!(outcome.safe_ts, Timestamp::new(900));
    }
}
