//! Region service router, spec.md §4.5 / §6 "Region store/index service".
//! Dispatches by `RegionType` to the right shard client and caches clients
//! with a short TTL, refreshing on demand (region-not-found/split handling
//! is left to the underlying client per spec.md §4.5's "treated as
//! external").

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use gc_safepoint_api::{ActionResult, LockInfo, RegionId, RegionType, Timestamp, TxnStatus};

use crate::util::TtlCache;

#[derive(Debug, thiserror::Error)]
pub enum RegionError {
    #[error("region {0} service request failed: {1}")]
    Request(RegionId, #[source] anyhow::Error),
}

pub struct ScanLockRequest {
    pub start_key: Vec<u8>,
    pub end_key: Vec<u8>,
    pub max_ts: Timestamp,
    pub limit: u32,
}

pub struct ScanLockResponse {
    pub locks: Vec<LockInfo>,
    pub has_more: bool,
    pub end_key: Vec<u8>,
}

pub struct CheckTxnStatusRequest {
    pub caller_start_ts: Timestamp,
    pub current_ts: Timestamp,
    pub lock_ts: Timestamp,
    pub primary_key: Vec<u8>,
}

/// Shared capability set exposed by both DATA and INDEX region services
/// (spec.md §9 Design Notes: "modeled as a tagged variant with a shared
/// capability set ... dispatched at the router boundary").
#[async_trait]
pub trait RegionClient: Send + Sync {
    async fn scan_lock(&self, req: ScanLockRequest) -> Result<ScanLockResponse, RegionError>;

    async fn check_txn_status(
        &self,
        req: CheckTxnStatusRequest,
    ) -> Result<TxnStatus, RegionError>;

    async fn pessimistic_rollback(
        &self,
        start_ts: Timestamp,
        for_update_ts: Timestamp,
        keys: &[Vec<u8>],
    ) -> Result<ActionResult, RegionError>;

    async fn resolve_lock(
        &self,
        start_ts: Timestamp,
        commit_ts: Timestamp,
        keys: &[Vec<u8>],
    ) -> Result<ActionResult, RegionError>;
}

/// Builds a `RegionClient` for a given region, keyed by id and type. The
/// router never constructs clients itself; it only caches what the factory
/// hands back, matching spec.md §4.5's description of the router as a
/// dispatch/cache layer, not a connection-pool implementation.
#[async_trait]
pub trait RegionClientFactory: Send + Sync {
    async fn make_client(
        &self,
        id: RegionId,
        kind: RegionType,
    ) -> Result<Arc<dyn RegionClient>, RegionError>;
}

pub struct RegionServiceRouter<F: RegionClientFactory> {
    factory: F,
    cache: Mutex<TtlCache<RegionId, Arc<dyn RegionClient>>>,
}

impl<F: RegionClientFactory> RegionServiceRouter<F> {
    pub fn new(factory: F, client_ttl: Duration) -> Self {
        RegionServiceRouter {
            factory,
            cache: Mutex::new(TtlCache::new(client_ttl)),
        }
    }

    pub async fn client_for(
        &self,
        id: RegionId,
        kind: RegionType,
    ) -> Result<Arc<dyn RegionClient>, RegionError> {
        if let Some(cached) = self.cache.lock().unwrap().get(&id) {
            return Ok(cached);
        }
        let client = self.factory.make_client(id, kind).await?;
        self.cache.lock().unwrap().insert(id, client.clone());
        Ok(client)
    }

    /// Drop a cached client, e.g. after a region-not-found/split response
    /// from a call made through it.
    pub fn invalidate(&self, id: RegionId) {
        self.cache.lock().unwrap().invalidate(&id);
    }
}

/// In-memory fake region client keyed by region id, used by tests. Locks
/// are served back in fixed-size pages to exercise the pagination loop
/// (spec.md §4.6 / P5).
pub struct FakeRegionStore {
    pub regions: Mutex<HashMap<RegionId, FakeRegionState>>,
}

#[derive(Clone, Default)]
pub struct FakeRegionState {
    pub locks: Vec<LockInfo>,
    pub primary_statuses: HashMap<Vec<u8>, TxnStatus>,
    pub rollback_results: HashMap<Vec<u8>, ActionResult>,
    pub resolve_results: HashMap<Vec<u8>, ActionResult>,
}

impl FakeRegionStore {
    pub fn new() -> Self {
        FakeRegionStore {
            regions: Mutex::new(HashMap::new()),
        }
    }

    pub fn set_region(&self, id: RegionId, state: FakeRegionState) {
        self.regions.lock().unwrap().insert(id, state);
    }
}

pub struct FakeRegionClient {
    pub id: RegionId,
    pub store: Arc<FakeRegionStore>,
    pub page_size: usize,
}

#[async_trait]
impl RegionClient for FakeRegionClient {
    async fn scan_lock(&self, req: ScanLockRequest) -> Result<ScanLockResponse, RegionError> {
        let regions = self.store.regions.lock().unwrap();
        let state = regions.get(&self.id).cloned().unwrap_or_default();
        drop(regions);

        let mut candidates: Vec<LockInfo> = state
            .locks
            .into_iter()
            .filter(|l| l.key >= req.start_key && (req.end_key.is_empty() || l.key < req.end_key))
            .filter(|l| l.lock_ts < req.max_ts)
            .collect();
        candidates.sort_by(|a, b| a.key.cmp(&b.key));

        let limit = (req.limit as usize).min(self.page_size.max(1));
        let has_more = candidates.len() > limit;
        candidates.truncate(limit);
        let end_key = candidates
            .last()
            .map(|l| {
                let mut k = l.key.clone();
                k.push(0);
                k
            })
            .unwrap_or(req.end_key);

        Ok(ScanLockResponse {
            locks: candidates,
            has_more,
            end_key,
        })
    }

    async fn check_txn_status(
        &self,
        req: CheckTxnStatusRequest,
    ) -> Result<TxnStatus, RegionError> {
        let regions = self.store.regions.lock().unwrap();
        let state = regions.get(&self.id).cloned().unwrap_or_default();
        state
            .primary_statuses
            .get(&req.primary_key)
            .cloned()
            .ok_or_else(|| {
                RegionError::Request(
                    self.id,
                    anyhow::anyhow!("no fake status configured for primary key"),
                )
            })
    }

    async fn pessimistic_rollback(
        &self,
        _start_ts: Timestamp,
        _for_update_ts: Timestamp,
        keys: &[Vec<u8>],
    ) -> Result<ActionResult, RegionError> {
        let regions = self.store.regions.lock().unwrap();
        let state = regions.get(&self.id).cloned().unwrap_or_default();
        Ok(keys
            .first()
            .and_then(|k| state.rollback_results.get(k).cloned())
            .unwrap_or_else(ActionResult::ok))
    }

    async fn resolve_lock(
        &self,
        _start_ts: Timestamp,
        _commit_ts: Timestamp,
        keys: &[Vec<u8>],
    ) -> Result<ActionResult, RegionError> {
        let regions = self.store.regions.lock().unwrap();
        let state = regions.get(&self.id).cloned().unwrap_or_default();
        Ok(keys
            .first()
            .and_then(|k| state.resolve_results.get(k).cloned())
            .unwrap_or_else(ActionResult::ok))
    }
}

pub struct FakeRegionClientFactory {
    pub store: Arc<FakeRegionStore>,
    pub page_size: usize,
    pub build_count: std::sync::atomic::AtomicUsize,
}

impl FakeRegionClientFactory {
    pub fn new(store: Arc<FakeRegionStore>, page_size: usize) -> Self {
        FakeRegionClientFactory {
            store,
            page_size,
            build_count: std::sync::atomic::AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl RegionClientFactory for FakeRegionClientFactory {
    async fn make_client(
        &self,
        id: RegionId,
        _kind: RegionType,
    ) -> Result<Arc<dyn RegionClient>, RegionError> {
        self.build_count
            .fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        Ok(Arc::new(FakeRegionClient {
            id,
            store: self.store.clone(),
            page_size: self.page_size,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn router_caches_clients_within_ttl() {
        let store = Arc::new(FakeRegionStore::new());
        let factory = FakeRegionClientFactory::new(store, 1024);
        let router = RegionServiceRouter::new(factory, Duration::from_secs(30));

        router.client_for(RegionId(1), RegionType::Data).await.unwrap();
        router.client_for(RegionId(1), RegionType::Data).await.unwrap();
        assert_eq!(
            router
                .factory
                .build_count
                .load(std::sync::atomic::Ordering::SeqCst),
            1
        );
    }

    #[tokio::test]
    async fn invalidate_forces_rebuild() {
        let store = Arc::new(FakeRegionStore::new());
        let factory = FakeRegionClientFactory::new(store, 1024);
        let router = RegionServiceRouter::new(factory, Duration::from_secs(30));

        router.client_for(RegionId(1), RegionType::Data).await.unwrap();
        router.invalidate(RegionId(1));
        router.client_for(RegionId(1), RegionType::Data).await.unwrap();
        assert_eq!(
            router
                .factory
                .build_count
                .load(std::sync::atomic::Ordering::SeqCst),
            2
        );
    }
}
