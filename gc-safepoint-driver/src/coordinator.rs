//! Coordinator client, spec.md §4 row 2 / §6 "Coordinator kv". Grounded on
//! `storage_controller/src/peer_client.rs`'s request/error shape (a thin
//! typed wrapper with a `thiserror` enum carrying the failed RPC's status).

use async_trait::async_trait;
use gc_safepoint_api::{Region, Timestamp};
use std::collections::BTreeMap;
use std::sync::Mutex;
use std::time::Duration;

use crate::util::TtlCache;

#[derive(Debug, thiserror::Error)]
pub enum CoordinatorError {
    #[error("coordinator request failed: {0}")]
    Request(#[source] anyhow::Error),
    #[error("coordinator returned malformed control key {key:?}: {reason}")]
    MalformedControlKey { key: String, reason: String },
}

#[async_trait]
pub trait CoordinatorClient: Send + Sync {
    /// `range(key=...)` — raw bytes if present.
    async fn kv_get(&self, key: &str) -> Result<Option<Vec<u8>>, CoordinatorError>;

    /// `getRegionMap(reqTs)`.
    async fn get_region_map(&self, req_ts: Timestamp) -> Result<Vec<Region>, CoordinatorError>;

    /// `updateGCSafePoint(reqTs, safePoint)`.
    async fn update_gc_safe_point(
        &self,
        req_ts: Timestamp,
        safe_point: Timestamp,
    ) -> Result<(), CoordinatorError>;
}

/// In-memory fake coordinator for tests: a region list plus a control-key
/// kv store, and a log of published safe points so assertions can check
/// P3 (no spurious advance) and the scenario expectations in spec.md §8.
/// Caches `get_region_map` behind the same `TtlCache` the production client
/// uses, so tests exercise the real caching behavior rather than a fake
/// that happens to always be fresh.
pub struct FakeCoordinator {
    pub regions: Vec<Region>,
    pub control_keys: Mutex<BTreeMap<String, Vec<u8>>>,
    pub published: Mutex<Vec<(Timestamp, Timestamp)>>,
    pub fail_region_map: bool,
    pub fail_update: bool,
    region_map_cache: Mutex<TtlCache<(), Vec<Region>>>,
}

impl Default for FakeCoordinator {
    fn default() -> Self {
        FakeCoordinator {
            regions: Vec::new(),
            control_keys: Mutex::new(BTreeMap::new()),
            published: Mutex::new(Vec::new()),
            fail_region_map: false,
            fail_update: false,
            region_map_cache: Mutex::new(TtlCache::new(Duration::from_secs(30))),
        }
    }
}

impl FakeCoordinator {
    pub fn new(regions: Vec<Region>) -> Self {
        FakeCoordinator {
            regions,
            ..Default::default()
        }
    }

    pub fn set_control_key(&self, key: &str, value: impl Into<Vec<u8>>) {
        self.control_keys
            .lock()
            .unwrap()
            .insert(key.to_string(), value.into());
    }

    pub fn published_safe_points(&self) -> Vec<Timestamp> {
        self.published
            .lock()
            .unwrap()
            .iter()
            .map(|(_, sp)| *sp)
            .collect()
    }
}

#[async_trait]
impl CoordinatorClient for FakeCoordinator {
    async fn kv_get(&self, key: &str) -> Result<Option<Vec<u8>>, CoordinatorError> {
        Ok(self.control_keys.lock().unwrap().get(key).cloned())
    }

    async fn get_region_map(&self, _req_ts: Timestamp) -> Result<Vec<Region>, CoordinatorError> {
        if let Some(cached) = self.region_map_cache.lock().unwrap().get(&()) {
            return Ok(cached);
        }
        if self.fail_region_map {
            return Err(CoordinatorError::Request(anyhow::anyhow!(
                "region map unavailable (fake failure)"
            )));
        }
        self.region_map_cache
            .lock()
            .unwrap()
            .insert((), self.regions.clone());
        Ok(self.regions.clone())
    }

    async fn update_gc_safe_point(
        &self,
        req_ts: Timestamp,
        safe_point: Timestamp,
    ) -> Result<(), CoordinatorError> {
        if self.fail_update {
            return Err(CoordinatorError::Request(anyhow::anyhow!(
                "update rejected (fake failure)"
            )));
        }
        self.published.lock().unwrap().push((req_ts, safe_point));
        Ok(())
    }
}
