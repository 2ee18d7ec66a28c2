//! Production HTTP wiring for the four external collaborator interfaces
//! (TSO, coordinator, region service, peer). The wire protocol itself is
//! out of scope (spec.md §1 Non-goals), so this is deliberately thin: one
//! `reqwest::Client`, JSON bodies, status-based error classification.
//! Grounded directly on `storage_controller/src/peer_client.rs`'s
//! `PeerClient` (a `Uri` plus a shared `reqwest::Client`, `error_from_body`
//! turning a non-2xx response into a typed error).
//!
//! The coordinator doubles as the directory for region and peer endpoints
//! (`GET {base}/regions`, `GET {base}/peers`): spec.md leaves endpoint
//! discovery for those services unspecified, and routing every lookup
//! through the already-configured coordinator avoids inventing a second
//! discovery mechanism (DESIGN.md Open Question).

use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use gc_safepoint_api::{ActionResult, LockInfo, Region, RegionId, RegionType, TableLock, Timestamp, TxnStatus};
use reqwest::StatusCode;
use serde::{de::DeserializeOwned, Serialize};

use crate::coordinator::{CoordinatorClient, CoordinatorError};
use crate::lease::{LeaseBackend, LeaseError};
use crate::peer::{PeerClient, PeerDirectory, PeerEndpoint, PeerError};
use crate::region::{
    CheckTxnStatusRequest, RegionClient, RegionClientFactory, RegionError, ScanLockRequest,
    ScanLockResponse,
};
use crate::tso::{TsoClient, TsoError};
use crate::util::TtlCache;
use std::sync::Mutex;

#[derive(Debug, thiserror::Error)]
pub enum HttpClientError {
    #[error("request to {0} failed: {1}")]
    Send(String, #[source] reqwest::Error),
    #[error("{0} responded with {1}")]
    Status(String, StatusCode),
    #[error("failed to decode response from {0}: {1}")]
    Decode(String, #[source] reqwest::Error),
}

async fn post_json<Req: Serialize, Resp: DeserializeOwned>(
    client: &reqwest::Client,
    url: &str,
    timeout: Duration,
    body: &Req,
) -> Result<Resp, HttpClientError> {
    let response = client
        .post(url)
        .timeout(timeout)
        .json(body)
        .send()
        .await
        .map_err(|err| HttpClientError::Send(url.to_string(), err))?;

    if !response.status().is_success() {
        return Err(HttpClientError::Status(url.to_string(), response.status()));
    }

    response
        .json()
        .await
        .map_err(|err| HttpClientError::Decode(url.to_string(), err))
}

async fn get_json<Resp: DeserializeOwned>(
    client: &reqwest::Client,
    url: &str,
    timeout: Duration,
) -> Result<Resp, HttpClientError> {
    let response = client
        .get(url)
        .timeout(timeout)
        .send()
        .await
        .map_err(|err| HttpClientError::Send(url.to_string(), err))?;

    if !response.status().is_success() {
        return Err(HttpClientError::Status(url.to_string(), response.status()));
    }

    response
        .json()
        .await
        .map_err(|err| HttpClientError::Decode(url.to_string(), err))
}

/// Round-robins over the configured coordinator endpoints so a single
/// unreachable peer in the coordinator's own replica set doesn't wedge the
/// driver (spec.md §6 lists the coordinator as a replicated service).
pub struct CoordinatorEndpoints {
    bases: Vec<String>,
    next: AtomicUsize,
}

impl CoordinatorEndpoints {
    pub fn new(bases: Vec<String>) -> Self {
        CoordinatorEndpoints {
            bases,
            next: AtomicUsize::new(0),
        }
    }

    fn pick(&self) -> &str {
        let i = self.next.fetch_add(1, Ordering::Relaxed) % self.bases.len();
        &self.bases[i]
    }
}

pub struct HttpCoordinatorClient {
    client: reqwest::Client,
    endpoints: CoordinatorEndpoints,
    timeout: Duration,
    region_map_cache: Mutex<TtlCache<(), Vec<Region>>>,
}

impl HttpCoordinatorClient {
    pub fn new(
        client: reqwest::Client,
        bases: Vec<String>,
        timeout: Duration,
        region_map_ttl: Duration,
    ) -> Self {
        HttpCoordinatorClient {
            client,
            endpoints: CoordinatorEndpoints::new(bases),
            timeout,
            region_map_cache: Mutex::new(TtlCache::new(region_map_ttl)),
        }
    }
}

#[async_trait]
impl CoordinatorClient for HttpCoordinatorClient {
    async fn kv_get(&self, key: &str) -> Result<Option<Vec<u8>>, CoordinatorError> {
        let url = format!("{}/kv/{key}", self.endpoints.pick());
        get_json(&self.client, &url, self.timeout)
            .await
            .map_err(|err| CoordinatorError::Request(err.into()))
    }

    async fn get_region_map(&self, req_ts: Timestamp) -> Result<Vec<Region>, CoordinatorError> {
        if let Some(cached) = self.region_map_cache.lock().unwrap().get(&()) {
            return Ok(cached);
        }
        let url = format!("{}/regions?req_ts={}", self.endpoints.pick(), req_ts.raw());
        let regions: Vec<Region> = get_json(&self.client, &url, self.timeout)
            .await
            .map_err(|err| CoordinatorError::Request(err.into()))?;
        self.region_map_cache
            .lock()
            .unwrap()
            .insert((), regions.clone());
        Ok(regions)
    }

    async fn update_gc_safe_point(
        &self,
        req_ts: Timestamp,
        safe_point: Timestamp,
    ) -> Result<(), CoordinatorError> {
        #[derive(Serialize)]
        struct Body {
            req_ts: u64,
            safe_point: u64,
        }
        let url = format!("{}/gc-safe-point", self.endpoints.pick());
        post_json::<_, serde::de::IgnoredAny>(
            &self.client,
            &url,
            self.timeout,
            &Body {
                req_ts: req_ts.raw(),
                safe_point: safe_point.raw(),
            },
        )
        .await
        .map(|_| ())
        .map_err(|err| CoordinatorError::Request(err.into()))
    }
}

pub struct HttpTsoClient {
    client: reqwest::Client,
    base: String,
    timeout: Duration,
}

impl HttpTsoClient {
    pub fn new(client: reqwest::Client, base: String, timeout: Duration) -> Self {
        HttpTsoClient {
            client,
            base,
            timeout,
        }
    }
}

#[async_trait]
impl TsoClient for HttpTsoClient {
    async fn now(&self) -> Result<Timestamp, TsoError> {
        #[derive(serde::Deserialize)]
        struct Resp {
            ts: u64,
        }
        let url = format!("{}/tso/now", self.base);
        let resp: Resp = get_json(&self.client, &url, self.timeout)
            .await
            .map_err(anyhow::Error::from)?;
        Ok(Timestamp::new(resp.ts))
    }

    async fn timestamp_for_wall_ms(&self, wall_ms: i64) -> Result<Timestamp, TsoError> {
        #[derive(serde::Deserialize)]
        struct Resp {
            ts: u64,
        }
        let url = format!("{}/tso/from-wall-ms?wall_ms={wall_ms}", self.base);
        let resp: Resp = get_json(&self.client, &url, self.timeout)
            .await
            .map_err(anyhow::Error::from)?;
        Ok(Timestamp::new(resp.ts))
    }

    async fn wall_ms_for_timestamp(&self, ts: Timestamp) -> Result<i64, TsoError> {
        #[derive(serde::Deserialize)]
        struct Resp {
            wall_ms: i64,
        }
        let url = format!("{}/tso/wall-ms?ts={}", self.base, ts.raw());
        let resp: Resp = get_json(&self.client, &url, self.timeout)
            .await
            .map_err(anyhow::Error::from)?;
        Ok(resp.wall_ms)
    }
}

pub struct HttpRegionClient {
    client: reqwest::Client,
    base: String,
    timeout: Duration,
    id: RegionId,
    kind: RegionType,
}

/// URL path segment for a region's RPCs, tagged by `RegionType` (spec.md
/// §4.5: "dispatches store/index RPCs to the correct shard service per
/// region id and region type"). DATA and INDEX regions are distinct shard
/// services behind the same coordinator-discovered base address.
fn region_path_segment(kind: RegionType) -> &'static str {
    match kind {
        RegionType::Data => "region",
        RegionType::Index => "index-region",
    }
}

fn region_url(base: &str, kind: RegionType, id: RegionId, suffix: &str) -> String {
    format!("{base}/{}/{id}/{suffix}", region_path_segment(kind))
}

#[async_trait]
impl RegionClient for HttpRegionClient {
    async fn scan_lock(&self, req: ScanLockRequest) -> Result<ScanLockResponse, RegionError> {
        #[derive(Serialize)]
        struct Body {
            start_key: Vec<u8>,
            end_key: Vec<u8>,
            max_ts: u64,
            limit: u32,
        }
        #[derive(serde::Deserialize)]
        struct Resp {
            locks: Vec<LockInfo>,
            has_more: bool,
            end_key: Vec<u8>,
        }
        let url = region_url(&self.base, self.kind, self.id, "scan-lock");
        let resp: Resp = post_json(
            &self.client,
            &url,
            self.timeout,
            &Body {
                start_key: req.start_key,
                end_key: req.end_key,
                max_ts: req.max_ts.raw(),
                limit: req.limit,
            },
        )
        .await
        .map_err(|err| RegionError::Request(self.id, err.into()))?;
        Ok(ScanLockResponse {
            locks: resp.locks,
            has_more: resp.has_more,
            end_key: resp.end_key,
        })
    }

    async fn check_txn_status(
        &self,
        req: CheckTxnStatusRequest,
    ) -> Result<TxnStatus, RegionError> {
        #[derive(Serialize)]
        struct Body {
            caller_start_ts: u64,
            current_ts: u64,
            lock_ts: u64,
            primary_key: Vec<u8>,
        }
        let url = region_url(&self.base, self.kind, self.id, "check-txn-status");
        post_json(
            &self.client,
            &url,
            self.timeout,
            &Body {
                caller_start_ts: req.caller_start_ts.raw(),
                current_ts: req.current_ts.raw(),
                lock_ts: req.lock_ts.raw(),
                primary_key: req.primary_key,
            },
        )
        .await
        .map_err(|err| RegionError::Request(self.id, err.into()))
    }

    async fn pessimistic_rollback(
        &self,
        start_ts: Timestamp,
        for_update_ts: Timestamp,
        keys: &[Vec<u8>],
    ) -> Result<ActionResult, RegionError> {
        #[derive(Serialize)]
        struct Body<'a> {
            start_ts: u64,
            for_update_ts: u64,
            keys: &'a [Vec<u8>],
        }
        let url = region_url(&self.base, self.kind, self.id, "pessimistic-rollback");
        post_json(
            &self.client,
            &url,
            self.timeout,
            &Body {
                start_ts: start_ts.raw(),
                for_update_ts: for_update_ts.raw(),
                keys,
            },
        )
        .await
        .map_err(|err| RegionError::Request(self.id, err.into()))
    }

    async fn resolve_lock(
        &self,
        start_ts: Timestamp,
        commit_ts: Timestamp,
        keys: &[Vec<u8>],
    ) -> Result<ActionResult, RegionError> {
        #[derive(Serialize)]
        struct Body<'a> {
            start_ts: u64,
            commit_ts: u64,
            keys: &'a [Vec<u8>],
        }
        let url = region_url(&self.base, self.kind, self.id, "resolve-lock");
        post_json(
            &self.client,
            &url,
            self.timeout,
            &Body {
                start_ts: start_ts.raw(),
                commit_ts: commit_ts.raw(),
                keys,
            },
        )
        .await
        .map_err(|err| RegionError::Request(self.id, err.into()))
    }
}

pub struct HttpRegionClientFactory {
    client: reqwest::Client,
    coordinator_base: String,
    timeout: Duration,
}

impl HttpRegionClientFactory {
    pub fn new(client: reqwest::Client, coordinator_base: String, timeout: Duration) -> Self {
        HttpRegionClientFactory {
            client,
            coordinator_base,
            timeout,
        }
    }

    fn build(&self, id: RegionId, kind: RegionType) -> HttpRegionClient {
        HttpRegionClient {
            client: self.client.clone(),
            base: self.coordinator_base.clone(),
            timeout: self.timeout,
            id,
            kind,
        }
    }
}

#[async_trait]
impl RegionClientFactory for HttpRegionClientFactory {
    async fn make_client(
        &self,
        id: RegionId,
        kind: RegionType,
    ) -> Result<std::sync::Arc<dyn RegionClient>, RegionError> {
        Ok(std::sync::Arc::new(self.build(id, kind)))
    }
}


pub struct HttpPeerClient {
    client: reqwest::Client,
    base: String,
    timeout: Duration,
}

#[async_trait]
impl PeerClient for HttpPeerClient {
    async fn table_locks(&self) -> Result<Vec<TableLock>, PeerError> {
        let url = format!("{}/table-locks", self.base);
        get_json(&self.client, &url, self.timeout)
            .await
            .map_err(|err| PeerError::Request(PeerEndpoint(self.base.clone()), err.into()))
    }
}

pub struct HttpPeerDirectory {
    client: reqwest::Client,
    coordinator_base: String,
    timeout: Duration,
}

impl HttpPeerDirectory {
    pub fn new(client: reqwest::Client, coordinator_base: String, timeout: Duration) -> Self {
        HttpPeerDirectory {
            client,
            coordinator_base,
            timeout,
        }
    }
}

#[async_trait]
impl PeerDirectory for HttpPeerDirectory {
    async fn all_peers(&self) -> Result<Vec<PeerEndpoint>, PeerError> {
        let url = format!("{}/peers", self.coordinator_base);
        let peers: Vec<String> = get_json(&self.client, &url, self.timeout)
            .await
            .map_err(|err| {
                PeerError::Request(PeerEndpoint(self.coordinator_base.clone()), err.into())
            })?;
        Ok(peers.into_iter().map(PeerEndpoint).collect())
    }

    fn client_for(&self, endpoint: &PeerEndpoint) -> std::sync::Arc<dyn PeerClient> {
        std::sync::Arc::new(HttpPeerClient {
            client: self.client.clone(),
            base: endpoint.0.clone(),
            timeout: self.timeout,
        })
    }
}

pub struct HttpLeaseBackend {
    client: reqwest::Client,
    coordinator_base: String,
    lease_name: String,
    timeout: Duration,
}

impl HttpLeaseBackend {
    pub fn new(
        client: reqwest::Client,
        coordinator_base: String,
        lease_name: String,
        timeout: Duration,
    ) -> Self {
        HttpLeaseBackend {
            client,
            coordinator_base,
            lease_name,
            timeout,
        }
    }
}

#[async_trait]
impl LeaseBackend for HttpLeaseBackend {
    async fn try_acquire_or_renew(&self, holder_id: &str, ttl: Duration) -> Result<bool, LeaseError> {
        #[derive(Serialize)]
        struct Body<'a> {
            lease_name: &'a str,
            holder_id: &'a str,
            ttl_ms: u64,
        }
        #[derive(serde::Deserialize)]
        struct Resp {
            held: bool,
        }
        let url = format!("{}/lease/try-acquire", self.coordinator_base);
        let resp: Resp = post_json(
            &self.client,
            &url,
            self.timeout,
            &Body {
                lease_name: &self.lease_name,
                holder_id,
                ttl_ms: ttl.as_millis() as u64,
            },
        )
        .await
        .map_err(|err| LeaseError::Backend(err.into()))?;
        Ok(resp.held)
    }

    async fn release(&self, holder_id: &str) -> Result<(), LeaseError> {
        #[derive(Serialize)]
        struct Body<'a> {
            lease_name: &'a str,
            holder_id: &'a str,
        }
        let url = format!("{}/lease/release", self.coordinator_base);
        post_json::<_, serde::de::IgnoredAny>(
            &self.client,
            &url,
            self.timeout,
            &Body {
                lease_name: &self.lease_name,
                holder_id,
            },
        )
        .await
        .map(|_| ())
        .map_err(|err| LeaseError::Backend(err.into()))
    }
}
