//! Peer lock aggregator, spec.md §4.4. Grounded directly on
//! `storage_controller/src/peer_client.rs`'s `step_down`: a per-peer HTTP
//! client wrapped in a bounded, cancellation-aware retry, with errors
//! propagated rather than swallowed (§4.4 "Failure policy").

use std::time::Duration;

use async_trait::async_trait;
use gc_safepoint_api::TableLock;
use tokio_util::sync::CancellationToken;

use crate::util::retry_with_backoff;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PeerEndpoint(pub String);

#[derive(Debug, thiserror::Error)]
pub enum PeerError {
    #[error("peer {0:?} table-locks request failed: {1}")]
    Request(PeerEndpoint, #[source] anyhow::Error),
    #[error("aggregation cancelled before all peers responded")]
    Cancelled,
}

#[async_trait]
pub trait PeerClient: Send + Sync {
    async fn table_locks(&self) -> Result<Vec<TableLock>, PeerError>;
}

#[async_trait]
pub trait PeerDirectory: Send + Sync {
    /// All computing peers in the cluster, local node included.
    async fn all_peers(&self) -> Result<Vec<PeerEndpoint>, PeerError>;

    fn client_for(&self, endpoint: &PeerEndpoint) -> std::sync::Arc<dyn PeerClient>;
}

const PEER_RETRY_COUNT: u32 = 2;
const PEER_RETRY_BASE_DELAY: Duration = Duration::from_millis(100);

pub struct PeerLockAggregator<D: PeerDirectory> {
    directory: D,
    local: PeerEndpoint,
}

impl<D: PeerDirectory> PeerLockAggregator<D> {
    pub fn new(directory: D, local: PeerEndpoint) -> Self {
        PeerLockAggregator { directory, local }
    }

    /// Local + every reachable remote peer's ROW table locks. A peer that
    /// is unreachable after retries fails the whole aggregation — per
    /// spec.md §4.4, missing one peer's lock could let GC past its reader,
    /// so partial results are never acceptable here.
    pub async fn row_locks(&self, cancel: &CancellationToken) -> Result<Vec<TableLock>, PeerError> {
        let peers = self.directory.all_peers().await?;
        let mut all = Vec::new();

        for endpoint in peers {
            let is_local = endpoint == self.local;
            let client = self.directory.client_for(&endpoint);

            let outcome = retry_with_backoff(
                || {
                    let client = client.clone();
                    async move { client.table_locks().await }
                },
                PEER_RETRY_BASE_DELAY,
                if is_local { 0 } else { PEER_RETRY_COUNT },
                "fetch peer table locks",
                cancel,
            )
            .await;

            match outcome {
                None => return Err(PeerError::Cancelled),
                Some(Ok(locks)) => all.extend(locks.into_iter().filter(TableLock::is_row)),
                Some(Err(err)) => return Err(err),
            }
        }

        Ok(all)
    }
}
