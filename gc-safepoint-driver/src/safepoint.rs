//! Safe-point computer, spec.md §4.3. Combines a fresh TSO timestamp, the
//! coordinator's `txn-duration` control key, and the minimum of all live
//! peer row-lock timestamps into a single candidate `safeTs`. The
//! publish-time `prev()` conservatism and the per-lock monotone downgrade
//! both happen downstream in `scan.rs`; this module only produces the
//! starting candidate (spec.md §4.3 steps 1-3, before the scan loop's step
//! 4 can only lower it further).

use std::sync::Arc;

use gc_safepoint_api::{
    control_keys::{decode_txn_duration_ms, DEFAULT_TXN_DURATION_MS, TXN_DURATION_KEY},
    Timestamp,
};
use tokio_util::sync::CancellationToken;

use crate::config::MIN_TXN_DURATION_MS;
use crate::coordinator::{CoordinatorClient, CoordinatorError};
use crate::peer::{PeerDirectory, PeerError, PeerLockAggregator};
use crate::tso::{TsoClient, TsoError};

#[derive(Debug, thiserror::Error)]
pub enum SafePointError {
    #[error(transparent)]
    Tso(#[from] TsoError),
    #[error(transparent)]
    Coordinator(#[from] CoordinatorError),
    #[error(transparent)]
    Peer(#[from] PeerError),
}

#[derive(Debug, Clone, Copy)]
pub struct SafePointCandidate {
    /// The timestamp the whole tick's probes are anchored to
    /// (`callerStartTs`/`currentTs` in every `check_txn_status` call —
    /// DESIGN.md Open Question 2: both are kept equal to this value).
    pub req_ts: Timestamp,
    /// The candidate safe point before the scan loop's per-lock downgrade.
    pub safe_ts: Timestamp,
}

pub struct SafePointComputer<T: TsoClient, C: CoordinatorClient, D: PeerDirectory> {
    tso: Arc<T>,
    coordinator: Arc<C>,
    peers: PeerLockAggregator<D>,
}

impl<T: TsoClient, C: CoordinatorClient, D: PeerDirectory> SafePointComputer<T, C, D> {
    pub fn new(tso: Arc<T>, coordinator: Arc<C>, peers: PeerLockAggregator<D>) -> Self {
        SafePointComputer {
            tso,
            coordinator,
            peers,
        }
    }

    pub async fn compute(
        &self,
        cancel: &CancellationToken,
    ) -> Result<SafePointCandidate, SafePointError> {
        let req_ts = self.tso.now().await?;

        // spec.md §4.3 step 2 has two distinct arithmetic paths: a decoded
        // control key is already a raw count of `req_ts`'s own units, so it
        // subtracts directly; the default window is a wall-clock duration
        // and has to go wall-ms -> subtract -> back through the TSO, since
        // a raw integer subtraction isn't meaningful against an opaque
        // physical/logical encoding.
        let mut safe_ts = match self.coordinator.kv_get(TXN_DURATION_KEY).await? {
            Some(raw) => {
                let txn_duration_ms = match decode_txn_duration_ms(&raw) {
                    Ok(ms) => ms,
                    Err(err) => {
                        return Err(SafePointError::Coordinator(
                            CoordinatorError::MalformedControlKey {
                                key: TXN_DURATION_KEY.to_string(),
                                reason: err.to_string(),
                            },
                        ))
                    }
                };
                let txn_duration_ms = txn_duration_ms.max(MIN_TXN_DURATION_MS);
                req_ts.sub_ms_raw(txn_duration_ms)
            }
            None => {
                let wall_ms = self.tso.wall_ms_for_timestamp(req_ts).await?;
                let target_wall_ms = wall_ms.saturating_sub(DEFAULT_TXN_DURATION_MS as i64);
                self.tso.timestamp_for_wall_ms(target_wall_ms).await?
            }
        };

        let peer_locks = self.peers.row_locks(cancel).await?;
        if let Some(peer_min) = peer_locks.iter().map(|l| l.lock_ts).min() {
            safe_ts = safe_ts.min(peer_min);
            tracing::debug!(peer_min = %peer_min, "peer row lock caps candidate safe point");
        }

        Ok(SafePointCandidate { req_ts, safe_ts })
    }
}
