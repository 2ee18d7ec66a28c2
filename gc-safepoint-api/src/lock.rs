use crate::ts::Timestamp;
use serde::{Deserialize, Serialize};

/// Percolator lock kind, per spec.md §3. `Other` preserves forward
/// compatibility with lock kinds the store may report that this driver
/// doesn't need to special-case (it is never pessimistic-rollback- or
/// resolve-eligible on its own).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum LockType {
    Lock,
    Put,
    Delete,
    Other,
}

/// A live lock observed on a region by `txnScanLock`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockInfo {
    pub key: Vec<u8>,
    pub primary_lock: Vec<u8>,
    pub lock_ts: Timestamp,
    /// Nonzero iff the lock was taken pessimistically.
    pub for_update_ts: Timestamp,
    pub lock_type: LockType,
    /// Remaining TTL in milliseconds; `0` means expired.
    pub lock_ttl_ms: u64,
}

impl LockInfo {
    pub fn is_pessimistic(&self) -> bool {
        !self.for_update_ts.is_unset()
    }

    pub fn is_expired(&self) -> bool {
        self.lock_ttl_ms == 0
    }
}
