use crate::ts::Timestamp;
use serde::{Deserialize, Serialize};

/// Outcome classification returned by a `txnCheckTxnStatus` probe, per
/// spec.md §3. `Other` covers actions the driver treats uniformly as
/// "no special handling" (e.g. `MinCommitTsPushed` in the original
/// TiKV/TiDB vocabulary) without needing a variant per upstream action.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum TxnAction {
    NoAction,
    LockNotExistRollback,
    TtlExpireRollback,
    TtlExpirePessimisticRollback,
    Other,
}

/// Carries the reason a status probe (or a rollback/resolve RPC) could not
/// produce an authoritative result. Its presence, not its content, drives
/// the "probe indeterminate" branch in spec.md §4.6 step 2.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxnResultError(pub String);

impl std::fmt::Display for TxnResultError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxnStatus {
    /// Zero if not committed.
    pub commit_ts: Timestamp,
    pub lock_ttl_ms: u64,
    pub action: TxnAction,
    /// Non-null means the probe itself failed to reach an authoritative
    /// answer; see spec.md §3 "Classification".
    pub txn_result: Option<TxnResultError>,
}

impl TxnStatus {
    pub fn is_indeterminate(&self) -> bool {
        self.txn_result.is_some()
    }

    pub fn is_committed(&self) -> bool {
        !self.commit_ts.is_unset()
    }

    /// Expired optimistic lock with no commit record: rollback path of
    /// "resolve-eligible" in spec.md §3.
    pub fn is_expired_uncommitted(&self) -> bool {
        self.lock_ttl_ms == 0 && self.commit_ts.is_unset()
    }
}

/// Outcome of issuing `txnPessimisticRollback` or `txnResolveLock`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionResult {
    pub txn_result: Option<TxnResultError>,
}

impl ActionResult {
    pub fn ok() -> Self {
        ActionResult { txn_result: None }
    }

    pub fn is_success(&self) -> bool {
        self.txn_result.is_none()
    }
}
