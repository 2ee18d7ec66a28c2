//! Pure lock/status classification per spec.md §3 "Classification". Kept
//! free of I/O so the scan-and-resolve engine's dispatch decision can be
//! unit-tested without fake RPC clients.

use crate::lock::{LockInfo, LockType};
use crate::txn_status::{TxnAction, TxnStatus};

/// `lockType == Lock ∧ forUpdateTs ≠ 0 ∧ action ∈
/// {LockNotExistRollback, TTLExpirePessimisticRollback, TTLExpireRollback}`.
pub fn is_pessimistic_rollback_eligible(lock: &LockInfo, status: &TxnStatus) -> bool {
    lock.lock_type == LockType::Lock
        && lock.is_pessimistic()
        && matches!(
            status.action,
            TxnAction::LockNotExistRollback
                | TxnAction::TtlExpirePessimisticRollback
                | TxnAction::TtlExpireRollback
        )
}

/// `commitTs > 0` (commit path) or `lockTtl == 0 ∧ commitTs == 0` (expired
/// optimistic lock → rollback path).
pub fn is_resolve_eligible(status: &TxnStatus) -> bool {
    status.is_committed() || status.is_expired_uncommitted()
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Disposition {
    PessimisticRollback,
    Resolve,
    Leave,
}

/// Classifies a lock+probe pair into the dispatch branch spec.md §4.6 takes,
/// *given that the probe itself was determinate* (callers must check
/// `status.is_indeterminate()` first — that branch isn't a `Disposition`
/// because it short-circuits before classification).
pub fn classify(lock: &LockInfo, status: &TxnStatus) -> Disposition {
    if is_pessimistic_rollback_eligible(lock, status) {
        Disposition::PessimisticRollback
    } else if is_resolve_eligible(status) {
        Disposition::Resolve
    } else {
        Disposition::Leave
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ts::Timestamp;

    fn lock(lock_type: LockType, for_update_ts: u64) -> LockInfo {
        LockInfo {
            key: b"k".to_vec(),
            primary_lock: b"k".to_vec(),
            lock_ts: Timestamp::new(500),
            for_update_ts: Timestamp::new(for_update_ts),
            lock_type,
            lock_ttl_ms: 1000,
        }
    }

    fn status(commit_ts: u64, lock_ttl_ms: u64, action: TxnAction) -> TxnStatus {
        TxnStatus {
            commit_ts: Timestamp::new(commit_ts),
            lock_ttl_ms,
            action,
            txn_result: None,
        }
    }

    /// spec.md §8 scenario 4: optimistic committed lock resolves via commit.
    #[test]
    fn committed_optimistic_lock_is_resolve_eligible() {
        let l = lock(LockType::Put, 0);
        let s = status(600, 0, TxnAction::NoAction);
        assert_eq!(classify(&l, &s), Disposition::Resolve);
    }

    /// spec.md §8 scenario 5: expired pessimistic lock rolls back.
    #[test]
    fn expired_pessimistic_lock_is_pessimistic_rollback_eligible() {
        let l = lock(LockType::Lock, 750);
        let s = status(0, 0, TxnAction::TtlExpirePessimisticRollback);
        assert_eq!(classify(&l, &s), Disposition::PessimisticRollback);
    }

    /// spec.md §8 scenario 6: undecided lock is left alone.
    #[test]
    fn live_lock_with_no_action_is_left() {
        let l = lock(LockType::Put, 0);
        let s = status(0, 3000, TxnAction::NoAction);
        assert_eq!(classify(&l, &s), Disposition::Leave);
    }

    #[test]
    fn expired_optimistic_lock_without_commit_resolves_as_rollback() {
        let l = lock(LockType::Put, 0);
        let s = status(0, 0, TxnAction::NoAction);
        assert_eq!(classify(&l, &s), Disposition::Resolve);
    }

    #[test]
    fn pessimistic_lock_without_matching_action_is_left() {
        // forUpdateTs != 0 but action doesn't match the rollback-eligible set.
        let l = lock(LockType::Lock, 750);
        let s = status(0, 3000, TxnAction::NoAction);
        assert_eq!(classify(&l, &s), Disposition::Leave);
    }

    #[test]
    fn optimistic_lock_type_never_pessimistic_rollback_eligible() {
        let l = lock(LockType::Put, 750); // malformed input: for_update_ts set but type != Lock
        let s = status(0, 0, TxnAction::TtlExpirePessimisticRollback);
        assert!(!is_pessimistic_rollback_eligible(&l, &s));
    }
}
