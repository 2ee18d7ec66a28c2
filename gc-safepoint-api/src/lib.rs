//! Shared wire-level types for the GC safe-point driver: the data model of
//! spec.md §3, plus the pure lock/status classification logic of §3
//! "Classification". Kept dependency-free (beyond `serde`/`thiserror`) so it
//! can be shared between the driver binary and its external collaborators'
//! typed interfaces without pulling in an async runtime.

pub mod classify;
pub mod control_keys;
pub mod lock;
pub mod region;
pub mod table_lock;
pub mod ts;
pub mod txn_status;

pub use classify::{classify, is_pessimistic_rollback_eligible, is_resolve_eligible, Disposition};
pub use lock::{LockInfo, LockType};
pub use region::{KeyRange, Region, RegionId, RegionType};
pub use table_lock::{TableLock, TableLockType};
pub use ts::Timestamp;
pub use txn_status::{ActionResult, TxnAction, TxnResultError, TxnStatus};
