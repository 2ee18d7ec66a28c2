use crate::ts::Timestamp;
use serde::{Deserialize, Serialize};

/// DDL/row-level lock kind reported by a peer's `tableLocks()` API.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum TableLockType {
    Row,
    Table,
    MetaOnly,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableLock {
    pub lock_type: TableLockType,
    pub lock_ts: Timestamp,
}

impl TableLock {
    pub fn is_row(&self) -> bool {
        matches!(self.lock_type, TableLockType::Row)
    }
}
