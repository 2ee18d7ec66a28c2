use serde::{Deserialize, Serialize};

/// Cluster-unique shard identifier.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RegionId(pub u64);

impl std::fmt::Display for RegionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Tags which storage/index service backs a region, per spec.md §3 and §4.5.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum RegionType {
    Data,
    Index,
}

/// Half-open byte-string key range `[start, end)`. An empty `end` means
/// "no upper bound" (the last region in the keyspace).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyRange {
    pub start: Vec<u8>,
    pub end: Vec<u8>,
}

impl KeyRange {
    pub fn new(start: impl Into<Vec<u8>>, end: impl Into<Vec<u8>>) -> Self {
        KeyRange {
            start: start.into(),
            end: end.into(),
        }
    }

    /// True when this range lives under the table-keyspace prefix `'t'`
    /// (spec.md §3 Region / §4.6 pagination loop guard, P4).
    pub fn is_table_keyspace(&self) -> bool {
        self.start.first() == Some(&b't')
    }

    /// Half-open containment check: `start <= key < end`, with an empty
    /// `end` meaning unbounded above. Used to resolve a primary lock's key
    /// to the region that owns it (spec.md §4.6 step 1).
    pub fn contains(&self, key: &[u8]) -> bool {
        key >= self.start.as_slice() && (self.end.is_empty() || key < self.end.as_slice())
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Region {
    pub id: RegionId,
    pub kind: RegionType,
    pub range: KeyRange,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_keyspace_filter() {
        assert!(KeyRange::new(b"t".to_vec(), b"t\xff".to_vec()).is_table_keyspace());
        assert!(!KeyRange::new(b"m".to_vec(), b"m\xff".to_vec()).is_table_keyspace());
        assert!(!KeyRange::new(Vec::new(), Vec::new()).is_table_keyspace());
    }

    #[test]
    fn contains_is_half_open() {
        let range = KeyRange::new(b"t1".to_vec(), b"t2".to_vec());
        assert!(range.contains(b"t1"));
        assert!(range.contains(b"t1zzz"));
        assert!(!range.contains(b"t2"));
        assert!(!range.contains(b"t0"));
    }

    #[test]
    fn contains_with_unbounded_end() {
        let range = KeyRange::new(b"t2".to_vec(), Vec::new());
        assert!(range.contains(b"t2"));
        assert!(range.contains(b"zzzz"));
        assert!(!range.contains(b"t1"));
    }
}
