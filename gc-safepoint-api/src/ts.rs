use serde::{Deserialize, Serialize};
use std::fmt;

/// A 64-bit monotone cluster timestamp produced by the TSO.
///
/// The encoding (physical/logical split) is opaque to everything outside the
/// TSO client; this type only exposes the operations that are safe without
/// knowing that encoding: ordering, a zero/"unset" check, and the two raw
/// arithmetic escape hatches the safe-point computer is explicitly allowed
/// to use (decrement-by-one for publish conservatism, and ms-subtraction
/// when the retention window was already supplied as a raw count of this
/// timestamp's own units).
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Timestamp(u64);

impl Timestamp {
    pub const UNSET: Timestamp = Timestamp(0);

    pub const fn new(raw: u64) -> Self {
        Timestamp(raw)
    }

    pub const fn raw(self) -> u64 {
        self.0
    }

    pub const fn is_unset(self) -> bool {
        self.0 == 0
    }

    /// `safeTs - 1`, the publish-time conservatism from spec.md §4.6.
    /// Saturates at zero instead of wrapping; a zero result means the
    /// candidate was already at or below the minimum representable
    /// timestamp and should not be published (callers treat `UNSET`
    /// specially).
    pub const fn prev(self) -> Timestamp {
        Timestamp(self.0.saturating_sub(1))
    }

    /// Subtracts a raw millisecond count directly from the timestamp's
    /// integer value. Valid only when the caller already knows the
    /// subtrahend is expressed in this timestamp's own linear units (the
    /// decoded `txn-duration` control key case in spec.md §4.3 step 2).
    pub const fn sub_ms_raw(self, ms: u64) -> Timestamp {
        Timestamp(self.0.saturating_sub(ms))
    }

    pub fn min(self, other: Timestamp) -> Timestamp {
        std::cmp::min(self, other)
    }
}

impl fmt::Debug for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Timestamp({})", self.0)
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for Timestamp {
    fn from(raw: u64) -> Self {
        Timestamp(raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prev_saturates_at_zero() {
        assert_eq!(Timestamp::new(0).prev(), Timestamp::new(0));
        assert_eq!(Timestamp::new(5).prev(), Timestamp::new(4));
    }

    #[test]
    fn unset_is_zero() {
        assert!(Timestamp::UNSET.is_unset());
        assert!(!Timestamp::new(1).is_unset());
    }

    #[test]
    fn ordering_is_numeric() {
        assert!(Timestamp::new(10) < Timestamp::new(20));
        assert_eq!(Timestamp::new(10).min(Timestamp::new(20)), Timestamp::new(10));
    }
}
