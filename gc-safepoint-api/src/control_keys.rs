//! Names and decoding for the coordinator's control-key store (spec.md §3
//! "Control-key store").

use thiserror::Error;

pub const TXN_DURATION_KEY: &str = "txn-duration";
pub const SAFE_POINT_UPDATE_DISABLE_KEY: &str = "safe-point-update-disable";

pub const DEFAULT_TXN_DURATION_MS: u64 = 7 * 24 * 60 * 60 * 1000;

#[derive(Debug, Error, PartialEq, Eq)]
#[error("txn-duration control key must decode as an 8-byte big-endian i64, got {0} bytes")]
pub struct TxnDurationDecodeError(pub usize);

/// Decodes the `txn-duration` control key: a big-endian i64 count of
/// milliseconds. Negative values are rejected since a negative retention
/// window is nonsensical and would invert the safe-point computation.
pub fn decode_txn_duration_ms(raw: &[u8]) -> Result<u64, TxnDurationDecodeError> {
    if raw.len() != 8 {
        return Err(TxnDurationDecodeError(raw.len()));
    }
    let mut buf = [0u8; 8];
    buf.copy_from_slice(raw);
    let decoded = i64::from_be_bytes(buf);
    Ok(decoded.max(0) as u64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_big_endian_ms() {
        let raw = 90_000i64.to_be_bytes();
        assert_eq!(decode_txn_duration_ms(&raw).unwrap(), 90_000);
    }

    #[test]
    fn rejects_wrong_length() {
        assert!(decode_txn_duration_ms(&[1, 2, 3]).is_err());
    }

    #[test]
    fn clamps_negative_to_zero() {
        let raw = (-5i64).to_be_bytes();
        assert_eq!(decode_txn_duration_ms(&raw).unwrap(), 0);
    }
}
