//! TSO client, spec.md §4 row 1 / §6. Out of scope to implement the actual
//! timestamp oracle wire protocol (§1 Non-goals list it as an external
//! collaborator); this module is the typed interface the rest of the
//! driver programs against, plus a deterministic fake used by tests.

use async_trait::async_trait;
use gc_safepoint_api::Timestamp;

#[derive(Debug, thiserror::Error)]
#[error("tso client error: {0}")]
pub struct TsoError(#[from] pub anyhow::Error);

#[async_trait]
pub trait TsoClient: Send + Sync {
    /// A fresh cluster timestamp.
    async fn now(&self) -> Result<Timestamp, TsoError>;

    /// The timestamp corresponding to a given wall-clock instant,
    /// expressed as milliseconds since the Unix epoch.
    async fn timestamp_for_wall_ms(&self, wall_ms: i64) -> Result<Timestamp, TsoError>;

    /// The wall-clock instant (ms since the Unix epoch) a timestamp encodes.
    async fn wall_ms_for_timestamp(&self, ts: Timestamp) -> Result<i64, TsoError>;
}

/// Linear-encoding fake TSO: timestamp == milliseconds since epoch. Good
/// enough for tests that only care about ordering and retention-window
/// arithmetic, not the real physical/logical packing.
pub struct LinearFakeTso {
    current_ms: std::sync::atomic::AtomicI64,
}

impl LinearFakeTso {
    pub fn new(start_ms: i64) -> Self {
        LinearFakeTso {
            current_ms: std::sync::atomic::AtomicI64::new(start_ms),
        }
    }

    pub fn set(&self, ms: i64) {
        self.current_ms.store(ms, std::sync::atomic::Ordering::SeqCst);
    }
}

#[async_trait]
impl TsoClient for LinearFakeTso {
    async fn now(&self) -> Result<Timestamp, TsoError> {
        let ms = self.current_ms.load(std::sync::atomic::Ordering::SeqCst);
        Ok(Timestamp::new(ms as u64))
    }

    async fn timestamp_for_wall_ms(&self, wall_ms: i64) -> Result<Timestamp, TsoError> {
        Ok(Timestamp::new(wall_ms.max(0) as u64))
    }

    async fn wall_ms_for_timestamp(&self, ts: Timestamp) -> Result<i64, TsoError> {
        Ok(ts.raw() as i64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn linear_fake_round_trips() {
        let tso = LinearFakeTso::new(1_000_000);
        let now = tso.now().await.unwrap();
        assert_eq!(now.raw(), 1_000_000);
        let wall = tso.wall_ms_for_timestamp(now).await.unwrap();
        let back = tso.timestamp_for_wall_ms(wall).await.unwrap();
        assert_eq!(now, back);
    }
}
