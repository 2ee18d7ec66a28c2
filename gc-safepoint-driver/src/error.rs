//! Error taxonomy, spec.md §7.
//!
//! Per-lock errors (`ProbeIndeterminate`, `ResolveFailed`) never reach this
//! type: they're absorbed into the monotone downgrade of `safeTs` inside
//! `scan.rs` and only show up here as log fields, not as a propagated
//! error. `TickError` is what can actually abort a tick.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum TickError {
    #[error("lease lost mid-tick")]
    LeaseLost,

    #[error("peer unreachable: {0}")]
    PeerUnreachable(#[source] anyhow::Error),

    #[error("coordinator unreachable: {0}")]
    CoordinatorUnreachable(#[source] anyhow::Error),

    #[error("internal error: {0}")]
    Internal(#[source] anyhow::Error),
}

impl TickError {
    /// Short, stable tag for metrics/log fields — deliberately not
    /// `Display`, which carries the full error chain.
    pub fn kind(&self) -> &'static str {
        match self {
            TickError::LeaseLost => "lease_lost",
            TickError::PeerUnreachable(_) => "peer_unreachable",
            TickError::CoordinatorUnreachable(_) => "coordinator_unreachable",
            TickError::Internal(_) => "internal",
        }
    }
}
