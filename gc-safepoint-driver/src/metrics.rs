//! Tick metrics, SPEC_FULL.md A.4. Thin wrappers over the `metrics` crate
//! facade so call sites read like the quantity they're recording rather
//! than a string literal; grounded on `safekeeper.rs`'s use of the same
//! facade for WAL-service counters.

use gc_safepoint_api::Timestamp;

use crate::error::TickError;
use crate::scan::ScanStats;

pub fn record_tick_start() {
    metrics::counter!("gc_safepoint_driver_tick_total", "result" => "started").increment(1);
}

/// Records the scan outcome's lock counters and the computed safe point,
/// regardless of whether it ends up published or skipped.
pub fn record_scan_stats(safe_ts: Timestamp, stats: &ScanStats) {
    metrics::gauge!("gc_safepoint_driver_last_safepoint").set(safe_ts.raw() as f64);
    metrics::counter!("gc_safepoint_driver_locks_scanned_total").increment(stats.locks_scanned);
    metrics::counter!("gc_safepoint_driver_locks_resolved_total").increment(stats.locks_resolved);
    metrics::counter!("gc_safepoint_driver_locks_left_total").increment(stats.locks_left);
}

pub fn record_tick_result(result: &'static str, duration: std::time::Duration) {
    metrics::counter!("gc_safepoint_driver_tick_total", "result" => result).increment(1);
    metrics::histogram!("gc_safepoint_driver_tick_duration_seconds").record(duration.as_secs_f64());
}

pub fn record_tick_failure(err: &TickError, duration: std::time::Duration) {
    record_tick_result(err.kind(), duration);
}
