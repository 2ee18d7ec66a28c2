//! CLI parsing and the immutable runtime configuration, spec.md §6 and
//! SPEC_FULL.md A.1. Shaped like the teacher's `Args` (clap derive struct)
//! converted once into a long-lived config value (`safekeeper.rs`'s
//! `Args` → `Arc<SafeKeeperConf>`).

use std::time::Duration;

use clap::Parser;

#[derive(Parser, Debug)]
#[command(
    name = "gc-safepoint-driver",
    about = "Advances the cluster-wide GC safe point by resolving expired transaction locks."
)]
pub struct Args {
    /// Coordinator endpoints. Repeat the flag for multiple addresses.
    #[arg(long = "coordinator", required = true, num_args = 1)]
    pub coordinators: Vec<String>,

    /// This node's own endpoint, used to exclude itself from the peer set.
    #[arg(long)]
    pub local_location: String,

    /// Time between scheduled ticks, e.g. "600s" or "10m".
    #[arg(long, value_parser = humantime::parse_duration, default_value = "600s")]
    pub tick_period: Duration,

    /// Delay after lease acquisition before the first tick.
    #[arg(long, value_parser = humantime::parse_duration, default_value = "1s")]
    pub initial_delay: Duration,

    /// Maximum locks returned per `txnScanLock` page.
    #[arg(long, default_value_t = 1024)]
    pub scan_limit: u32,

    /// TTL for cached region-service clients and the cached region map.
    #[arg(long, value_parser = humantime::parse_duration, default_value = "30s")]
    pub region_client_ttl: Duration,

    /// Per-RPC deadline, applied to every outbound call.
    #[arg(long, value_parser = humantime::parse_duration, default_value = "30s")]
    pub rpc_timeout: Duration,

    /// Name of the cluster-wide lease this driver contends for.
    #[arg(long, default_value = "safe-point-update")]
    pub lease_name: String,

    #[arg(long, value_enum, default_value_t = LogFormatArg::Plain)]
    pub log_format: LogFormatArg,

    /// Address to serve Prometheus-format metrics on. Omit to disable the
    /// metrics endpoint entirely.
    #[arg(long)]
    pub metrics_listen_addr: Option<String>,
}

#[derive(Clone, Copy, Debug, clap::ValueEnum, PartialEq, Eq)]
pub enum LogFormatArg {
    Plain,
    Json,
}

/// Floor enforced on a decoded `txn-duration` control key (SPEC_FULL.md
/// supplement 1): protects against an operator-set retention window so
/// small it would let GC run within minutes of `reqTs`.
pub const MIN_TXN_DURATION_MS: u64 = 10 * 60 * 1000;

#[derive(Debug)]
pub struct DriverConfig {
    pub coordinators: Vec<String>,
    pub local_location: String,
    pub tick_period: Duration,
    pub initial_delay: Duration,
    pub scan_limit: u32,
    pub region_client_ttl: Duration,
    pub rpc_timeout: Duration,
    pub lease_name: String,
    pub log_format: LogFormatArg,
    pub metrics_listen_addr: Option<String>,
}

impl From<Args> for DriverConfig {
    fn from(args: Args) -> Self {
        DriverConfig {
            coordinators: args.coordinators,
            local_location: args.local_location,
            tick_period: args.tick_period,
            initial_delay: args.initial_delay,
            scan_limit: args.scan_limit,
            region_client_ttl: args.region_client_ttl,
            rpc_timeout: args.rpc_timeout,
            lease_name: args.lease_name,
            log_format: args.log_format,
            metrics_listen_addr: args.metrics_listen_addr,
        }
    }
}
