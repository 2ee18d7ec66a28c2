//! Entry point. Grounded on `safekeeper.rs`'s `main()`: clap parse, init
//! logging before anything else can log, then a `tokio::select!` between
//! the driver's main loop and the shutdown signals.

use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use gc_safepoint_driver::config::{Args, DriverConfig};
use gc_safepoint_driver::http::{
    HttpCoordinatorClient, HttpLeaseBackend, HttpPeerDirectory, HttpRegionClientFactory,
    HttpTsoClient,
};
use gc_safepoint_driver::peer::PeerLockAggregator;
use gc_safepoint_driver::region::RegionServiceRouter;
use gc_safepoint_driver::safepoint::SafePointComputer;
use gc_safepoint_driver::scan::ScanEngine;
use gc_safepoint_driver::scheduler::{self, Driver};
use gc_safepoint_driver::{logging, peer};
use tokio::signal::unix::{signal, SignalKind};
use tokio_util::sync::CancellationToken;

const LEASE_POLL_INTERVAL: Duration = Duration::from_secs(2);

#[tokio::main(flavor = "multi_thread")]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let config = DriverConfig::from(args);

    logging::init(config.log_format);

    if let Some(addr) = &config.metrics_listen_addr {
        let addr: std::net::SocketAddr = addr.parse()?;
        metrics_exporter_prometheus::PrometheusBuilder::new()
            .with_http_listener(addr)
            .install()?;
        tracing::info!(%addr, "metrics exporter listening");
    }

    let http = reqwest::Client::builder().timeout(config.rpc_timeout).build()?;

    let coordinator = Arc::new(HttpCoordinatorClient::new(
        http.clone(),
        config.coordinators.clone(),
        config.rpc_timeout,
        config.region_client_ttl,
    ));
    let tso = Arc::new(HttpTsoClient::new(
        http.clone(),
        config.coordinators[0].clone(),
        config.rpc_timeout,
    ));
    let region_factory =
        HttpRegionClientFactory::new(http.clone(), config.coordinators[0].clone(), config.rpc_timeout);
    let router = Arc::new(RegionServiceRouter::new(region_factory, config.region_client_ttl));

    let peer_directory = HttpPeerDirectory::new(
        http.clone(),
        config.coordinators[0].clone(),
        config.rpc_timeout,
    );
    let peer_aggregator = PeerLockAggregator::new(
        peer_directory,
        peer::PeerEndpoint(config.local_location.clone()),
    );

    let safepoint = SafePointComputer::new(tso, coordinator.clone(), peer_aggregator);
    let scan = ScanEngine::new(router, coordinator.clone(), config.scan_limit);
    let driver = Arc::new(Driver::new(coordinator, safepoint, scan));

    let lease_backend = Arc::new(HttpLeaseBackend::new(
        http,
        config.coordinators[0].clone(),
        config.lease_name.clone(),
        config.rpc_timeout,
    ));
    let holder_id = format!("{}-{:08x}", config.local_location, rand::random::<u32>());

    let shutdown = CancellationToken::new();

    let mut sigint = signal(SignalKind::interrupt())?;
    let mut sigterm = signal(SignalKind::terminate())?;

    let run_handle = tokio::spawn(scheduler::run(
        lease_backend,
        holder_id,
        config.tick_period.max(Duration::from_secs(10)),
        LEASE_POLL_INTERVAL,
        driver,
        config.tick_period,
        config.initial_delay,
        shutdown.clone(),
    ));

    tokio::select! {
        _ = sigint.recv() => tracing::info!("received SIGINT, shutting down"),
        _ = sigterm.recv() => tracing::info!("received SIGTERM, shutting down"),
        res = run_handle => {
            if let Err(err) = res {
                tracing::error!(?err, "driver task panicked");
            }
            return Ok(());
        }
    }

    shutdown.cancel();
    Ok(())
}
