//! Daemon assembly: inventory, refresh loops, metrics, and the HTTP API.
//!
//! In this mode, the daemon:
//! 1. Loads the inventory file
//! 2. Reconciles the monitored services against it, then keeps doing so
//! 3. Feeds check results into metrics and runs the pilot light
//! 4. Serves the API until Ctrl-C, then stops every background task

use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use healthgrid_api::{ApiState, build_router};
use healthgrid_health::{AggregationEngine, ServiceRegistry};
use healthgrid_inventory::{FileInventory, HttpProber};
use healthgrid_metrics::{PilotLight, ResultFeeder};
use healthgrid_state::Inventory;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::config::DaemonConfig;

pub async fn run(config: DaemonConfig, inventory_path: &Path) -> anyhow::Result<()> {
    info!("healthgrid daemon starting");

    // ── Initialize subsystems ──────────────────────────────────

    let prober = HttpProber::new(config.probe.timeout);
    let inventory = Arc::new(FileInventory::load(inventory_path, prober).await?);

    let registry = Arc::new(ServiceRegistry::new(
        inventory.clone(),
        config.engine_config(),
    ));
    let engine = Arc::new(AggregationEngine::new(inventory.clone(), registry.clone()));
    info!(refresh = ?config.engine.refresh_interval, "health engine initialized");

    let feeder = Arc::new(ResultFeeder::new(
        registry.clone(),
        config.metrics.feed_interval,
    ));
    let pilot = Arc::new(PilotLight::new(config.metrics.pilot_light_interval));

    // ── Shutdown signal ────────────────────────────────────────

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    // ── Start background tasks ─────────────────────────────────

    let reconcile_handle = tokio::spawn(reconcile_loop(
        inventory.clone(),
        registry.clone(),
        config.engine.reconcile_interval,
        shutdown_rx.clone(),
    ));

    let feeder_handle = {
        let feeder = feeder.clone();
        let shutdown = shutdown_rx.clone();
        tokio::spawn(async move { feeder.run(shutdown).await })
    };

    let pilot_handle = {
        let pilot = pilot.clone();
        let shutdown = shutdown_rx.clone();
        tokio::spawn(async move { pilot.run(shutdown).await })
    };

    // ── Start API server ───────────────────────────────────────

    let router = build_router(ApiState {
        engine,
        feeder,
        pilot,
    });
    let addr = SocketAddr::from(([0, 0, 0, 0], config.server.port));
    info!(%addr, "API server starting");

    let listener = tokio::net::TcpListener::bind(addr).await?;

    // Graceful shutdown on Ctrl-C.
    axum::serve(listener, router)
        .with_graceful_shutdown(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!(error = %e, "cannot listen for Ctrl-C, shutting down");
            }
            info!("shutdown signal received");
            let _ = shutdown_tx.send(true);
        })
        .await?;

    // Wait for background tasks.
    let _ = reconcile_handle.await;
    let _ = feeder_handle.await;
    let _ = pilot_handle.await;
    registry.stop_all().await;

    info!("healthgrid daemon stopped");
    Ok(())
}

/// Reload the inventory and reconcile immediately, then every `interval`.
///
/// A failed reload keeps the previous inventory; reconciliation still runs.
pub async fn reconcile_loop(
    inventory: Arc<FileInventory>,
    registry: Arc<ServiceRegistry>,
    interval: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                if let Err(e) = inventory.reload().await {
                    warn!(error = %e, "inventory reload failed, keeping previous");
                }
                let services = inventory.list_services_by_name(&[]).await;
                let report = registry.reconcile(services).await;
                if report.is_noop() {
                    debug!(unchanged = report.unchanged, "reconcile: no changes");
                } else {
                    info!(
                        started = report.started.len(),
                        replaced = report.replaced.len(),
                        unchanged = report.unchanged,
                        "reconciled monitored services"
                    );
                }
            }
            _ = shutdown.changed() => {
                info!("reconcile loop shutting down");
                break;
            }
        }
    }
}
