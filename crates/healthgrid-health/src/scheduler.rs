//! Per-service refresh loop.
//!
//! Probes immediately on start, then once per refresh interval, publishing
//! each result into the entity's cache and result buffer. Only the shutdown
//! signal stops the loop; probe failures are just failing results.

use std::sync::Arc;
use std::time::Duration;

use healthgrid_state::CheckResult;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, trace};

use crate::checker::ServiceChecker;
use crate::registry::MonitoredEntity;

/// Keeps one entity's cache fresh until told to stop.
pub struct CheckScheduler {
    entity: Arc<MonitoredEntity>,
    checker: ServiceChecker,
    refresh_interval: Duration,
}

impl CheckScheduler {
    pub fn new(
        entity: Arc<MonitoredEntity>,
        checker: ServiceChecker,
        refresh_interval: Duration,
    ) -> Self {
        Self {
            entity,
            checker,
            refresh_interval,
        }
    }

    /// Run the loop on a new task.
    pub fn spawn(self, shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        tokio::spawn(self.run(shutdown))
    }

    /// The refresh loop. The first probe runs with zero delay.
    ///
    /// A shutdown signal (or a dropped sender) ends the loop before the next
    /// probe; a probe already running is allowed to finish and publish.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        let name = self.entity.name();
        debug!(service = %name, interval = ?self.refresh_interval, "check scheduler starting");

        let mut delay = Duration::ZERO;
        loop {
            tokio::select! {
                biased;
                _ = shutdown.changed() => {
                    debug!(service = %name, "check scheduler stopping");
                    break;
                }
                _ = tokio::time::sleep(delay) => {
                    self.tick().await;
                    delay = self.next_interval();
                }
            }
        }
    }

    /// Probe once, stamp the entity's current ack, and publish.
    pub async fn tick(&self) -> CheckResult {
        let service = self.entity.service();
        let mut result = self.checker.check_service(&service).await;
        result.ack = self.entity.ack();
        trace!(service = %result.name, ok = result.ok, severity = %result.severity, "publishing check result");
        self.entity.publish(result.clone());
        result
    }

    /// Delay before the next probe.
    ///
    /// Fixed for now; the hook for deriving it from the shortest refresh
    /// period among the service's categories.
    pub fn next_interval(&self) -> Duration {
        self.refresh_interval
    }
}
