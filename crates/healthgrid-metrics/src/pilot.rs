//! Pilot light: a heartbeat that proves the exporter is alive even when no
//! service produced a result since the last scrape.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use healthgrid_state::epoch_secs;
use tokio::sync::watch;
use tracing::{info, trace};

pub struct PilotLight {
    interval: Duration,
    heartbeats: AtomicU64,
    last_beat: AtomicU64,
}

impl PilotLight {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            heartbeats: AtomicU64::new(0),
            last_beat: AtomicU64::new(0),
        }
    }

    pub fn beat(&self) {
        let n = self.heartbeats.fetch_add(1, Ordering::Relaxed) + 1;
        self.last_beat.store(epoch_secs(), Ordering::Relaxed);
        trace!(heartbeats = n, "pilot light");
    }

    pub fn heartbeats(&self) -> u64 {
        self.heartbeats.load(Ordering::Relaxed)
    }

    /// Epoch seconds of the last beat, 0 before the first one.
    pub fn last_beat(&self) -> u64 {
        self.last_beat.load(Ordering::Relaxed)
    }

    /// Beat once immediately, then every interval, until shutdown.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        info!(interval_secs = self.interval.as_secs(), "pilot light started");
        let mut ticker = tokio::time::interval(self.interval);
        loop {
            tokio::select! {
                _ = ticker.tick() => self.beat(),
                _ = shutdown.changed() => {
                    info!("pilot light shutting down");
                    break;
                }
            }
        }
    }
}
