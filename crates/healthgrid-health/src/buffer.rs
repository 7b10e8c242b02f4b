//! Bounded result buffer between a refresh loop and metrics exporters.

use healthgrid_state::CheckResult;
use tokio::sync::{Mutex, mpsc};
use tracing::debug;

/// Results buffered when the capacity isn't configured.
pub const DEFAULT_BUFFER_CAPACITY: usize = 60;

/// Fixed-capacity FIFO of check results.
///
/// Producers never wait: when the buffer is full the newest result is
/// dropped and the exporter sees a gap instead of stalling the probe loop.
#[derive(Debug)]
pub struct ResultBuffer {
    tx: mpsc::Sender<CheckResult>,
    rx: Mutex<mpsc::Receiver<CheckResult>>,
}

impl ResultBuffer {
    pub fn new(capacity: usize) -> Self {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        Self {
            tx,
            rx: Mutex::new(rx),
        }
    }

    /// Enqueue a result. Returns `false` if it was dropped.
    pub fn offer(&self, result: CheckResult) -> bool {
        match self.tx.try_send(result) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(dropped)) => {
                debug!(service = %dropped.name, "result buffer full, dropping result");
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => false,
        }
    }

    /// Take every buffered result, oldest first.
    pub async fn drain(&self) -> Vec<CheckResult> {
        let mut rx = self.rx.lock().await;
        let mut drained = Vec::new();
        while let Ok(result) = rx.try_recv() {
            drained.push(result);
        }
        drained
    }
}

impl Default for ResultBuffer {
    fn default() -> Self {
        Self::new(DEFAULT_BUFFER_CAPACITY)
    }
}
