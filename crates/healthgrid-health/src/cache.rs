//! Single-slot "latest result" cache for one monitored service.
//!
//! An atomic optional cell: publishing swaps in a new `Arc<CheckResult>`,
//! reading loads the current one. Neither side blocks or queues, so a slow
//! probe never stalls a health request.

use std::sync::Arc;

use arc_swap::ArcSwapOption;
use healthgrid_state::CheckResult;

/// Holds the most recently published result for one service.
#[derive(Debug, Default)]
pub struct LatestValueCache {
    slot: ArcSwapOption<CheckResult>,
}

impl LatestValueCache {
    pub fn new() -> Self {
        Self {
            slot: ArcSwapOption::empty(),
        }
    }

    /// Replace the latest value.
    pub fn publish(&self, result: CheckResult) {
        self.slot.store(Some(Arc::new(result)));
    }

    /// Rewrite whatever value is current. A publish racing with the update
    /// is never lost: `f` is re-applied to the newer value instead. No-op
    /// before the first publish.
    pub fn update(&self, f: impl Fn(&CheckResult) -> CheckResult) {
        self.slot.rcu(|current| current.as_ref().map(|result| Arc::new(f(&**result))));
    }

    /// The latest value, or `None` before the first publish.
    pub fn latest(&self) -> Option<Arc<CheckResult>> {
        self.slot.load_full()
    }

    /// The latest value, or [`CheckResult::unknown`] before the first publish.
    pub fn read(&self) -> CheckResult {
        self.latest()
            .map(|result| result.as_ref().clone())
            .unwrap_or_else(CheckResult::unknown)
    }

    pub fn is_empty(&self) -> bool {
        self.slot.load().is_none()
    }
}
