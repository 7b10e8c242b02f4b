//! healthgrid-health: the concurrent health-aggregation engine.
//!
//! Keeps one background refresh loop per monitored service, holds each
//! service's most recent result in a lock-free cache, reconciles the set of
//! loops against a changing inventory, and folds per-service and per-pod
//! results into one cluster-wide status.
//!
//! # Architecture
//!
//! ```text
//! ServiceRegistry (RwLock<HashMap<name, MonitoredEntity>>)
//!   ├── reconcile(services) → start / replace CheckSchedulers
//!   └── MonitoredEntity
//!       ├── Service config (ack mutable in place)
//!       ├── LatestValueCache  ← CheckScheduler publishes
//!       └── ResultBuffer      → drained by metrics exporters
//!
//! AggregationEngine
//!   ├── categories → service names → services
//!   ├── cached read or live ServiceChecker probe
//!   ├── SeverityResolver (resilient short-circuit)
//!   └── get_final_result() → sorted AggregateResult
//! ```
//!
//! # Failure isolation
//!
//! Discovery failures abort a request with `EngineError::Discovery`. Probe
//! failures never do: they become failing check results, or skipped pods
//! during severity scans.

pub mod buffer;
pub mod cache;
pub mod checker;
pub mod engine;
pub mod error;
pub mod registry;
pub mod scheduler;
pub mod severity;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use buffer::ResultBuffer;
pub use cache::LatestValueCache;
pub use checker::ServiceChecker;
pub use engine::{AggregationEngine, ServicesHealth, get_final_result};
pub use error::{EngineError, EngineResult};
pub use registry::{EngineConfig, MonitoredEntity, ReconcileReport, ServiceRegistry};
pub use scheduler::CheckScheduler;
pub use severity::SeverityResolver;
