//! healthgrid-metrics: observability for monitored services.
//!
//! Drains the result buffer of every monitored entity into per-service
//! counters, keeps a pilot-light heartbeat so scrapers can tell a quiet
//! exporter from a dead one, and renders both in the Prometheus text format.
//!
//! # Architecture
//!
//! ```text
//! ResultFeeder
//!   ├── feed() ← drains MonitoredEntity buffers
//!   ├── snapshot() → Vec<ServiceSnapshot>
//!   └── run() → periodic feed loop
//!
//! PilotLight
//!   └── run() → periodic heartbeat
//!
//! Prometheus exposition
//!   └── render_prometheus() → text/plain for /metrics endpoint
//! ```

pub mod feeder;
pub mod pilot;
pub mod prometheus;

pub use feeder::{ResultFeeder, ServiceSnapshot};
pub use pilot::PilotLight;
pub use prometheus::{MetricsReport, render_prometheus};
