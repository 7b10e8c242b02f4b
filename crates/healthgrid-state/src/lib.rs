//! healthgrid-state: domain types shared by every healthgrid crate.
//!
//! Defines the services, pods, and categories sourced from the inventory,
//! the immutable `CheckResult` produced by a single probe, the closed
//! `Severity` scale, and the `Inventory` trait that the health engine
//! consumes for discovery and probing.
//!
//! # Architecture
//!
//! ```text
//! Inventory (trait, async)
//!   ├── discovery: categories, services, pods
//!   ├── probes: service, pod, individual severity, raw payload
//!   └── ack persistence
//!
//! CheckResult ──▶ AggregateResult (sorted, ok + severity)
//! ```
//!
//! Nothing in this crate performs I/O; implementations of `Inventory` live
//! in `healthgrid-inventory` (and in test fakes).

pub mod duration;
pub mod error;
pub mod inventory;
pub mod types;

pub use error::{InventoryError, InventoryResult, ProbeError, ProbeResult};
pub use inventory::Inventory;
pub use types::*;
