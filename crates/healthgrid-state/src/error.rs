//! Error types for inventory discovery and probing.
//!
//! Discovery errors abort an aggregation request. Probe errors never do:
//! the engine folds them into a failing `CheckResult` or skips the pod.

use thiserror::Error;

/// Result type alias for discovery operations.
pub type InventoryResult<T> = Result<T, InventoryError>;

/// Result type alias for probe operations.
pub type ProbeResult<T> = Result<T, ProbeError>;

/// Errors raised while listing categories, services, or pods.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InventoryError {
    #[error("inventory unavailable: {0}")]
    Unavailable(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("invalid inventory: {0}")]
    Invalid(String),

    #[error("ack store error: {0}")]
    Ack(String),
}

/// Errors raised by a single health probe.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProbeError {
    #[error("connection to {address} failed: {reason}")]
    Connect { address: String, reason: String },

    #[error("probe of {0} timed out")]
    Timeout(String),

    #[error("{target} answered with status {status}")]
    Status { target: String, status: u16 },

    #[error("malformed health payload: {0}")]
    Payload(String),

    #[error("{0}")]
    Unhealthy(String),

    #[error(transparent)]
    Inventory(#[from] InventoryError),
}
