//! Error types for the health engine.

use healthgrid_state::{InventoryError, ProbeError};
use thiserror::Error;

/// Result type alias for engine operations.
pub type EngineResult<T> = Result<T, EngineError>;

/// Errors that abort an engine request.
///
/// Probe failures during aggregation are not represented here; they are
/// reported inside the aggregate as failing checks.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("discovery failed: {0}")]
    Discovery(#[from] InventoryError),

    #[error("service not found: {0}")]
    ServiceNotFound(String),

    #[error("pod not found: {0}")]
    PodNotFound(String),

    #[error("health payload unavailable: {0}")]
    Payload(#[from] ProbeError),

    #[error("acknowledgement message must not be empty")]
    EmptyAck,
}
