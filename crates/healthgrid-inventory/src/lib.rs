//! Inventory backends for healthgrid.
//!
//! [`FileInventory`] reads the service catalogue from a TOML file and probes
//! pods over HTTP with [`HttpProber`].

pub mod file;
pub mod probe;

pub use file::{FileInventory, InventoryFile};
pub use probe::{GTG_PATH, HEALTH_PATH, HttpProber, individual_severity};
