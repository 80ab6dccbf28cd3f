//! Layout version gate for RIA stores.
//!
//! A store records the version of its on-disk layout at two scopes: the
//! tree of repositories below the base path, and each repository's object
//! tree. Before a store is used the gate reads both markers:
//!
//! | marker | directory | outcome |
//! |--------|-----------|---------|
//! | absent | absent    | claim: write the supported version |
//! | absent | present   | unknown legacy layout: read-only |
//! | supported version | - | read-write |
//! | other version | - | read-only |
//!
//! The read-only outcomes are lifted by the force-write override.

pub mod config;
pub mod error;
pub mod gate;
pub mod marker;

// Re-exports for convenience.
pub use config::{GateConfig, SUPPORTED_LAYOUT_VERSION};
pub use error::{GateError, GateResult};
pub use gate::{GateReport, LayoutVersionGate};
pub use marker::{inspect_marker, MarkerScope, MarkerState};
