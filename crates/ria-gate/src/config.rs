use serde::{Deserialize, Serialize};

/// Layout version written into a fresh marker and accepted from existing ones.
pub const SUPPORTED_LAYOUT_VERSION: &str = "1";

/// Configuration for the layout version gate.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GateConfig {
    /// Layout version of the tree of repositories below the store base.
    pub dataset_tree_version: String,
    /// Layout version of one repository's object tree.
    pub object_tree_version: String,
    /// Stay writable even when a marker is missing or unsupported.
    pub force_write: bool,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            dataset_tree_version: SUPPORTED_LAYOUT_VERSION.to_string(),
            object_tree_version: SUPPORTED_LAYOUT_VERSION.to_string(),
            force_write: false,
        }
    }
}

impl GateConfig {
    /// Default versions with the force-write override set as given.
    pub fn with_force_write(force_write: bool) -> Self {
        Self {
            force_write,
            ..Default::default()
        }
    }
}
