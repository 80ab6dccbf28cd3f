use ria_store::{IoBackend, StoreLayout};
use serde::Serialize;
use tracing::{debug, info};

use crate::config::GateConfig;
use crate::error::GateResult;
use crate::marker::{inspect_marker, MarkerScope, MarkerState};

const READ_ONLY_NOTICE: &str = "Setting remote to read-only usage in order to prevent damage by \
     putting things into an unknown version of the target layout. You can overrule this by \
     configuring 'annex.ria-remote.<name>.force-write'.";

const FORCE_WRITE_NOTICE: &str = "Was instructed to force write";

// ---------------------------------------------------------------------------
// GateReport
// ---------------------------------------------------------------------------

/// The outcome of checking both layout version markers of a store.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct GateReport {
    /// State of `<base>/ria-layout-version`.
    pub dataset_tree: MarkerState,
    /// State of `<repo_root>/ria-layout-version`.
    pub object_tree: MarkerState,
    /// Whether writes must be refused for the rest of the process lifetime.
    pub read_only: bool,
    /// Human-readable notices, in the order they arose.
    pub notices: Vec<String>,
}

impl GateReport {
    /// Returns `true` if both markers were absent and have been written.
    pub fn bootstrapped(&self) -> bool {
        self.dataset_tree == MarkerState::Claimed && self.object_tree == MarkerState::Claimed
    }
}

// ---------------------------------------------------------------------------
// LayoutVersionGate
// ---------------------------------------------------------------------------

/// Checks the layout versions recorded in a store before it is used.
///
/// A store whose layout is unknown (a marker with another version, or a
/// directory without a marker) is degraded to read-only unless the
/// force-write override is configured. An untouched location is claimed
/// by writing the supported version.
pub struct LayoutVersionGate {
    config: GateConfig,
}

impl LayoutVersionGate {
    pub fn new(config: GateConfig) -> Self {
        Self { config }
    }

    /// The current configuration.
    pub fn config(&self) -> &GateConfig {
        &self.config
    }

    /// Evaluate the dataset tree marker, then the object tree marker.
    ///
    /// Fails only when a marker cannot be inspected or claimed.
    pub fn evaluate(
        &self,
        io: &mut dyn IoBackend,
        layout: &StoreLayout,
    ) -> GateResult<GateReport> {
        let mut notices = Vec::new();
        let mut read_only = false;

        let dataset_tree = inspect_marker(
            io,
            &layout.dataset_tree_marker(),
            &self.config.dataset_tree_version,
        )?;
        self.apply(
            MarkerScope::DatasetTree,
            &dataset_tree,
            &mut read_only,
            &mut notices,
        );

        let object_tree = inspect_marker(
            io,
            &layout.object_tree_marker(),
            &self.config.object_tree_version,
        )?;
        self.apply(
            MarkerScope::ObjectTree,
            &object_tree,
            &mut read_only,
            &mut notices,
        );

        debug!(?dataset_tree, ?object_tree, read_only, "layout version check done");
        Ok(GateReport {
            dataset_tree,
            object_tree,
            read_only,
            notices,
        })
    }

    fn supported(&self, scope: MarkerScope) -> &str {
        match scope {
            MarkerScope::DatasetTree => &self.config.dataset_tree_version,
            MarkerScope::ObjectTree => &self.config.object_tree_version,
        }
    }

    fn apply(
        &self,
        scope: MarkerScope,
        state: &MarkerState,
        read_only: &mut bool,
        notices: &mut Vec<String>,
    ) {
        if state.is_trusted() {
            return;
        }
        let notice = match state {
            MarkerState::Mismatch { found } => format!(
                "Remote {scope} reports version {found}. Supported version is {}. \
                 Consider upgrading or fix the structure on the remote end.",
                self.supported(scope)
            ),
            _ => format!(
                "Remote doesn't report any {scope} version. \
                 Consider upgrading or fix the structure on the remote end."
            ),
        };
        info!("{notice}");
        notices.push(notice);

        if self.config.force_write {
            notices.push(FORCE_WRITE_NOTICE.to_string());
        } else {
            *read_only = true;
            notices.push(READ_ONLY_NOTICE.to_string());
        }
    }
}
