use std::fmt;
use std::path::Path;

use ria_store::IoBackend;
use serde::Serialize;
use tracing::debug;

use crate::error::{GateError, GateResult};

/// The two scopes carrying a layout version marker.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MarkerScope {
    /// `<base>/ria-layout-version`
    DatasetTree,
    /// `<repo_root>/ria-layout-version`
    ObjectTree,
}

impl fmt::Display for MarkerScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DatasetTree => f.write_str("dataset tree"),
            Self::ObjectTree => f.write_str("object tree"),
        }
    }
}

/// What was found at one marker location.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum MarkerState {
    /// Neither the marker nor its directory existed; both were created.
    Claimed,
    /// The marker records the supported version.
    Current,
    /// The directory exists without a marker: some unknown legacy layout.
    Unversioned,
    /// The marker records a different version.
    Mismatch { found: String },
}

impl MarkerState {
    /// Whether the tree can be written without an override.
    pub fn is_trusted(&self) -> bool {
        matches!(self, Self::Claimed | Self::Current)
    }
}

/// Inspect the marker at `marker`, claiming it for `supported` if the
/// location is untouched.
///
/// Only absence of the marker drives the bootstrap decision; any other
/// read failure is reported as is.
pub fn inspect_marker(
    io: &mut dyn IoBackend,
    marker: &Path,
    supported: &str,
) -> GateResult<MarkerState> {
    match io.read_file(marker) {
        Ok(content) => {
            let found = content.trim();
            if found == supported {
                Ok(MarkerState::Current)
            } else {
                Ok(MarkerState::Mismatch {
                    found: found.to_string(),
                })
            }
        }
        Err(err) if err.is_not_found() => {
            let parent = marker.parent().unwrap_or_else(|| Path::new("/"));
            let parent_exists = io.exists(parent).map_err(|source| GateError::Inspect {
                path: marker.to_path_buf(),
                source,
            })?;
            if parent_exists {
                return Ok(MarkerState::Unversioned);
            }
            debug!(marker = %marker.display(), version = supported, "claiming layout version marker");
            io.mkdir(parent)
                .and_then(|()| io.write_file(marker, supported))
                .map_err(|source| GateError::Claim {
                    path: marker.to_path_buf(),
                    source,
                })?;
            Ok(MarkerState::Claimed)
        }
        Err(source) => Err(GateError::Inspect {
            path: marker.to_path_buf(),
            source,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    use ria_store::LocalIo;
    use tempfile::TempDir;

    #[test]
    fn untouched_location_is_claimed() {
        let dir = TempDir::new().unwrap();
        let marker = dir.path().join("store/ria-layout-version");
        let state = inspect_marker(&mut LocalIo::new(), &marker, "1").unwrap();
        assert_eq!(state, MarkerState::Claimed);
        assert_eq!(fs::read_to_string(&marker).unwrap(), "1\n");
    }

    #[test]
    fn matching_marker_is_current() {
        let dir = TempDir::new().unwrap();
        let marker = dir.path().join("ria-layout-version");
        fs::write(&marker, "1\n").unwrap();
        assert_eq!(
            inspect_marker(&mut LocalIo::new(), &marker, "1").unwrap(),
            MarkerState::Current
        );
    }

    #[test]
    fn other_version_is_reported() {
        let dir = TempDir::new().unwrap();
        let marker = dir.path().join("ria-layout-version");
        fs::write(&marker, "2\n").unwrap();
        let state = inspect_marker(&mut LocalIo::new(), &marker, "1").unwrap();
        assert_eq!(state, MarkerState::Mismatch { found: "2".into() });
        assert!(!state.is_trusted());
        // Never rewritten.
        assert_eq!(fs::read_to_string(&marker).unwrap(), "2\n");
    }

    #[test]
    fn existing_directory_without_marker_is_unversioned() {
        let dir = TempDir::new().unwrap();
        let marker = dir.path().join("ria-layout-version");
        let state = inspect_marker(&mut LocalIo::new(), &marker, "1").unwrap();
        assert_eq!(state, MarkerState::Unversioned);
        assert!(!marker.exists());
    }

    #[cfg(unix)]
    #[test]
    fn failed_claim_is_a_hard_error() {
        let dir = TempDir::new().unwrap();
        // Dangling symlink: reads as absent, but cannot be created.
        std::os::unix::fs::symlink(dir.path().join("nowhere"), dir.path().join("store")).unwrap();
        let marker = dir.path().join("store/ria-layout-version");
        let err = inspect_marker(&mut LocalIo::new(), &marker, "1").unwrap_err();
        assert!(matches!(err, GateError::Claim { .. }));
    }

    #[test]
    fn only_claimed_and_current_are_trusted() {
        assert!(MarkerState::Claimed.is_trusted());
        assert!(MarkerState::Current.is_trusted());
        assert!(!MarkerState::Unversioned.is_trusted());
        assert!(!MarkerState::Mismatch { found: "0".into() }.is_trusted());
    }

    #[test]
    fn state_serializes_with_tag() {
        let json = serde_json::to_string(&MarkerState::Mismatch { found: "2".into() }).unwrap();
        assert_eq!(json, r#"{"state":"mismatch","found":"2"}"#);
    }
}
