//! Path resolution for RIA stores.
//!
//! Everything here is a pure function of the base path, the repository id
//! and the key. Changing any of it changes the on-disk layout, which must
//! be reflected in the layout version markers.

use std::path::{Path, PathBuf};

use md5::{Digest, Md5};
use ria_types::{ContentKey, RepositoryId};
use serde::Serialize;

/// Name of the layout version marker, at the store root and at each
/// repository root.
pub const LAYOUT_VERSION_FILE: &str = "ria-layout-version";

const ARCHIVE_DIR: &str = "archives";
const ARCHIVE_FILE: &str = "archive.7z";
const ANNEX_DIR: &str = "annex";
const OBJECTS_DIR: &str = "objects";
const TRANSFER_DIR: &str = "transfer";

/// Locations of one repository inside a store.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct StoreLayout {
    /// Store base path, shared by all repositories.
    pub base_path: PathBuf,
    /// `<base>/<id[0:3]>/<id[3:]>`
    pub repo_root: PathBuf,
    /// `<repo_root>/archives/archive.7z`
    pub archive_path: PathBuf,
    /// `<repo_root>/annex/objects`
    pub object_root: PathBuf,
}

impl StoreLayout {
    /// Compute the layout of repository `id` in the store at `base_path`.
    ///
    /// `base_path` must be absolute; callers validate configuration before
    /// getting here.
    pub fn locate(base_path: &Path, id: &RepositoryId) -> Self {
        debug_assert!(base_path.is_absolute(), "store base path must be absolute");
        let repo_root = base_path.join(id.prefix()).join(id.suffix());
        let archive_path = repo_root.join(ARCHIVE_DIR).join(ARCHIVE_FILE);
        let object_root = repo_root.join(ANNEX_DIR).join(OBJECTS_DIR);
        Self {
            base_path: base_path.to_path_buf(),
            repo_root,
            archive_path,
            object_root,
        }
    }

    /// Absolute path of the object file for `key`.
    pub fn object_path(&self, key: &ContentKey) -> PathBuf {
        self.object_root.join(key_path(key))
    }

    /// Marker recording the layout version of the tree of repositories.
    pub fn dataset_tree_marker(&self) -> PathBuf {
        self.base_path.join(LAYOUT_VERSION_FILE)
    }

    /// Marker recording the layout version of this repository's object tree.
    pub fn object_tree_marker(&self) -> PathBuf {
        self.repo_root.join(LAYOUT_VERSION_FILE)
    }

    /// Directory holding in-flight uploads of one writer identity.
    ///
    /// It lives under the repository root rather than the object tree, so
    /// a partially written object is never visible at its final path.
    pub fn staging_dir(&self, identity: &str) -> PathBuf {
        self.repo_root
            .join(format!("ria-remote-{identity}"))
            .join(TRANSFER_DIR)
    }

    /// Staging file for uploading `key` under writer `identity`.
    pub fn staging_path(&self, identity: &str, key: &ContentKey) -> PathBuf {
        self.staging_dir(identity).join(key.as_str())
    }
}

/// Object path relative to the object root: `<abc>/<def>/<key>/<key>`.
///
/// The doubled key matches the directory-type store layout, which keeps a
/// per-key directory so that file permissions can be locked down per object.
pub fn key_path(key: &ContentKey) -> PathBuf {
    PathBuf::from(dirhash_lower(key))
        .join(key.as_str())
        .join(key.as_str())
}

/// Two-level lowercase hash bucket for `key`, e.g. `f87/4d5`.
///
/// The first six hex digits of the MD5 of the key with chunk fields
/// removed, split 3/3.
pub fn dirhash_lower(key: &ContentKey) -> String {
    let digest = hex::encode(Md5::digest(key.non_chunk().as_bytes()));
    format!("{}/{}", &digest[0..3], &digest[3..6])
}
