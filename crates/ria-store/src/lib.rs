//! Object layout and I/O backends for RIA stores.
//!
//! A RIA store hosts the object trees of many repositories below one base
//! path. This crate knows where everything lives and how to move bytes in
//! and out of a store on the local (or NFS-mounted) filesystem.
//!
//! # Layout
//!
//! ```text
//! <base>/
//! ├── ria-layout-version                  # dataset tree version
//! └── <id[0:3]>/<id[3:]>/                 # repository root
//!     ├── ria-layout-version              # object tree version
//!     ├── archives/archive.7z             # optional read-only archive
//!     └── annex/objects/<abc>/<def>/<key>/<key>
//! ```
//!
//! The object tree is byte-compatible with a directory-type store, so a
//! tree can be packed into an archive (or copied around) unchanged.
//!
//! # Backends
//!
//! All backends implement the [`IoBackend`] trait:
//!
//! - [`LocalIo`] -- direct filesystem access plus an external archive tool
//!
//! The SSH-backed implementation lives in `ria-ssh`.

pub mod archive;
pub mod error;
pub mod layout;
pub mod local;
pub mod traits;

// Re-export primary types at crate root for ergonomic imports.
pub use archive::{ArchiveTool, DEFAULT_ARCHIVE_TOOL};
pub use error::{StoreError, StoreResult};
pub use layout::{dirhash_lower, key_path, StoreLayout, LAYOUT_VERSION_FILE};
pub use local::LocalIo;
pub use traits::IoBackend;
