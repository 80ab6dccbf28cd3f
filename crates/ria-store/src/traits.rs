use std::path::Path;

use crate::error::StoreResult;

/// Byte-level access to a RIA store.
///
/// Paths on the store side are absolute paths in the store's filesystem.
/// Paths named `local_*` are on the machine running the special remote.
///
/// All implementations must satisfy these invariants:
/// - Operations on a missing target fail with `StoreError::NotFound`.
/// - `exists` never fails for a missing target; it fails only when the
///   backend itself cannot answer.
/// - `rename` is atomic on the store side; it is the commit step of every
///   upload.
/// - All other failures surface with the original diagnostic preserved.
///
/// Methods take `&mut self` because a backend may drive a stateful
/// channel (a remote shell) that cannot be used concurrently.
pub trait IoBackend {
    /// Create a directory and all missing ancestors. Idempotent.
    fn mkdir(&mut self, path: &Path) -> StoreResult<()>;

    /// Copy a local file to `dst` on the store, replacing any existing file.
    fn put(&mut self, local_src: &Path, dst: &Path) -> StoreResult<()>;

    /// Copy `src` from the store to a local file.
    ///
    /// When `expected_size` is given the transfer must yield exactly that
    /// many bytes, otherwise it fails with `StoreError::SizeMismatch`.
    fn get(&mut self, src: &Path, local_dst: &Path, expected_size: Option<u64>) -> StoreResult<()>;

    /// Atomically rename `src` to `dst` within the store.
    fn rename(&mut self, src: &Path, dst: &Path) -> StoreResult<()>;

    /// Delete a file.
    fn remove(&mut self, path: &Path) -> StoreResult<()>;

    /// Delete an empty directory. Fails on a non-empty directory.
    fn remove_dir(&mut self, path: &Path) -> StoreResult<()>;

    /// Check whether a path exists.
    fn exists(&mut self, path: &Path) -> StoreResult<bool>;

    /// Read a small text file in full.
    fn read_file(&mut self, path: &Path) -> StoreResult<String>;

    /// Write a small text file, always terminated by a newline.
    fn write_file(&mut self, path: &Path, content: &str) -> StoreResult<()>;

    /// Check whether `member` (relative to the archive root) is in an
    /// archive. A missing archive is reported as `Ok(false)`.
    fn file_in_archive(&mut self, archive: &Path, member: &Path) -> StoreResult<bool>;

    /// Extract one archive member to a local file. `expected_size` has the
    /// same meaning as for [`IoBackend::get`].
    fn read_from_archive(
        &mut self,
        archive: &Path,
        member: &Path,
        local_dst: &Path,
        expected_size: Option<u64>,
    ) -> StoreResult<()>;
}

/// Terminate `content` with a newline unless it already is.
pub fn with_trailing_newline(content: &str) -> String {
    let mut out = content.to_string();
    if !out.ends_with('\n') {
        out.push('\n');
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn newline_appended_once() {
        assert_eq!(with_trailing_newline("1"), "1\n");
        assert_eq!(with_trailing_newline("1\n"), "1\n");
    }
}
