use std::fs::{self, File};
use std::path::Path;
use std::process::{Command, Stdio};

use tracing::debug;

use crate::archive::{listing_contains, ArchiveTool};
use crate::error::{StoreError, StoreResult};
use crate::traits::{with_trailing_newline, IoBackend};

/// Store access through the local filesystem.
///
/// Used when the store base path is reachable directly, including network
/// mounts. Archive lookups shell out to the configured archive tool.
#[derive(Clone, Debug, Default)]
pub struct LocalIo {
    archive: ArchiveTool,
}

impl LocalIo {
    /// Create a backend with the default archive tool.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a backend using a specific archive tool program.
    pub fn with_archive_tool(archive: ArchiveTool) -> Self {
        Self { archive }
    }

    pub fn archive_tool(&self) -> &ArchiveTool {
        &self.archive
    }

    fn run_tool(&self, mut cmd: Command, archive: &Path) -> StoreResult<std::process::Output> {
        cmd.stdin(Stdio::null())
            .output()
            .map_err(|err| StoreError::Archive {
                archive: archive.to_path_buf(),
                reason: format!("cannot run {}: {err}", self.archive.program()),
            })
    }
}

impl IoBackend for LocalIo {
    fn mkdir(&mut self, path: &Path) -> StoreResult<()> {
        debug!(path = %path.display(), "mkdir");
        fs::create_dir_all(path).map_err(|e| StoreError::io("mkdir", path, e))
    }

    fn put(&mut self, local_src: &Path, dst: &Path) -> StoreResult<()> {
        debug!(src = %local_src.display(), dst = %dst.display(), "put");
        fs::copy(local_src, dst)
            .map(|_| ())
            .map_err(|e| StoreError::io("copy", local_src, e))
    }

    fn get(&mut self, src: &Path, local_dst: &Path, expected_size: Option<u64>) -> StoreResult<()> {
        debug!(src = %src.display(), dst = %local_dst.display(), "get");
        let copied = fs::copy(src, local_dst).map_err(|e| StoreError::io("copy", src, e))?;
        check_size(src, expected_size, copied)
    }

    fn rename(&mut self, src: &Path, dst: &Path) -> StoreResult<()> {
        debug!(src = %src.display(), dst = %dst.display(), "rename");
        fs::rename(src, dst).map_err(|e| StoreError::io("rename", src, e))
    }

    fn remove(&mut self, path: &Path) -> StoreResult<()> {
        debug!(path = %path.display(), "remove");
        fs::remove_file(path).map_err(|e| StoreError::io("remove", path, e))
    }

    fn remove_dir(&mut self, path: &Path) -> StoreResult<()> {
        debug!(path = %path.display(), "remove_dir");
        fs::remove_dir(path).map_err(|e| StoreError::io("rmdir", path, e))
    }

    fn exists(&mut self, path: &Path) -> StoreResult<bool> {
        path.try_exists().map_err(|e| StoreError::io("stat", path, e))
    }

    fn read_file(&mut self, path: &Path) -> StoreResult<String> {
        fs::read_to_string(path).map_err(|e| StoreError::io("read", path, e))
    }

    fn write_file(&mut self, path: &Path, content: &str) -> StoreResult<()> {
        debug!(path = %path.display(), "write_file");
        fs::write(path, with_trailing_newline(content)).map_err(|e| StoreError::io("write", path, e))
    }

    fn file_in_archive(&mut self, archive: &Path, member: &Path) -> StoreResult<bool> {
        // Locally the probe is free and saves spawning the tool.
        if !self.exists(archive)? {
            return Ok(false);
        }
        let output = self.run_tool(self.archive.list_command(archive, member), archive)?;
        if !output.status.success() {
            debug!(archive = %archive.display(), status = %output.status, "archive listing failed");
            return Ok(false);
        }
        Ok(listing_contains(&String::from_utf8_lossy(&output.stdout), member))
    }

    fn read_from_archive(
        &mut self,
        archive: &Path,
        member: &Path,
        local_dst: &Path,
        expected_size: Option<u64>,
    ) -> StoreResult<()> {
        // 7z exits 0 and writes nothing for a missing member.
        if !self.file_in_archive(archive, member)? {
            return Err(StoreError::NotFound(archive.join(member)));
        }
        debug!(archive = %archive.display(), member = %member.display(), "extract");
        let dst = File::create(local_dst).map_err(|e| StoreError::io("create", local_dst, e))?;
        let mut cmd = self.archive.extract_command(archive, member);
        cmd.stdout(dst).stderr(Stdio::piped());
        let result = self.run_tool(cmd, archive).and_then(|output| {
            if output.status.success() {
                Ok(())
            } else {
                Err(StoreError::Archive {
                    archive: archive.to_path_buf(),
                    reason: String::from_utf8_lossy(&output.stderr).trim().to_string(),
                })
            }
        });
        let result = result.and_then(|()| {
            let written = fs::metadata(local_dst)
                .map_err(|e| StoreError::io("stat", local_dst, e))?
                .len();
            check_size(&archive.join(member), expected_size, written)
        });
        if result.is_err() {
            let _ = fs::remove_file(local_dst);
        }
        result
    }
}

fn check_size(path: &Path, expected: Option<u64>, actual: u64) -> StoreResult<()> {
    match expected {
        Some(expected) if expected != actual => Err(StoreError::SizeMismatch {
            path: path.to_path_buf(),
            expected,
            actual,
        }),
        _ => Ok(()),
    }
}
