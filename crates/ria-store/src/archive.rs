//! Adapter for the external 7-Zip tool used to read archives.
//!
//! Archives are never written by the store. Only two invocations are used:
//! `l <archive> <member>` to test membership and `x -so <archive> <member>`
//! to stream one member to stdout.

use std::ffi::OsString;
use std::path::Path;
use std::process::Command;

/// Default 7-Zip executable name.
pub const DEFAULT_ARCHIVE_TOOL: &str = "7z";

/// The archive tool program, as configured (`7z`, `7za`, `7zz`, a path...).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ArchiveTool {
    program: String,
}

impl ArchiveTool {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    /// Arguments listing `member` of `archive`. Restricting the listing to
    /// one member keeps the output small even for large archives.
    pub fn list_args(&self, archive: &Path, member: &Path) -> Vec<OsString> {
        vec!["l".into(), archive.into(), member.into()]
    }

    /// Arguments streaming `member` of `archive` to stdout.
    pub fn extract_args(&self, archive: &Path, member: &Path) -> Vec<OsString> {
        vec!["x".into(), "-so".into(), archive.into(), member.into()]
    }

    /// Local command listing one member.
    pub fn list_command(&self, archive: &Path, member: &Path) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(self.list_args(archive, member));
        cmd
    }

    /// Local command streaming one member to stdout.
    pub fn extract_command(&self, archive: &Path, member: &Path) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(self.extract_args(archive, member));
        cmd
    }
}

impl Default for ArchiveTool {
    fn default() -> Self {
        Self::new(DEFAULT_ARCHIVE_TOOL)
    }
}

/// Check whether a member listing mentions `member`.
///
/// 7-Zip prints one row per entry with the path in the last column; a
/// missing member or archive yields no such row.
pub fn listing_contains(listing: &str, member: &Path) -> bool {
    let member = member.to_string_lossy();
    let column = format!(" {member}");
    listing
        .lines()
        .map(str::trim_end)
        .any(|line| line == member || line.ends_with(&column))
}
