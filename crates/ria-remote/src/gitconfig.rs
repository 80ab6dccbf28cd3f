use std::collections::HashMap;
use std::path::Path;
use std::process::{Command, Stdio};

use tracing::debug;

/// Key of the dataset identifier in a dataset's committed configuration.
pub const DATASET_ID_KEY: &str = "datalad.dataset.id";

/// Key/value configuration of the repository using the remote.
///
/// Lookups never fail: a missing key and an unreadable configuration both
/// come back as `None`.
pub trait ConfigSource {
    /// Value of `key` (e.g. `annex.ria-remote.store.base-path`).
    fn get(&self, git_dir: &Path, key: &str) -> Option<String>;

    /// Identifier recorded in the dataset's committed configuration, if
    /// the repository is a dataset.
    fn dataset_id(&self, git_dir: &Path) -> Option<String>;
}

/// Reads configuration by running `git config`.
#[derive(Clone, Debug)]
pub struct GitConfig {
    git_program: String,
}

impl GitConfig {
    pub fn new() -> Self {
        Self {
            git_program: "git".into(),
        }
    }

    fn query(&self, git_dir: &Path, extra: &[&str], key: &str) -> Option<String> {
        let output = Command::new(&self.git_program)
            .arg("--git-dir")
            .arg(git_dir)
            .arg("config")
            .args(extra)
            .args(["--get", key])
            .stdin(Stdio::null())
            .stderr(Stdio::null())
            .output();
        match output {
            Ok(out) if out.status.success() => {
                let value = String::from_utf8_lossy(&out.stdout).trim().to_string();
                Some(value).filter(|v| !v.is_empty())
            }
            Ok(out) => {
                debug!(key, git_dir = %git_dir.display(), status = %out.status, "config not set");
                None
            }
            Err(err) => {
                debug!(key, git_dir = %git_dir.display(), error = %err, "cannot run git");
                None
            }
        }
    }
}

impl Default for GitConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigSource for GitConfig {
    fn get(&self, git_dir: &Path, key: &str) -> Option<String> {
        self.query(git_dir, &[], key)
    }

    fn dataset_id(&self, git_dir: &Path) -> Option<String> {
        self.query(git_dir, &["--blob", ":.datalad/config"], DATASET_ID_KEY)
    }
}

/// In-memory configuration.
#[derive(Clone, Debug, Default)]
pub struct MapConfig {
    values: HashMap<String, String>,
}

impl MapConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder: set `key` to `value`.
    pub fn with(mut self, key: &str, value: &str) -> Self {
        self.values.insert(key.to_string(), value.to_string());
        self
    }
}

impl ConfigSource for MapConfig {
    fn get(&self, _git_dir: &Path, key: &str) -> Option<String> {
        self.values.get(key).cloned()
    }

    fn dataset_id(&self, _git_dir: &Path) -> Option<String> {
        self.values.get(DATASET_ID_KEY).cloned()
    }
}

/// Interpret a git-style boolean. `None` if the value is not one.
pub fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "yes" | "on" | "1" => Some(true),
        "false" | "no" | "off" | "0" | "" => Some(false),
        _ => None,
    }
}
