use std::path::{Path, PathBuf};

use ria_protocol::Annex;
use ria_store::DEFAULT_ARCHIVE_TOOL;
use ria_types::RepositoryId;
use serde::Serialize;

use crate::error::{RemoteError, RemoteResult};
use crate::gitconfig::{parse_bool, ConfigSource};

/// Value of `ssh-host` in git config that disables an ssh-host stored in
/// the remote's own configuration.
pub const SSH_HOST_DISABLED: &str = "0";

/// Settings of the remote's own configuration.
pub mod keys {
    pub const NAME: &str = "name";
    pub const CFGNAME: &str = "cfgname";
    pub const BASE_PATH: &str = "base-path";
    pub const SSH_HOST: &str = "ssh-host";
    pub const FORCE_WRITE: &str = "force-write";
    pub const ARCHIVE_ID: &str = "archive-id";
    pub const ARCHIVE_TOOL: &str = "archive-tool";
}

/// Effective configuration of one remote.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct RemoteConfig {
    /// Name used for git config lookups (`annex.ria-remote.<name>.*`).
    pub name: Option<String>,
    /// Absolute store base path on the storage host.
    pub base_path: PathBuf,
    /// Host to reach the store over SSH; local access when `None`.
    pub ssh_host: Option<String>,
    /// Stay writable when the layout version is unknown.
    pub force_write: bool,
    /// The repository's identity in the store.
    pub archive_id: Option<RepositoryId>,
    /// 7-Zip executable used for archive access.
    pub archive_tool: String,
}

impl RemoteConfig {
    /// Resolve the configuration: git config of the repository first, then
    /// the remote's own configuration kept by the host.
    pub fn resolve(
        annex: &mut dyn Annex,
        source: &dyn ConfigSource,
        git_dir: &Path,
    ) -> RemoteResult<Self> {
        let name = match annex.get_config(keys::CFGNAME)? {
            Some(name) => Some(name),
            None => annex.get_config(keys::NAME)?,
        };
        let git = |field: &str| -> Option<String> {
            let name = name.as_deref()?;
            source
                .get(git_dir, &format!("annex.ria-remote.{name}.{field}"))
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let base_path = match git(keys::BASE_PATH) {
            Some(path) => Some(path),
            None => annex.get_config(keys::BASE_PATH)?.map(|v| v.trim().to_string()),
        }
        .ok_or_else(|| RemoteError::config("No remote base path configured. Specify `base-path` setting."))?;
        let base_path = PathBuf::from(base_path);
        if !base_path.is_absolute() {
            return Err(RemoteError::config(format!(
                "Non-absolute object tree base path configuration: {}",
                base_path.display()
            )));
        }

        // A git config "0" overrules whatever the remote has on record.
        let ssh_host = match git(keys::SSH_HOST) {
            Some(host) => Some(host),
            None => annex.get_config(keys::SSH_HOST)?,
        }
        .filter(|host| host != SSH_HOST_DISABLED);

        let force_write = match git(keys::FORCE_WRITE) {
            Some(value) => Some(value),
            None => annex.get_config(keys::FORCE_WRITE)?,
        };
        let force_write = match force_write {
            None => false,
            Some(value) => parse_bool(&value).ok_or_else(|| {
                RemoteError::config(format!("Invalid boolean for force-write: {value:?}"))
            })?,
        };

        let archive_tool = match git(keys::ARCHIVE_TOOL) {
            Some(tool) => tool,
            None => annex
                .get_config(keys::ARCHIVE_TOOL)?
                .unwrap_or_else(|| DEFAULT_ARCHIVE_TOOL.to_string()),
        };

        let archive_id = annex
            .get_config(keys::ARCHIVE_ID)?
            .map(|id| RepositoryId::parse(id.trim()))
            .transpose()?;

        Ok(Self {
            name,
            base_path,
            ssh_host,
            force_write,
            archive_id,
            archive_tool,
        })
    }

    /// The archive id, which every operation after `initremote` needs.
    pub fn require_archive_id(&self) -> RemoteResult<&RepositoryId> {
        self.archive_id
            .as_ref()
            .ok_or_else(|| RemoteError::config("No archive ID configured. This should not happen."))
    }
}
