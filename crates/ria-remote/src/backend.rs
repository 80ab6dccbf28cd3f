use std::path::Path;

use ria_ssh::{SessionProvider, SshRemoteIo};
use ria_store::{ArchiveTool, IoBackend, LocalIo, StoreResult};
use tracing::{debug, warn};

use crate::config::RemoteConfig;
use crate::error::RemoteResult;

/// Cost reported for a store on this machine.
pub const LOCAL_COST: u32 = 100;
/// Cost reported for a store behind SSH.
pub const REMOTE_COST: u32 = 200;

/// The two ways of reaching a store, chosen once per `prepare`.
pub enum Backend {
    Local(LocalIo),
    RemoteShell(SshRemoteIo),
}

impl Backend {
    /// Pick the backend for `config`, connecting if the store is remote.
    pub fn select(config: &RemoteConfig, sessions: &dyn SessionProvider) -> RemoteResult<Self> {
        let archive = ArchiveTool::new(config.archive_tool.clone());
        match &config.ssh_host {
            None => {
                debug!(base = %config.base_path.display(), "using local store");
                Ok(Backend::Local(LocalIo::with_archive_tool(archive)))
            }
            Some(host) => {
                debug!(host, base = %config.base_path.display(), "using store over ssh");
                Ok(Backend::RemoteShell(SshRemoteIo::connect(sessions, host, archive)?))
            }
        }
    }

    pub fn is_local(&self) -> bool {
        matches!(self, Backend::Local(_))
    }

    pub fn cost(&self) -> u32 {
        if self.is_local() {
            LOCAL_COST
        } else {
            REMOTE_COST
        }
    }

    /// Name of the storage host; `local` for the local backend.
    pub fn host(&self) -> &str {
        match self {
            Backend::Local(_) => "local",
            Backend::RemoteShell(io) => io.host(),
        }
    }

    /// Human-readable location of `path`. `relative` is what the local
    /// backend shows.
    pub fn locator(&self, path: &Path, relative: &Path) -> String {
        match self {
            Backend::Local(_) => relative.display().to_string(),
            Backend::RemoteShell(io) => io.locator(path),
        }
    }

    /// Release the connection, if any. Failures are only logged.
    pub fn close(&mut self) {
        if let Backend::RemoteShell(io) = self {
            if let Err(err) = io.close() {
                warn!(host = io.host(), error = %err, "closing remote shell failed");
            }
        }
    }

    fn io(&mut self) -> &mut dyn IoBackend {
        match self {
            Backend::Local(io) => io,
            Backend::RemoteShell(io) => io,
        }
    }
}

impl IoBackend for Backend {
    fn mkdir(&mut self, path: &Path) -> StoreResult<()> {
        self.io().mkdir(path)
    }

    fn put(&mut self, local_src: &Path, dst: &Path) -> StoreResult<()> {
        self.io().put(local_src, dst)
    }

    fn get(&mut self, src: &Path, local_dst: &Path, expected_size: Option<u64>) -> StoreResult<()> {
        self.io().get(src, local_dst, expected_size)
    }

    fn rename(&mut self, src: &Path, dst: &Path) -> StoreResult<()> {
        self.io().rename(src, dst)
    }

    fn remove(&mut self, path: &Path) -> StoreResult<()> {
        self.io().remove(path)
    }

    fn remove_dir(&mut self, path: &Path) -> StoreResult<()> {
        self.io().remove_dir(path)
    }

    fn exists(&mut self, path: &Path) -> StoreResult<bool> {
        self.io().exists(path)
    }

    fn read_file(&mut self, path: &Path) -> StoreResult<String> {
        self.io().read_file(path)
    }

    fn write_file(&mut self, path: &Path, content: &str) -> StoreResult<()> {
        self.io().write_file(path, content)
    }

    fn file_in_archive(&mut self, archive: &Path, member: &Path) -> StoreResult<bool> {
        self.io().file_in_archive(archive, member)
    }

    fn read_from_archive(
        &mut self,
        archive: &Path,
        member: &Path,
        local_dst: &Path,
        expected_size: Option<u64>,
    ) -> StoreResult<()> {
        self.io()
            .read_from_archive(archive, member, local_dst, expected_size)
    }
}
