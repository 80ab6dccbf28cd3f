use std::path::{Path, PathBuf};

use ria_gate::{GateConfig, GateReport, LayoutVersionGate};
use ria_protocol::{Annex, Availability, ConfigSetting, SpecialRemote};
use ria_ssh::SessionProvider;
use ria_store::{key_path, IoBackend, StoreLayout};
use ria_types::{ContentKey, RepositoryId};
use tracing::{debug, info, warn};

use crate::backend::Backend;
use crate::config::{keys, RemoteConfig};
use crate::error::{RemoteError, RemoteResult};
use crate::gitconfig::ConfigSource;

/// Number of ancestor directories `remove` tries to clean up.
const CLEANUP_LEVELS: usize = 2;

enum State {
    Unconfigured,
    Configured(RemoteConfig),
    Prepared(Box<Prepared>),
}

/// Everything `prepare` established for the data operations.
struct Prepared {
    config: RemoteConfig,
    layout: StoreLayout,
    backend: Backend,
    /// UUID of this remote, used to keep staging areas apart.
    identity: String,
    report: GateReport,
}

impl Prepared {
    fn check_writable(&self) -> RemoteResult<()> {
        if self.report.read_only {
            Err(RemoteError::ReadOnly)
        } else {
            Ok(())
        }
    }
}

/// The RIA special remote.
///
/// Configuration and transport are supplied at construction; the store
/// itself is located and checked in `prepare`.
pub struct RiaRemote {
    source: Box<dyn ConfigSource>,
    sessions: Box<dyn SessionProvider>,
    state: State,
}

impl RiaRemote {
    pub fn new(source: Box<dyn ConfigSource>, sessions: Box<dyn SessionProvider>) -> Self {
        Self {
            source,
            sessions,
            state: State::Unconfigured,
        }
    }

    /// Effective configuration, once `initremote` or `prepare` resolved it.
    pub fn config(&self) -> Option<&RemoteConfig> {
        match &self.state {
            State::Unconfigured => None,
            State::Configured(config) => Some(config),
            State::Prepared(p) => Some(&p.config),
        }
    }

    /// Store locations; `None` before `prepare`.
    pub fn layout(&self) -> Option<&StoreLayout> {
        match &self.state {
            State::Prepared(p) => Some(&p.layout),
            _ => None,
        }
    }

    /// Outcome of the layout version check; `None` before `prepare`.
    pub fn gate_report(&self) -> Option<&GateReport> {
        match &self.state {
            State::Prepared(p) => Some(&p.report),
            _ => None,
        }
    }

    pub fn read_only(&self) -> bool {
        self.gate_report().is_some_and(|r| r.read_only)
    }

    /// Release the backend. The remote must be prepared again before the
    /// next data operation.
    pub fn close(&mut self) {
        self.state = match std::mem::replace(&mut self.state, State::Unconfigured) {
            State::Prepared(p) => {
                let mut p = *p;
                p.backend.close();
                State::Configured(p.config)
            }
            other => other,
        };
    }

    fn prepared(&mut self) -> RemoteResult<&mut Prepared> {
        match &mut self.state {
            State::Prepared(p) => Ok(&mut **p),
            _ => Err(RemoteError::NotPrepared),
        }
    }

    // ---- Lifecycle ----

    /// Validate the configuration and record the archive id on first setup.
    pub fn init_remote(&mut self, annex: &mut dyn Annex) -> RemoteResult<()> {
        let git_dir = annex.get_git_dir()?;
        let mut config = RemoteConfig::resolve(annex, self.source.as_ref(), &git_dir)?;
        let id = match config.archive_id.take() {
            Some(id) => id,
            None => {
                let raw = match self.source.dataset_id(&git_dir) {
                    Some(id) => id,
                    None => annex.get_uuid()?,
                };
                RepositoryId::parse(raw.trim())?
            }
        };
        annex.set_config(keys::ARCHIVE_ID, id.as_str())?;
        info!(archive_id = %id, base = %config.base_path.display(), "remote initialized");
        config.archive_id = Some(id);
        self.close();
        self.state = State::Configured(config);
        Ok(())
    }

    /// Resolve the configuration, connect to the store, and check its
    /// layout versions. A previously prepared backend is closed first.
    pub fn prepare(&mut self, annex: &mut dyn Annex) -> RemoteResult<()> {
        self.close();

        let git_dir = annex.get_git_dir()?;
        let identity = annex.get_uuid()?;
        let config = RemoteConfig::resolve(annex, self.source.as_ref(), &git_dir)?;
        let layout = StoreLayout::locate(&config.base_path, config.require_archive_id()?);

        let mut backend = Backend::select(&config, self.sessions.as_ref())?;
        let gate = LayoutVersionGate::new(GateConfig::with_force_write(config.force_write));
        let report = match gate.evaluate(&mut backend, &layout) {
            Ok(report) => report,
            Err(err) => {
                backend.close();
                return Err(err.into());
            }
        };
        for notice in &report.notices {
            annex.notify(notice)?;
        }
        info!(
            host = backend.host(),
            repo_root = %layout.repo_root.display(),
            read_only = report.read_only,
            "remote prepared"
        );

        self.state = State::Prepared(Box::new(Prepared {
            config,
            layout,
            backend,
            identity,
            report,
        }));
        Ok(())
    }

    // ---- Data operations ----

    /// Upload `file` as the object of `key`.
    ///
    /// The bytes are written to a staging file outside the object tree and
    /// renamed into place, so the object never appears partially written.
    pub fn store(&mut self, key: &str, file: &Path) -> RemoteResult<()> {
        let p = self.prepared()?;
        p.check_writable()?;
        let key = ContentKey::parse(key)?;
        let object = p.layout.object_path(&key);
        let staging = p.layout.staging_path(&p.identity, &key);

        if let Some(dir) = object.parent() {
            p.backend.mkdir(dir)?;
        }
        p.backend.mkdir(&p.layout.staging_dir(&p.identity))?;

        if p.backend.exists(&staging)? {
            return Err(RemoteError::StagingConflict {
                key: key.to_string(),
                staging,
            });
        }

        let result = p
            .backend
            .put(file, &staging)
            .and_then(|()| p.backend.rename(&staging, &object));
        if let Err(err) = result {
            match p.backend.remove(&staging) {
                Err(cleanup) if !cleanup.is_not_found() => {
                    warn!(key = %key, error = %cleanup, "could not remove staging file");
                }
                _ => {}
            }
            return Err(err.into());
        }
        debug!(key = %key, "stored");
        Ok(())
    }

    /// Download the object of `key` into `file`, from the object tree or,
    /// failing that, from the archive.
    pub fn retrieve(&mut self, key: &str, file: &Path) -> RemoteResult<()> {
        let p = self.prepared()?;
        let key = ContentKey::parse(key)?;
        let expected_size = key.expected_size()?;
        let object = p.layout.object_path(&key);

        let object_err = match p.backend.get(&object, file, expected_size) {
            Ok(()) => return Ok(()),
            Err(err) => err,
        };
        debug!(key = %key, error = %object_err, "not in object tree, trying archive");
        match p.backend.read_from_archive(
            &p.layout.archive_path,
            &key_path(&key),
            file,
            expected_size,
        ) {
            Ok(()) => Ok(()),
            Err(archive_err) => Err(RemoteError::Retrieve {
                key: key.to_string(),
                object: object_err,
                archive: archive_err,
            }),
        }
    }

    /// Whether the store holds `key`, as an object or in the archive.
    pub fn check_present(&mut self, key: &str) -> RemoteResult<bool> {
        let p = self.prepared()?;
        let key = ContentKey::parse(key)?;
        if p.backend.exists(&p.layout.object_path(&key))? {
            return Ok(true);
        }
        Ok(p
            .backend
            .file_in_archive(&p.layout.archive_path, &key_path(&key))?)
    }

    /// Delete the object of `key`. Removing an absent key succeeds.
    pub fn remove(&mut self, key: &str) -> RemoteResult<()> {
        let p = self.prepared()?;
        p.check_writable()?;
        let key = ContentKey::parse(key)?;
        let object = p.layout.object_path(&key);

        match p.backend.remove(&object) {
            Ok(()) => debug!(key = %key, "removed"),
            Err(err) if err.is_not_found() => debug!(key = %key, "nothing to remove"),
            Err(err) => return Err(err.into()),
        }

        // Stop at the first directory that is not empty.
        let mut dir = object.parent();
        for _ in 0..CLEANUP_LEVELS {
            let Some(current) = dir else { break };
            if let Err(err) = p.backend.remove_dir(current) {
                debug!(dir = %current.display(), error = %err, "keeping directory");
                break;
            }
            dir = current.parent();
        }
        Ok(())
    }

    pub fn cost(&mut self) -> RemoteResult<u32> {
        Ok(self.prepared()?.backend.cost())
    }

    pub fn availability(&mut self) -> RemoteResult<Availability> {
        Ok(if self.prepared()?.backend.is_local() {
            Availability::Local
        } else {
            Availability::Global
        })
    }

    /// Human-readable location of `key` in the store.
    pub fn where_is(&mut self, key: &str) -> RemoteResult<String> {
        let p = self.prepared()?;
        let key = ContentKey::parse(key)?;
        let relative: PathBuf = key_path(&key);
        Ok(p.backend.locator(&p.layout.object_path(&key), &relative))
    }

    /// The active configuration, as field/value pairs.
    pub fn info(&self) -> Vec<(String, String)> {
        let (base, host) = match &self.state {
            State::Prepared(p) => (
                p.config.base_path.display().to_string(),
                p.backend.host().to_string(),
            ),
            State::Configured(config) => (
                config.base_path.display().to_string(),
                config.ssh_host.clone().unwrap_or_else(|| "local".into()),
            ),
            State::Unconfigured => return Vec::new(),
        };
        vec![("base path".into(), base), ("storage host".into(), host)]
    }
}

/// Settings accepted by `initremote` and `enableremote`.
pub fn config_settings() -> Vec<ConfigSetting> {
    vec![
        ConfigSetting::new(keys::BASE_PATH, "absolute path of the store on the storage host"),
        ConfigSetting::new(keys::SSH_HOST, "host to reach the store over SSH (0 for local access)"),
        ConfigSetting::new(keys::FORCE_WRITE, "write even if the store reports an unknown layout version"),
        ConfigSetting::new(keys::ARCHIVE_ID, "identifier of the repository in the store (set automatically)"),
        ConfigSetting::new(keys::ARCHIVE_TOOL, "7-Zip executable used to read the archive (default 7z)"),
        ConfigSetting::new(keys::CFGNAME, "name of the annex.ria-remote.<name> git config section to use"),
    ]
}

impl SpecialRemote for RiaRemote {
    type Error = RemoteError;

    fn init_remote(&mut self, annex: &mut dyn Annex) -> RemoteResult<()> {
        RiaRemote::init_remote(self, annex)
    }

    fn prepare(&mut self, annex: &mut dyn Annex) -> RemoteResult<()> {
        RiaRemote::prepare(self, annex)
    }

    fn transfer_store(&mut self, _: &mut dyn Annex, key: &str, file: &Path) -> RemoteResult<()> {
        self.store(key, file)
    }

    fn transfer_retrieve(&mut self, _: &mut dyn Annex, key: &str, file: &Path) -> RemoteResult<()> {
        self.retrieve(key, file)
    }

    fn check_present(&mut self, _: &mut dyn Annex, key: &str) -> RemoteResult<bool> {
        RiaRemote::check_present(self, key)
    }

    fn remove(&mut self, _: &mut dyn Annex, key: &str) -> RemoteResult<()> {
        RiaRemote::remove(self, key)
    }

    fn cost(&mut self, _: &mut dyn Annex) -> RemoteResult<u32> {
        RiaRemote::cost(self)
    }

    fn availability(&mut self, _: &mut dyn Annex) -> RemoteResult<Availability> {
        RiaRemote::availability(self)
    }

    fn where_is(&mut self, _: &mut dyn Annex, key: &str) -> RemoteResult<Option<String>> {
        RiaRemote::where_is(self, key).map(Some)
    }

    fn list_configs(&self) -> Vec<ConfigSetting> {
        config_settings()
    }

    fn info(&mut self, _: &mut dyn Annex) -> RemoteResult<Vec<(String, String)>> {
        Ok(RiaRemote::info(self))
    }
}

impl Drop for RiaRemote {
    fn drop(&mut self) {
        self.close();
    }
}
