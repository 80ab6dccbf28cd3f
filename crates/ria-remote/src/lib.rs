//! The RIA special remote.
//!
//! A RIA (remote indexed archive) store keeps the annexed objects of many
//! repositories below one base path, either on this machine or on a host
//! reachable over SSH:
//!
//! ```text
//! <base>/ria-layout-version
//! <base>/<id[0:3]>/<id[3:]>/ria-layout-version
//! <base>/<id[0:3]>/<id[3:]>/annex/objects/<bucket>/<key>/<key>
//! <base>/<id[0:3]>/<id[3:]>/archives/archive.7z
//! ```
//!
//! [`RiaRemote`] resolves its configuration from git config and the host,
//! selects a [`Backend`], runs the layout version gate, and then serves
//! store, retrieve, checkpresent, and remove requests. Objects missing from
//! the object tree are looked up in the archive.

pub mod backend;
pub mod config;
pub mod error;
pub mod gitconfig;
pub mod remote;

// Re-exports for convenience.
pub use backend::{Backend, LOCAL_COST, REMOTE_COST};
pub use config::{keys, RemoteConfig, SSH_HOST_DISABLED};
pub use error::{RemoteError, RemoteResult};
pub use gitconfig::{parse_bool, ConfigSource, GitConfig, MapConfig, DATASET_ID_KEY};
pub use remote::{config_settings, RiaRemote};

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::fs;
    use std::io::Cursor;
    use std::os::unix::fs::PermissionsExt;
    use std::path::{Path, PathBuf};
    use std::process::Command;

    use ria_gate::MarkerState;
    use ria_protocol::{Availability, Driver, StaticAnnex};
    use ria_ssh::LoopbackSessions;
    use ria_store::{key_path, StoreLayout};
    use ria_types::ContentKey;
    use tempfile::TempDir;
    use walkdir::WalkDir;

    const ID: &str = "8f2b1c9e-0d6a-11ea-8d71-362b9e155667";
    const KEY: &str = "MD5E-s8--7e55db001d319a94b0b713529a756623.txt";
    const PAYLOAD: &[u8] = b"payload!";

    /// Stand-in for 7z that reads tar archives.
    const FAKE_7Z: &str = r#"#!/bin/sh
case "$1" in
  l) tar -tf "$2" "$3" 2>/dev/null ;;
  x) tar -xOf "$3" "$4" ;;
  *) exit 2 ;;
esac
"#;

    struct Fixture {
        dir: TempDir,
        base: PathBuf,
        tool: PathBuf,
    }

    impl Fixture {
        fn new() -> Self {
            let dir = TempDir::new().unwrap();
            let tool = dir.path().join("fake-7z");
            fs::write(&tool, FAKE_7Z).unwrap();
            fs::set_permissions(&tool, fs::Permissions::from_mode(0o755)).unwrap();
            let base = dir.path().join("store");
            Self { dir, base, tool }
        }

        /// Host configuration of an initialized remote.
        fn annex(&self, ssh_host: Option<&str>) -> StaticAnnex {
            let annex = StaticAnnex::new("uuid-1", self.dir.path().join("repo/.git"))
                .with_config("name", "store")
                .with_config("base-path", &self.base.to_string_lossy())
                .with_config("archive-id", ID)
                .with_config("archive-tool", &self.tool.to_string_lossy());
            match ssh_host {
                Some(host) => annex.with_config("ssh-host", host),
                None => annex,
            }
        }

        fn file(&self, name: &str, content: &[u8]) -> PathBuf {
            let path = self.dir.path().join(name);
            fs::write(&path, content).unwrap();
            path
        }

        fn layout(&self) -> StoreLayout {
            StoreLayout::locate(&self.base, &ria_types::RepositoryId::parse(ID).unwrap())
        }

        fn object(&self) -> PathBuf {
            self.layout().object_path(&key())
        }

        fn seed(&self, path: PathBuf, content: &str) {
            fs::create_dir_all(path.parent().unwrap()).unwrap();
            fs::write(path, content).unwrap();
        }

        /// Put the object of `KEY` into the repository's archive only.
        fn archive_object(&self, content: &[u8]) {
            let scratch = self.dir.path().join("scratch");
            let member = key_path(&key());
            self.seed(scratch.join(&member), std::str::from_utf8(content).unwrap());
            let archive = self.layout().archive_path;
            fs::create_dir_all(archive.parent().unwrap()).unwrap();
            let status = Command::new("tar")
                .arg("-cf")
                .arg(&archive)
                .arg("-C")
                .arg(&scratch)
                .arg(&member)
                .status()
                .unwrap();
            assert!(status.success());
        }
    }

    fn key() -> ContentKey {
        ContentKey::parse(KEY).unwrap()
    }

    fn remote() -> RiaRemote {
        RiaRemote::new(Box::new(MapConfig::new()), Box::new(LoopbackSessions))
    }

    fn prepared(annex: &mut StaticAnnex) -> RiaRemote {
        let mut remote = remote();
        remote.prepare(annex).unwrap();
        remote
    }

    /// Every file below `root` with its content.
    fn snapshot(root: &Path) -> Vec<(PathBuf, Vec<u8>)> {
        WalkDir::new(root)
            .sort_by_file_name()
            .into_iter()
            .filter_map(Result::ok)
            .filter(|e| e.file_type().is_file())
            .map(|e| (e.path().to_path_buf(), fs::read(e.path()).unwrap()))
            .collect()
    }

    // -----------------------------------------------------------------------
    // 1. Store then retrieve yields the same bytes, for both backends
    // -----------------------------------------------------------------------
    #[test]
    fn roundtrip_on_both_backends() {
        for host in [None, Some("localhost")] {
            let fx = Fixture::new();
            let mut annex = fx.annex(host);
            let mut remote = prepared(&mut annex);
            let src = fx.file("src", PAYLOAD);

            remote.store(KEY, &src).unwrap();
            assert_eq!(fs::read(fx.object()).unwrap(), PAYLOAD);
            assert!(remote.check_present(KEY).unwrap());

            let dst = fx.dir.path().join("dst");
            remote.retrieve(KEY, &dst).unwrap();
            assert_eq!(fs::read(&dst).unwrap(), PAYLOAD);

            // The staging area is left empty.
            let staging = fx.layout().staging_dir("uuid-1");
            assert!(snapshot(&staging).is_empty(), "{host:?}");
            remote.close();
        }
    }

    // -----------------------------------------------------------------------
    // 2. Cost, availability and whereis depend on the backend
    // -----------------------------------------------------------------------
    #[test]
    fn backend_specific_answers() {
        let fx = Fixture::new();
        let mut local = prepared(&mut fx.annex(None));
        assert_eq!(local.cost().unwrap(), LOCAL_COST);
        assert_eq!(local.availability().unwrap(), Availability::Local);
        assert_eq!(
            local.where_is(KEY).unwrap(),
            format!("297/61b/{KEY}/{KEY}")
        );

        let mut remote = prepared(&mut fx.annex(Some("localhost")));
        assert_eq!(remote.cost().unwrap(), REMOTE_COST);
        assert_eq!(remote.availability().unwrap(), Availability::Global);
        assert_eq!(
            remote.where_is(KEY).unwrap(),
            format!("localhost:{}", ria_ssh::quote_path(&fx.object()))
        );
        assert_eq!(remote.info()[1], ("storage host".to_string(), "localhost".to_string()));
    }

    // -----------------------------------------------------------------------
    // 3. Removing twice succeeds and cleans up two directory levels
    // -----------------------------------------------------------------------
    #[test]
    fn remove_is_idempotent() {
        let fx = Fixture::new();
        let mut annex = fx.annex(None);
        let mut remote = prepared(&mut annex);
        remote.store(KEY, &fx.file("src", PAYLOAD)).unwrap();

        remote.remove(KEY).unwrap();
        remote.remove(KEY).unwrap();
        assert!(!remote.check_present(KEY).unwrap());

        let object = fx.object();
        let key_dir = object.parent().unwrap();
        let bucket = key_dir.parent().unwrap();
        assert!(!key_dir.exists());
        assert!(!bucket.exists());
        assert!(bucket.parent().unwrap().is_dir());
    }

    #[test]
    fn remove_keeps_shared_directories() {
        let fx = Fixture::new();
        let mut annex = fx.annex(None);
        let mut remote = prepared(&mut annex);
        remote.store(KEY, &fx.file("src", PAYLOAD)).unwrap();
        let object = fx.object();
        let sibling = object.parent().unwrap().join("other");
        fs::write(&sibling, b"x").unwrap();

        remote.remove(KEY).unwrap();
        assert!(!object.exists());
        assert!(sibling.exists());
    }

    // -----------------------------------------------------------------------
    // 4. Unknown layout version makes writes fail and leaves the tree alone
    // -----------------------------------------------------------------------
    #[test]
    fn read_only_store_rejects_writes() {
        for host in [None, Some("localhost")] {
            let fx = Fixture::new();
            let layout = fx.layout();
            fx.seed(layout.dataset_tree_marker(), "1\n");
            fx.seed(layout.object_tree_marker(), "2\n");
            fx.seed(fx.object(), "payload!");
            let mut annex = fx.annex(host);
            let mut remote = prepared(&mut annex);
            assert!(remote.read_only());
            assert!(annex
                .messages
                .iter()
                .any(|m| m.starts_with("Remote object tree reports version 2")));

            let before = snapshot(&fx.base);
            let src = fx.file("src", b"changed!");
            assert!(matches!(remote.store(KEY, &src), Err(RemoteError::ReadOnly)));
            assert!(matches!(remote.remove(KEY), Err(RemoteError::ReadOnly)));
            assert_eq!(snapshot(&fx.base), before);

            // Reads still work.
            assert!(remote.check_present(KEY).unwrap());
        }
    }

    // -----------------------------------------------------------------------
    // 5. Force-write keeps an unknown layout writable
    // -----------------------------------------------------------------------
    #[test]
    fn force_write_overrides_read_only() {
        let fx = Fixture::new();
        let layout = fx.layout();
        fx.seed(layout.dataset_tree_marker(), "1\n");
        fx.seed(layout.object_tree_marker(), "2\n");
        let mut annex = fx.annex(None).with_config("force-write", "true");
        let mut remote = prepared(&mut annex);
        assert!(!remote.read_only());
        assert!(annex.messages.iter().any(|m| m == "Was instructed to force write"));

        remote.store(KEY, &fx.file("src", PAYLOAD)).unwrap();
        let dst = fx.dir.path().join("dst");
        remote.retrieve(KEY, &dst).unwrap();
        assert_eq!(fs::read(dst).unwrap(), PAYLOAD);
    }

    // -----------------------------------------------------------------------
    // 6. Objects only in the archive are present and retrievable
    // -----------------------------------------------------------------------
    #[test]
    fn archive_fallback() {
        for host in [None, Some("localhost")] {
            let fx = Fixture::new();
            let mut annex = fx.annex(host);
            let mut remote = prepared(&mut annex);
            fx.archive_object(PAYLOAD);
            assert!(!fx.object().exists());

            assert!(remote.check_present(KEY).unwrap(), "{host:?}");
            let dst = fx.dir.path().join("dst");
            remote.retrieve(KEY, &dst).unwrap();
            assert_eq!(fs::read(&dst).unwrap(), PAYLOAD);
        }
    }

    #[test]
    fn missing_object_names_both_causes() {
        for host in [None, Some("localhost")] {
            let fx = Fixture::new();
            let mut annex = fx.annex(host);
            let mut remote = prepared(&mut annex);
            assert!(!remote.check_present(KEY).unwrap());
            match remote.retrieve(KEY, &fx.dir.path().join("dst")) {
                Err(RemoteError::Retrieve { key, object, archive }) => {
                    assert_eq!(key, KEY);
                    assert!(object.is_not_found(), "{object}");
                    assert!(archive.is_not_found(), "{archive}");
                }
                other => panic!("expected retrieve error, got {other:?}"),
            }
        }
    }

    // -----------------------------------------------------------------------
    // 7. An occupied staging slot fails the second writer
    // -----------------------------------------------------------------------
    #[test]
    fn staging_conflict_keeps_first_writer() {
        let fx = Fixture::new();
        let mut annex = fx.annex(None);
        let mut remote = prepared(&mut annex);
        let staging = fx.layout().staging_path("uuid-1", &key());
        // First transfer is still writing.
        fx.seed(staging.clone(), "first!!!");

        match remote.store(KEY, &fx.file("src", PAYLOAD)) {
            Err(RemoteError::StagingConflict { key, staging: path }) => {
                assert_eq!(key, KEY);
                assert_eq!(path, staging);
            }
            other => panic!("expected staging conflict, got {other:?}"),
        }
        assert_eq!(fs::read(&staging).unwrap(), b"first!!!");
        assert!(!fx.object().exists());

        // First transfer completes.
        fs::rename(&staging, fx.object()).unwrap();
        let dst = fx.dir.path().join("dst");
        remote.retrieve(KEY, &dst).unwrap();
        assert_eq!(fs::read(dst).unwrap(), b"first!!!");
    }

    // -----------------------------------------------------------------------
    // 8. An empty base path is claimed on the first prepare
    // -----------------------------------------------------------------------
    #[test]
    fn fresh_store_is_bootstrapped() {
        let fx = Fixture::new();
        let mut annex = fx.annex(None);
        let remote = prepared(&mut annex);
        let layout = fx.layout();
        assert_eq!(fs::read_to_string(layout.dataset_tree_marker()).unwrap(), "1\n");
        assert_eq!(fs::read_to_string(layout.object_tree_marker()).unwrap(), "1\n");
        let report = remote.gate_report().unwrap();
        assert!(report.bootstrapped());
        assert_eq!(report.object_tree, MarkerState::Claimed);
        assert!(!remote.read_only());
        assert!(annex.messages.is_empty());
    }

    // -----------------------------------------------------------------------
    // 9. Data operations require prepare
    // -----------------------------------------------------------------------
    #[test]
    fn unprepared_remote_refuses_work() {
        let fx = Fixture::new();
        let mut remote = remote();
        let src = fx.file("src", PAYLOAD);
        assert!(matches!(remote.store(KEY, &src), Err(RemoteError::NotPrepared)));
        assert!(matches!(remote.retrieve(KEY, &src), Err(RemoteError::NotPrepared)));
        assert!(matches!(remote.check_present(KEY), Err(RemoteError::NotPrepared)));
        assert!(matches!(remote.remove(KEY), Err(RemoteError::NotPrepared)));
        assert!(matches!(remote.cost(), Err(RemoteError::NotPrepared)));
        assert!(remote.info().is_empty());
    }

    #[test]
    fn prepare_without_archive_id_fails() {
        let fx = Fixture::new();
        let mut annex = fx.annex(None);
        annex.config.remove("archive-id");
        let err = remote().prepare(&mut annex).unwrap_err();
        assert!(err.to_string().contains("No archive ID configured"));
        assert!(!fx.base.exists());
    }

    #[test]
    fn invalid_keys_are_rejected() {
        let fx = Fixture::new();
        let mut annex = fx.annex(None);
        let mut remote = prepared(&mut annex);
        assert!(matches!(remote.check_present("../x"), Err(RemoteError::Invalid(_))));
    }

    // -----------------------------------------------------------------------
    // 10. initremote records an archive id
    // -----------------------------------------------------------------------
    #[test]
    fn initremote_prefers_dataset_id() {
        let fx = Fixture::new();
        let mut annex = fx.annex(None);
        annex.config.remove("archive-id");
        let mut remote = RiaRemote::new(
            Box::new(MapConfig::new().with(DATASET_ID_KEY, ID)),
            Box::new(LoopbackSessions),
        );
        remote.init_remote(&mut annex).unwrap();
        assert_eq!(annex.config["archive-id"], ID);
        assert_eq!(remote.config().unwrap().archive_id.as_ref().unwrap().as_str(), ID);
    }

    #[test]
    fn initremote_falls_back_to_uuid_and_keeps_existing_id() {
        let fx = Fixture::new();
        let mut annex = fx.annex(None);
        annex.config.remove("archive-id");
        remote().init_remote(&mut annex).unwrap();
        assert_eq!(annex.config["archive-id"], "uuid-1");

        let mut annex = fx.annex(None);
        remote().init_remote(&mut annex).unwrap();
        assert_eq!(annex.config["archive-id"], ID);
    }

    #[test]
    fn initremote_requires_base_path() {
        let mut annex = StaticAnnex::new("uuid-1", "/repo/.git");
        let err = remote().init_remote(&mut annex).unwrap_err();
        assert!(matches!(err, RemoteError::Config(_)));
        assert!(!annex.config.contains_key("archive-id"));
    }

    // -----------------------------------------------------------------------
    // 11. Preparing again replaces the backend
    // -----------------------------------------------------------------------
    #[test]
    fn prepare_can_be_repeated() {
        let fx = Fixture::new();
        let mut remote = prepared(&mut fx.annex(Some("localhost")));
        remote.prepare(&mut fx.annex(None)).unwrap();
        assert_eq!(remote.cost().unwrap(), LOCAL_COST);
        remote.close();
        assert!(matches!(remote.cost(), Err(RemoteError::NotPrepared)));
        assert!(remote.config().is_some());
    }

    #[test]
    fn configuration_serializes() {
        let fx = Fixture::new();
        let remote = prepared(&mut fx.annex(None));
        let json = serde_json::to_value(remote.config().unwrap()).unwrap();
        assert_eq!(json["archive_id"], ID);
        assert_eq!(json["ssh_host"], serde_json::Value::Null);
        let report = serde_json::to_value(remote.gate_report().unwrap()).unwrap();
        assert_eq!(report["dataset_tree"]["state"], "claimed");
        assert_eq!(config_settings().len(), 6);
    }

    // -----------------------------------------------------------------------
    // 12. A whole host session through the protocol driver
    // -----------------------------------------------------------------------
    #[test]
    fn protocol_session() {
        let fx = Fixture::new();
        let src = fx.file("src", PAYLOAD);
        let dst = fx.dir.path().join("dst");
        let git = MapConfig::new()
            .with("annex.ria-remote.store.base-path", &fx.base.to_string_lossy())
            .with("annex.ria-remote.store.archive-tool", &fx.tool.to_string_lossy());
        let input = format!(
            "\
EXTENSIONS INFO
PREPARE
VALUE {git_dir}
VALUE uuid-1
VALUE
VALUE store
VALUE
VALUE
VALUE {ID}
TRANSFER STORE {KEY} {src}
CHECKPRESENT {KEY}
TRANSFER RETRIEVE {KEY} {dst}
WHEREIS {KEY}
GETCOST
GETAVAILABILITY
REMOVE {KEY}
CHECKPRESENT {KEY}
",
            git_dir = fx.dir.path().join("repo/.git").display(),
            src = src.display(),
            dst = dst.display(),
        );

        let mut remote = RiaRemote::new(Box::new(git), Box::new(LoopbackSessions));
        let mut driver = Driver::new(Cursor::new(input.into_bytes()), Vec::new());
        driver.run(&mut remote).unwrap();
        let out = String::from_utf8(driver.into_inner().1).unwrap();
        let out: Vec<&str> = out.lines().collect();

        assert_eq!(
            out,
            vec![
                "VERSION 1".to_string(),
                "EXTENSIONS INFO".into(),
                "GETGITDIR".into(),
                "GETUUID".into(),
                "GETCONFIG cfgname".into(),
                "GETCONFIG name".into(),
                "GETCONFIG ssh-host".into(),
                "GETCONFIG force-write".into(),
                "GETCONFIG archive-id".into(),
                "PREPARE-SUCCESS".into(),
                format!("TRANSFER-SUCCESS STORE {KEY}"),
                format!("CHECKPRESENT-SUCCESS {KEY}"),
                format!("TRANSFER-SUCCESS RETRIEVE {KEY}"),
                format!("WHEREIS-SUCCESS 297/61b/{KEY}/{KEY}"),
                "COST 100".into(),
                "AVAILABILITY LOCAL".into(),
                format!("REMOVE-SUCCESS {KEY}"),
                format!("CHECKPRESENT-FAILURE {KEY}"),
            ]
        );
        assert_eq!(fs::read(dst).unwrap(), PAYLOAD);
    }

    // -----------------------------------------------------------------------
    // 13. A failed upload or commit leaves neither staging file nor object
    // -----------------------------------------------------------------------
    #[test]
    fn failed_rename_cleans_up_staging() {
        for host in [None, Some("localhost")] {
            let fx = Fixture::new();
            let mut annex = fx.annex(host);
            let mut remote = prepared(&mut annex);
            // A non-empty directory where the object should go.
            let blocker = fx.object().join(KEY).join("keep");
            fx.seed(blocker.clone(), "keep");

            match remote.store(KEY, &fx.file("src", PAYLOAD)) {
                Err(RemoteError::Store(err)) => assert!(!err.is_not_found(), "{host:?}: {err}"),
                other => panic!("expected store error, got {other:?}"),
            }
            let staging = fx.layout().staging_dir("uuid-1");
            assert!(snapshot(&staging).is_empty(), "{host:?}");
            assert!(fx.object().is_dir());
            assert_eq!(fs::read(&blocker).unwrap(), b"keep");

            // The backend is still usable once the obstruction is gone.
            fs::remove_dir_all(fx.object()).unwrap();
            remote.store(KEY, &fx.file("src", PAYLOAD)).unwrap();
            assert_eq!(fs::read(fx.object()).unwrap(), PAYLOAD);
            remote.close();
        }
    }

    #[test]
    fn failed_upload_stores_nothing() {
        for host in [None, Some("localhost")] {
            let fx = Fixture::new();
            let mut annex = fx.annex(host);
            let mut remote = prepared(&mut annex);
            let missing = fx.dir.path().join("no-such-source");

            let err = remote.store(KEY, &missing).unwrap_err();
            assert!(matches!(err, RemoteError::Store(_)), "{host:?}: {err:?}");
            assert!(snapshot(&fx.layout().staging_dir("uuid-1")).is_empty());
            assert!(!fx.object().exists());
            assert!(!remote.check_present(KEY).unwrap());
            remote.close();
        }
    }
}
