use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;
use std::process::{Child, ChildStdin, ChildStdout, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use ria_store::archive::listing_contains;
use ria_store::{ArchiveTool, IoBackend, StoreError, StoreResult};
use tracing::{debug, warn};

use crate::error::{SshError, SshResult};
use crate::quote::{quote_path, sh_quote};
use crate::session::{Session, SessionProvider};
use crate::shell::ShellChannel;

/// Grace period for the shell to leave after `exit`.
const EXIT_GRACE: Duration = Duration::from_millis(500);
const EXIT_POLL: Duration = Duration::from_millis(10);

type Channel = ShellChannel<BufReader<ChildStdout>, ChildStdin>;

struct ShellProcess {
    child: Child,
    channel: Channel,
}

/// Store access through one persistent shell on a remote host.
///
/// Short text commands go through the shared shell with the sentinel
/// protocol. Object retrieval with a known size streams `cat` output through
/// the same shell and reads exactly that many bytes; without a known size it
/// falls back to the session's file transfer.
///
/// The shell and the session are owned by this value and released by
/// [`SshRemoteIo::close`], or on drop.
pub struct SshRemoteIo {
    session: Box<dyn Session>,
    shell: Option<ShellProcess>,
    archive: ArchiveTool,
    closed: bool,
}

impl SshRemoteIo {
    /// Connect to `host` and start the shared shell.
    pub fn connect(
        sessions: &dyn SessionProvider,
        host: &str,
        archive: ArchiveTool,
    ) -> SshResult<Self> {
        let session = sessions.connect(host)?;
        let mut io = Self {
            session,
            shell: None,
            archive,
            closed: false,
        };
        io.shell = Some(io.spawn_shell()?);
        debug!(host, "remote shell ready");
        Ok(io)
    }

    /// The host this backend talks to.
    pub fn host(&self) -> &str {
        self.session.host()
    }

    /// `host:path` locator for human display.
    pub fn locator(&self, path: &Path) -> String {
        format!("{}:{}", self.host(), quote_path(path))
    }

    /// Leave the shell, then release the session. Idempotent.
    pub fn close(&mut self) -> SshResult<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        if let Some(shell) = self.shell.take() {
            stop_shell(shell);
        }
        self.session.close()
    }

    fn spawn_shell(&mut self) -> SshResult<ShellProcess> {
        let mut child = self
            .session
            .shell_command()
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| SshError::transport("starting remote shell", e))?;
        let (Some(stdin), Some(stdout)) = (child.stdin.take(), child.stdout.take()) else {
            let _ = child.kill();
            let _ = child.wait();
            return Err(SshError::Transport("remote shell has no pipes".into()));
        };
        let mut shell = ShellProcess {
            child,
            channel: ShellChannel::new(BufReader::new(stdout), stdin),
        };
        if let Err(err) = shell.channel.skip_banner() {
            stop_shell(shell);
            return Err(err);
        }
        Ok(shell)
    }

    fn channel(&mut self) -> SshResult<&mut Channel> {
        match self.shell.as_mut() {
            Some(shell) => Ok(&mut shell.channel),
            None => Err(SshError::Transport(format!(
                "remote shell to {} is closed",
                self.session.host()
            ))),
        }
    }

    fn run(&mut self, cmd: &str) -> SshResult<String> {
        self.channel()?.run(cmd)
    }

    /// Run a command whose failure on a missing `path` means NotFound.
    fn run_on(&mut self, cmd: &str, path: &Path) -> StoreResult<String> {
        match self.run(cmd) {
            Ok(out) => Ok(out),
            Err(err) if err.is_command_failure() => {
                if self.exists(path)? {
                    Err(err.into())
                } else {
                    Err(StoreError::NotFound(path.to_path_buf()))
                }
            }
            Err(err) => Err(err.into()),
        }
    }

    /// Byte size of a remote file.
    fn remote_size(&mut self, path: &Path) -> StoreResult<u64> {
        let out = self.run_on(&format!("wc -c < {}", quote_path(path)), path)?;
        out.trim().parse().map_err(|_| StoreError::CommandFailed {
            command: format!("wc -c < {}", quote_path(path)),
            output: out.trim().to_string(),
        })
    }

    /// Stream exactly `size` bytes printed by `cmd` into `local_dst`,
    /// removing the partial file on failure.
    fn stream_to_file(&mut self, cmd: &str, size: u64, local_dst: &Path) -> StoreResult<()> {
        let file = File::create(local_dst).map_err(|e| StoreError::io("create", local_dst, e))?;
        let mut writer = BufWriter::new(file);
        let result = self
            .channel()
            .and_then(|ch| ch.stream_exact(cmd, size, &mut writer))
            .map_err(StoreError::from)
            .and_then(|()| {
                writer
                    .flush()
                    .map_err(|e| StoreError::io("write", local_dst, e))
            });
        if result.is_err() {
            drop(writer);
            let _ = fs::remove_file(local_dst);
        }
        result
    }

    /// Byte size of an archive member, counted by extracting it.
    fn member_size(&mut self, extract_cmd: &str) -> StoreResult<u64> {
        let cmd = format!("{extract_cmd} 2>/dev/null | wc -c");
        let out = self.run(&cmd)?;
        out.trim().parse().map_err(|_| StoreError::CommandFailed {
            command: cmd,
            output: out.trim().to_string(),
        })
    }

    fn archive_cmd(&self, args: Vec<std::ffi::OsString>) -> String {
        let mut cmd = sh_quote(self.archive.program());
        for arg in args {
            cmd.push(' ');
            cmd.push_str(&sh_quote(&arg.to_string_lossy()));
        }
        cmd
    }
}

fn stop_shell(mut shell: ShellProcess) {
    if let Err(err) = shell.channel.send_line("exit") {
        debug!(error = %err, "shell did not take exit");
    }
    let deadline = Instant::now() + EXIT_GRACE;
    loop {
        match shell.child.try_wait() {
            Ok(Some(status)) => {
                debug!(%status, "remote shell exited");
                return;
            }
            Ok(None) if Instant::now() < deadline => thread::sleep(EXIT_POLL),
            _ => break,
        }
    }
    warn!("remote shell did not exit in time, killing it");
    let _ = shell.child.kill();
    let _ = shell.child.wait();
}

impl Drop for SshRemoteIo {
    fn drop(&mut self) {
        if let Err(err) = self.close() {
            warn!(error = %err, "closing remote shell backend");
        }
    }
}

impl IoBackend for SshRemoteIo {
    fn mkdir(&mut self, path: &Path) -> StoreResult<()> {
        self.run(&format!("mkdir -p {}", quote_path(path)))?;
        Ok(())
    }

    fn put(&mut self, local_src: &Path, dst: &Path) -> StoreResult<()> {
        debug!(src = %local_src.display(), dst = %dst.display(), "upload");
        self.session.upload(local_src, dst)?;
        Ok(())
    }

    fn get(&mut self, src: &Path, local_dst: &Path, expected_size: Option<u64>) -> StoreResult<()> {
        let Some(size) = expected_size else {
            debug!(src = %src.display(), "size unknown, downloading over the session");
            let Err(err) = self.session.download(src, local_dst) else {
                return Ok(());
            };
            if self.exists(src)? {
                return Err(err.into());
            }
            debug!(error = %err, "download of missing file");
            return Err(StoreError::NotFound(src.to_path_buf()));
        };
        // A short file would leave the reader waiting forever.
        let actual = self.remote_size(src)?;
        if actual != size {
            return Err(StoreError::SizeMismatch {
                path: src.to_path_buf(),
                expected: size,
                actual,
            });
        }
        self.stream_to_file(&format!("cat {}", quote_path(src)), size, local_dst)
    }

    fn rename(&mut self, src: &Path, dst: &Path) -> StoreResult<()> {
        self.run_on(&format!("mv {} {}", quote_path(src), quote_path(dst)), src)?;
        Ok(())
    }

    fn remove(&mut self, path: &Path) -> StoreResult<()> {
        self.run_on(&format!("rm {}", quote_path(path)), path)?;
        Ok(())
    }

    fn remove_dir(&mut self, path: &Path) -> StoreResult<()> {
        self.run_on(&format!("rmdir {}", quote_path(path)), path)?;
        Ok(())
    }

    fn exists(&mut self, path: &Path) -> StoreResult<bool> {
        match self.run(&format!("test -e {}", quote_path(path))) {
            Ok(_) => Ok(true),
            Err(err) if err.is_command_failure() => Ok(false),
            Err(err) => Err(err.into()),
        }
    }

    fn read_file(&mut self, path: &Path) -> StoreResult<String> {
        self.run_on(&format!("cat {}", quote_path(path)), path)
    }

    fn write_file(&mut self, path: &Path, content: &str) -> StoreResult<()> {
        let content = ria_store::traits::with_trailing_newline(content);
        self.run(&format!("printf '%s' {} > {}", sh_quote(&content), quote_path(path)))?;
        Ok(())
    }

    fn file_in_archive(&mut self, archive: &Path, member: &Path) -> StoreResult<bool> {
        // No separate probe for the archive: a missing one just fails here.
        let cmd = self.archive_cmd(self.archive.list_args(archive, member));
        match self.run(&cmd) {
            Ok(listing) => Ok(listing_contains(&listing, member)),
            Err(err) if err.is_command_failure() => Ok(false),
            Err(err) => Err(err.into()),
        }
    }

    fn read_from_archive(
        &mut self,
        archive: &Path,
        member: &Path,
        local_dst: &Path,
        expected_size: Option<u64>,
    ) -> StoreResult<()> {
        if !self.file_in_archive(archive, member)? {
            return Err(StoreError::NotFound(archive.join(member)));
        }
        let cmd = self.archive_cmd(self.archive.extract_args(archive, member));
        if let Some(size) = expected_size {
            // Same guard as `get`: the stream must be exactly `size` bytes.
            let actual = self.member_size(&cmd)?;
            if actual != size {
                return Err(StoreError::SizeMismatch {
                    path: archive.join(member),
                    expected: size,
                    actual,
                });
            }
            return self.stream_to_file(&format!("{cmd} 2>/dev/null"), size, local_dst);
        }

        debug!(archive = %archive.display(), member = %member.display(), "size unknown, extracting with a one-shot command");
        let dst = File::create(local_dst).map_err(|e| StoreError::io("create", local_dst, e))?;
        let result = self
            .session
            .exec_command(&cmd)
            .stdin(Stdio::null())
            .stdout(dst)
            .stderr(Stdio::piped())
            .output()
            .map_err(|e| StoreError::Transport(format!("running {cmd}: {e}")))
            .and_then(|output| {
                if output.status.success() {
                    Ok(())
                } else {
                    Err(StoreError::Archive {
                        archive: archive.to_path_buf(),
                        reason: String::from_utf8_lossy(&output.stderr).trim().to_string(),
                    })
                }
            });
        if result.is_err() {
            let _ = fs::remove_file(local_dst);
        }
        result
    }
}
