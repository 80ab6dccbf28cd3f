use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use tempfile::TempDir;
use tracing::{debug, warn};

use crate::error::{SshError, SshResult};
use crate::quote::quote_path;

/// Idle time after which a control master left behind by a killed process
/// exits on its own.
const CONTROL_PERSIST: &str = "15m";

/// A connection to one host, reused for every command and transfer.
pub trait Session {
    /// The host this session is connected to.
    fn host(&self) -> &str;

    /// Command starting an interactive shell on the host, reading commands
    /// from its stdin.
    fn shell_command(&self) -> Command;

    /// Command running `remote_cmd` once on the host.
    fn exec_command(&self, remote_cmd: &str) -> Command;

    /// Copy a local file to `remote` on the host.
    fn upload(&mut self, local: &Path, remote: &Path) -> SshResult<()>;

    /// Copy `remote` from the host to a local file.
    fn download(&mut self, remote: &Path, local: &Path) -> SshResult<()>;

    /// Release the connection. Further use of the session is an error.
    fn close(&mut self) -> SshResult<()>;
}

/// Opens sessions to hosts.
pub trait SessionProvider {
    fn connect(&self, host: &str) -> SshResult<Box<dyn Session>>;
}

// ---------------------------------------------------------------------------
// OpenSSH
// ---------------------------------------------------------------------------

/// Sessions backed by an OpenSSH control master.
///
/// Each session starts one master connection with its control socket in a
/// private temporary directory. The shell, one-shot commands and `scp`
/// transfers are all multiplexed over it, so authentication happens once.
#[derive(Clone, Debug)]
pub struct OpenSshSessions {
    ssh_program: String,
    scp_program: String,
    extra_args: Vec<String>,
}

impl OpenSshSessions {
    pub fn new() -> Self {
        Self {
            ssh_program: "ssh".into(),
            scp_program: "scp".into(),
            extra_args: Vec::new(),
        }
    }

    /// Additional options passed to every `ssh` and `scp` invocation,
    /// e.g. `["-p", "2222"]`.
    pub fn with_extra_args(mut self, args: Vec<String>) -> Self {
        self.extra_args = args;
        self
    }
}

impl Default for OpenSshSessions {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionProvider for OpenSshSessions {
    fn connect(&self, host: &str) -> SshResult<Box<dyn Session>> {
        let control_dir = tempfile::Builder::new()
            .prefix("ria-ssh-")
            .tempdir()
            .map_err(|e| SshError::Connect {
                host: host.into(),
                reason: format!("cannot create control socket directory: {e}"),
            })?;
        let socket = control_dir.path().join("ctl");
        debug!(host, socket = %socket.display(), "starting ssh control master");

        let output = Command::new(&self.ssh_program)
            .args(master_options(&socket))
            .args(&self.extra_args)
            .arg(host)
            .stdin(Stdio::null())
            .output()
            .map_err(|e| SshError::Connect {
                host: host.into(),
                reason: format!("cannot run {}: {e}", self.ssh_program),
            })?;
        if !output.status.success() {
            return Err(SshError::Connect {
                host: host.into(),
                reason: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        Ok(Box::new(OpenSshSession {
            host: host.to_string(),
            ssh_program: self.ssh_program.clone(),
            scp_program: self.scp_program.clone(),
            extra_args: self.extra_args.clone(),
            socket,
            control_dir: Some(control_dir),
        }))
    }
}

struct OpenSshSession {
    host: String,
    ssh_program: String,
    scp_program: String,
    extra_args: Vec<String>,
    socket: PathBuf,
    control_dir: Option<TempDir>,
}

impl OpenSshSession {
    fn ssh(&self) -> Command {
        let mut cmd = Command::new(&self.ssh_program);
        cmd.args(control_options(&self.socket)).args(&self.extra_args);
        cmd
    }

    fn scp(&self, op: &'static str, from: &str, to: &str) -> SshResult<()> {
        let output = Command::new(&self.scp_program)
            .args(control_options(&self.socket))
            .args(&self.extra_args)
            .args(["-q", "-B"])
            .arg(from)
            .arg(to)
            .stdin(Stdio::null())
            .output()
            .map_err(|e| SshError::transport(&format!("running {}", self.scp_program), e))?;
        if output.status.success() {
            Ok(())
        } else {
            Err(SshError::Transfer {
                op,
                path: from.to_string(),
                reason: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            })
        }
    }

}

impl Session for OpenSshSession {
    fn host(&self) -> &str {
        &self.host
    }

    fn shell_command(&self) -> Command {
        let mut cmd = self.ssh();
        cmd.arg("-T").arg(&self.host);
        cmd
    }

    fn exec_command(&self, remote_cmd: &str) -> Command {
        let mut cmd = self.ssh();
        cmd.arg(&self.host).arg(remote_cmd);
        cmd
    }

    fn upload(&mut self, local: &Path, remote: &Path) -> SshResult<()> {
        let to = remote_spec(&self.host, remote);
        self.scp("upload", &local.to_string_lossy(), &to)
    }

    fn download(&mut self, remote: &Path, local: &Path) -> SshResult<()> {
        let from = remote_spec(&self.host, remote);
        self.scp("download", &from, &local.to_string_lossy())
    }

    fn close(&mut self) -> SshResult<()> {
        let Some(control_dir) = self.control_dir.take() else {
            return Ok(());
        };
        debug!(host = %self.host, "stopping ssh control master");
        let status = self
            .ssh()
            .args(["-O", "exit"])
            .arg(&self.host)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .map_err(|e| SshError::transport("stopping control master", e));
        drop(control_dir);
        match status {
            Ok(status) if status.success() => Ok(()),
            Ok(status) => Err(SshError::Transport(format!(
                "control master for {} did not stop: {status}",
                self.host
            ))),
            Err(err) => Err(err),
        }
    }
}

impl Drop for OpenSshSession {
    fn drop(&mut self) {
        if let Err(err) = self.close() {
            warn!(host = %self.host, error = %err, "closing ssh session");
        }
    }
}

fn control_options(socket: &Path) -> [String; 2] {
    ["-o".to_string(), format!("ControlPath={}", socket.display())]
}

fn master_options(socket: &Path) -> Vec<String> {
    let mut args = control_options(socket).to_vec();
    args.extend(["-o", "ControlMaster=yes", "-o"].map(String::from));
    args.push(format!("ControlPersist={CONTROL_PERSIST}"));
    args.extend(["-f", "-N"].map(String::from));
    args
}

/// `host:path` operand for scp. The remote side hands the path to a shell.
fn remote_spec(host: &str, path: &Path) -> String {
    format!("{host}:{}", quote_path(path))
}

// ---------------------------------------------------------------------------
// Loopback
// ---------------------------------------------------------------------------

/// Sessions that run everything on the local machine with `sh`.
///
/// Speaks exactly what a remote host would, so the remote-shell backend
/// can be exercised without an SSH server.
#[derive(Clone, Copy, Debug, Default)]
pub struct LoopbackSessions;

impl SessionProvider for LoopbackSessions {
    fn connect(&self, host: &str) -> SshResult<Box<dyn Session>> {
        Ok(Box::new(LoopbackSession {
            host: host.to_string(),
            closed: false,
        }))
    }
}

struct LoopbackSession {
    host: String,
    closed: bool,
}

impl LoopbackSession {
    fn copy(&self, op: &'static str, from: &Path, to: &Path) -> SshResult<()> {
        if self.closed {
            return Err(SshError::Transport(format!("session to {} is closed", self.host)));
        }
        fs::copy(from, to).map(|_| ()).map_err(|e| SshError::Transfer {
            op,
            path: from.display().to_string(),
            reason: e.to_string(),
        })
    }
}

impl Session for LoopbackSession {
    fn host(&self) -> &str {
        &self.host
    }

    fn shell_command(&self) -> Command {
        Command::new("sh")
    }

    fn exec_command(&self, remote_cmd: &str) -> Command {
        let mut cmd = Command::new("sh");
        cmd.arg("-c").arg(remote_cmd);
        cmd
    }

    fn upload(&mut self, local: &Path, remote: &Path) -> SshResult<()> {
        self.copy("upload", local, remote)
    }

    fn download(&mut self, remote: &Path, local: &Path) -> SshResult<()> {
        self.copy("download", remote, local)
    }

    fn close(&mut self) -> SshResult<()> {
        self.closed = true;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn loopback_transfers_files() {
        let dir = TempDir::new().unwrap();
        let mut session = LoopbackSessions.connect("localhost").unwrap();
        assert_eq!(session.host(), "localhost");
        let src = dir.path().join("src");
        fs::write(&src, b"data").unwrap();
        session.upload(&src, &dir.path().join("remote")).unwrap();
        session
            .download(&dir.path().join("remote"), &dir.path().join("back"))
            .unwrap();
        assert_eq!(fs::read(dir.path().join("back")).unwrap(), b"data");
    }

    #[test]
    fn loopback_exec_runs_through_sh() {
        let session = LoopbackSessions.connect("localhost").unwrap();
        let out = session.exec_command("echo $((1 + 2))").output().unwrap();
        assert!(out.status.success());
        assert_eq!(String::from_utf8_lossy(&out.stdout), "3\n");
    }

    #[test]
    fn closed_loopback_refuses_transfers() {
        let dir = TempDir::new().unwrap();
        let mut session = LoopbackSessions.connect("localhost").unwrap();
        session.close().unwrap();
        let src = dir.path().join("src");
        fs::write(&src, b"data").unwrap();
        let err = session.upload(&src, &dir.path().join("dst")).unwrap_err();
        assert!(matches!(err, SshError::Transport(_)));
    }

    #[test]
    fn control_master_does_not_outlive_its_idle_timeout() {
        let args = master_options(Path::new("/tmp/ria-ssh-x/ctl"));
        assert_eq!(args[..2], ["-o", "ControlPath=/tmp/ria-ssh-x/ctl"]);
        assert!(args.iter().any(|a| a == "ControlPersist=15m"));
        assert!(!args.iter().any(|a| a == "ControlPersist=yes"));
        assert!(args.iter().any(|a| a == "-N"));
    }

    #[test]
    fn scp_operands_are_quoted_for_the_remote_shell() {
        assert_eq!(
            remote_spec("store.example.org", Path::new("/data/ria store/x")),
            "store.example.org:'/data/ria store/x'"
        );
        assert_eq!(
            remote_spec("store.example.org", Path::new("/data/store/x")),
            "store.example.org:/data/store/x"
        );
    }

    #[test]
    fn unreachable_ssh_program_is_a_connect_error() {
        let sessions = OpenSshSessions {
            ssh_program: "/nonexistent/ssh".into(),
            ..OpenSshSessions::new()
        };
        match sessions.connect("example.org") {
            Err(SshError::Connect { host, .. }) => assert_eq!(host, "example.org"),
            Err(other) => panic!("unexpected error: {other}"),
            Ok(_) => panic!("connected without ssh"),
        }
    }
}
