//! The remote shell micro-protocol.
//!
//! One interactive shell is reused for many commands. Shell output has no
//! framing of its own, so every command is sent as
//!
//! ```text
//! { <cmd> ; } 2>&1 && echo "ria-remote: end - ok" || echo "ria-remote: end - fail"
//! ```
//!
//! and the output is read line by line until one of the two sentinels shows
//! up. Lines are read as bytes and decoded lossily, so output that is not
//! UTF-8 still ends at its own sentinel. Binary payloads are read with [`ShellChannel::stream_exact`] instead,
//! which consumes a byte count known in advance and never looks for a
//! sentinel.

use std::io::{self, BufRead, Read, Write};

use tracing::trace;

use crate::error::{SshError, SshResult};

/// Sentinel line closing the output of a successful command.
pub const END_OK: &str = "ria-remote: end - ok";
/// Sentinel line closing the output of a failed command.
pub const END_FAIL: &str = "ria-remote: end - fail";
/// Marker echoed once after connecting, ending the login banner.
pub const LOGIN_END: &str = "RIA-REMOTE-LOGIN-END";

/// Command/response channel over a shell's stdin and stdout.
pub struct ShellChannel<R, W> {
    reader: R,
    writer: W,
}

impl<R: BufRead, W: Write> ShellChannel<R, W> {
    pub fn new(reader: R, writer: W) -> Self {
        Self { reader, writer }
    }

    /// Discard everything the shell printed at login.
    pub fn skip_banner(&mut self) -> SshResult<()> {
        self.send(&format!("echo {LOGIN_END}\n"))?;
        let mut line = Vec::new();
        loop {
            line.clear();
            if self.read_line(&mut line)? == 0 {
                return Err(SshError::Transport(
                    "shell closed before the login banner ended".into(),
                ));
            }
            let text = String::from_utf8_lossy(&line);
            if text.trim_end_matches(['\r', '\n']) == LOGIN_END {
                return Ok(());
            }
            trace!(line = text.trim_end(), "banner");
        }
    }

    /// Run `cmd` and return its combined stdout and stderr.
    ///
    /// A non-zero exit yields [`SshError::CommandFailed`] carrying that
    /// output as read. End of stream before a sentinel is a transport error.
    pub fn run(&mut self, cmd: &str) -> SshResult<String> {
        trace!(cmd, "shell run");
        self.send(&frame(cmd))?;
        let mut output = Vec::new();
        let mut line = Vec::new();
        loop {
            line.clear();
            if self.read_line(&mut line)? == 0 {
                return Err(SshError::Transport(format!(
                    "shell closed while running `{cmd}`"
                )));
            }
            let content = line.strip_suffix(b"\n").unwrap_or(&line[..]);
            // Output without a final newline runs into the sentinel.
            if let Some(rest) = content.strip_suffix(END_OK.as_bytes()) {
                output.extend_from_slice(rest);
                return Ok(String::from_utf8_lossy(&output).into_owned());
            }
            if let Some(rest) = content.strip_suffix(END_FAIL.as_bytes()) {
                output.extend_from_slice(rest);
                return Err(SshError::CommandFailed {
                    command: cmd.to_string(),
                    output: String::from_utf8_lossy(&output).into_owned(),
                });
            }
            output.extend_from_slice(&line);
        }
    }

    /// Send `cmd` unframed and copy exactly `size` bytes of its output
    /// into `dst`.
    ///
    /// The caller must know that `cmd` prints exactly `size` bytes; any
    /// surplus would be taken for the output of the next command.
    pub fn stream_exact(&mut self, cmd: &str, size: u64, dst: &mut dyn Write) -> SshResult<()> {
        trace!(cmd, size, "shell stream");
        self.send(&format!("{cmd}\n"))?;
        let copied = io::copy(&mut (&mut self.reader).take(size), dst)
            .map_err(|e| SshError::transport("reading from shell", e))?;
        if copied < size {
            return Err(SshError::Transport(format!(
                "shell output ended after {copied} of {size} bytes"
            )));
        }
        Ok(())
    }

    /// Send a raw line, e.g. `exit`.
    pub fn send_line(&mut self, line: &str) -> SshResult<()> {
        self.send(&format!("{line}\n"))
    }

    pub fn writer_mut(&mut self) -> &mut W {
        &mut self.writer
    }

    fn send(&mut self, text: &str) -> SshResult<()> {
        self.writer
            .write_all(text.as_bytes())
            .and_then(|()| self.writer.flush())
            .map_err(|e| SshError::transport("writing to shell", e))
    }

    fn read_line(&mut self, line: &mut Vec<u8>) -> SshResult<usize> {
        self.reader
            .read_until(b'\n', line)
            .map_err(|e| SshError::transport("reading from shell", e))
    }
}

/// Wrap a command so that its end and exit status show up on stdout.
pub fn frame(cmd: &str) -> String {
    format!("{{ {cmd} ; }} 2>&1 && echo \"{END_OK}\" || echo \"{END_FAIL}\"\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn channel(script: &str) -> ShellChannel<Cursor<Vec<u8>>, Vec<u8>> {
        ShellChannel::new(Cursor::new(script.as_bytes().to_vec()), Vec::new())
    }

    #[test]
    fn ok_sentinel_returns_output() {
        let mut ch = channel("hello\nworld\nria-remote: end - ok\n");
        assert_eq!(ch.run("printf x").unwrap(), "hello\nworld\n");
    }

    #[test]
    fn fail_sentinel_yields_command_failed_with_output() {
        let mut ch = channel("rmdir: failed to remove '/x': Directory not empty\nria-remote: end - fail\n");
        match ch.run("rmdir /x").unwrap_err() {
            SshError::CommandFailed { command, output } => {
                assert_eq!(command, "rmdir /x");
                assert_eq!(output, "rmdir: failed to remove '/x': Directory not empty\n");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn fail_output_keeps_trailing_whitespace() {
        let mut ch = channel("no such file  \n\nria-remote: end - fail\n");
        match ch.run("cat /x").unwrap_err() {
            SshError::CommandFailed { output, .. } => assert_eq!(output, "no such file  \n\n"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn invalid_utf8_output_keeps_commands_in_step() {
        let mut script = b"ok\n\xff\xfe\nria-remote: end - ok\n".to_vec();
        script.extend_from_slice(b"ria-remote: end - fail\n");
        let mut ch = ShellChannel::new(Cursor::new(script), Vec::new());
        assert_eq!(ch.run("cat /bin").unwrap(), "ok\n\u{fffd}\u{fffd}\n");
        assert!(matches!(
            ch.run("test -e /missing").unwrap_err(),
            SshError::CommandFailed { .. }
        ));
    }

    #[test]
    fn missing_sentinel_is_a_transport_error() {
        let mut ch = channel("partial output\n");
        assert!(matches!(ch.run("ls").unwrap_err(), SshError::Transport(_)));
    }

    #[test]
    fn sentinel_after_unterminated_output() {
        let mut ch = channel("1ria-remote: end - ok\n");
        assert_eq!(ch.run("cat marker").unwrap(), "1");
    }

    #[test]
    fn commands_are_framed() {
        let mut ch = channel("ria-remote: end - ok\n");
        ch.run("mkdir -p /a").unwrap();
        let sent = String::from_utf8(ch.writer_mut().clone()).unwrap();
        assert_eq!(
            sent,
            "{ mkdir -p /a ; } 2>&1 && echo \"ria-remote: end - ok\" || echo \"ria-remote: end - fail\"\n"
        );
    }

    #[test]
    fn banner_is_discarded() {
        let mut ch = channel("Welcome!\nLast login: never\nRIA-REMOTE-LOGIN-END\nok\nria-remote: end - ok\n");
        ch.skip_banner().unwrap();
        assert_eq!(ch.run("echo ok").unwrap(), "ok\n");
    }

    #[test]
    fn banner_without_marker_is_a_transport_error() {
        let mut ch = channel("Welcome!\n");
        assert!(matches!(ch.skip_banner().unwrap_err(), SshError::Transport(_)));
    }

    #[test]
    fn binary_stream_is_read_exactly() {
        // Payload containing a sentinel-looking line and no trailing newline,
        // followed by the next command's output.
        let payload = "ria-remote: end - fail\n\0\x01";
        let mut ch = channel(&format!("{payload}next\nria-remote: end - ok\n"));
        let mut out = Vec::new();
        ch.stream_exact("cat /obj", payload.len() as u64, &mut out).unwrap();
        assert_eq!(out, payload.as_bytes());
        assert_eq!(ch.run("echo next").unwrap(), "next\n");
    }

    #[test]
    fn short_stream_is_a_transport_error() {
        let mut ch = channel("abc");
        let mut out = Vec::new();
        let err = ch.stream_exact("cat /obj", 10, &mut out).unwrap_err();
        assert!(matches!(err, SshError::Transport(_)));
        assert_eq!(out, b"abc");
    }
}
