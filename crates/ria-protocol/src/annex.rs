use std::collections::HashMap;
use std::io::{BufRead, Write};
use std::path::PathBuf;

use tracing::trace;

use crate::codec::{decode_value, encode_reply};
use crate::error::{ProtocolError, ProtocolResult};
use crate::message::{extensions, Reply};

/// Services the host offers to a special remote while it handles a request.
pub trait Annex {
    /// The remote's persisted setting `name`; `None` when unset or empty.
    fn get_config(&mut self, name: &str) -> ProtocolResult<Option<String>>;

    /// Persist a setting in the remote's configuration.
    fn set_config(&mut self, name: &str, value: &str) -> ProtocolResult<()>;

    /// UUID of this remote.
    fn get_uuid(&mut self) -> ProtocolResult<String>;

    /// Git directory of the repository using the remote.
    fn get_git_dir(&mut self) -> ProtocolResult<PathBuf>;

    /// Message shown to the user.
    fn info(&mut self, message: &str) -> ProtocolResult<()>;

    /// Message shown in debug output.
    fn debug(&mut self, message: &str) -> ProtocolResult<()>;

    /// Whether the host negotiated the `INFO` extension.
    fn supports_info(&self) -> bool;

    /// Show `message` to the user if the host allows it, otherwise send
    /// it as a debug message.
    fn notify(&mut self, message: &str) -> ProtocolResult<()> {
        if self.supports_info() {
            self.info(message)
        } else {
            self.debug(message)
        }
    }
}

// ---------------------------------------------------------------------------
// AnnexConnection
// ---------------------------------------------------------------------------

/// The host at the other end of a line-oriented stream pair.
pub struct AnnexConnection<R, W> {
    reader: R,
    writer: W,
    host_extensions: Vec<String>,
}

impl<R: BufRead, W: Write> AnnexConnection<R, W> {
    pub fn new(reader: R, writer: W) -> Self {
        Self {
            reader,
            writer,
            host_extensions: Vec::new(),
        }
    }

    /// Record the extensions announced by the host.
    pub fn set_host_extensions(&mut self, exts: Vec<String>) {
        self.host_extensions = exts;
    }

    /// Send one message.
    pub fn send(&mut self, reply: &Reply) -> ProtocolResult<()> {
        let line = encode_reply(reply);
        trace!(line = %line, "send");
        self.writer.write_all(line.as_bytes())?;
        self.writer.write_all(b"\n")?;
        self.writer.flush()?;
        Ok(())
    }

    /// Read the next line, without terminator. `None` at end of stream.
    pub fn read_line(&mut self) -> ProtocolResult<Option<String>> {
        let mut line = String::new();
        if self.reader.read_line(&mut line)? == 0 {
            return Ok(None);
        }
        let line = line.trim_end_matches(['\r', '\n']).to_string();
        trace!(line = %line, "recv");
        Ok(Some(line))
    }

    pub fn into_inner(self) -> (R, W) {
        (self.reader, self.writer)
    }

    fn query(&mut self, query: &Reply) -> ProtocolResult<String> {
        self.send(query)?;
        let line = self.read_line()?.ok_or(ProtocolError::UnexpectedEof)?;
        decode_value(&line)
    }
}

impl<R: BufRead, W: Write> Annex for AnnexConnection<R, W> {
    fn get_config(&mut self, name: &str) -> ProtocolResult<Option<String>> {
        let value = self.query(&Reply::GetConfig(name.to_string()))?;
        Ok(Some(value).filter(|v| !v.is_empty()))
    }

    fn set_config(&mut self, name: &str, value: &str) -> ProtocolResult<()> {
        self.send(&Reply::SetConfig {
            name: name.to_string(),
            value: value.to_string(),
        })
    }

    fn get_uuid(&mut self) -> ProtocolResult<String> {
        self.query(&Reply::GetUuid)
    }

    fn get_git_dir(&mut self) -> ProtocolResult<PathBuf> {
        self.query(&Reply::GetGitDir).map(PathBuf::from)
    }

    fn info(&mut self, message: &str) -> ProtocolResult<()> {
        self.send(&Reply::Info(message.to_string()))
    }

    fn debug(&mut self, message: &str) -> ProtocolResult<()> {
        self.send(&Reply::Debug(message.to_string()))
    }

    fn supports_info(&self) -> bool {
        self.host_extensions.iter().any(|e| e == extensions::INFO)
    }
}

// ---------------------------------------------------------------------------
// StaticAnnex
// ---------------------------------------------------------------------------

/// In-memory host, for tests and for driving a remote without git-annex.
#[derive(Clone, Debug, Default)]
pub struct StaticAnnex {
    pub config: HashMap<String, String>,
    pub uuid: String,
    pub git_dir: PathBuf,
    pub info_enabled: bool,
    /// Every `info`/`debug` message, in order.
    pub messages: Vec<String>,
}

impl StaticAnnex {
    pub fn new(uuid: impl Into<String>, git_dir: impl Into<PathBuf>) -> Self {
        Self {
            uuid: uuid.into(),
            git_dir: git_dir.into(),
            ..Default::default()
        }
    }

    /// Builder: preset a remote setting.
    pub fn with_config(mut self, name: &str, value: &str) -> Self {
        self.config.insert(name.to_string(), value.to_string());
        self
    }
}

impl Annex for StaticAnnex {
    fn get_config(&mut self, name: &str) -> ProtocolResult<Option<String>> {
        Ok(self.config.get(name).filter(|v| !v.is_empty()).cloned())
    }

    fn set_config(&mut self, name: &str, value: &str) -> ProtocolResult<()> {
        self.config.insert(name.to_string(), value.to_string());
        Ok(())
    }

    fn get_uuid(&mut self) -> ProtocolResult<String> {
        Ok(self.uuid.clone())
    }

    fn get_git_dir(&mut self) -> ProtocolResult<PathBuf> {
        Ok(self.git_dir.clone())
    }

    fn info(&mut self, message: &str) -> ProtocolResult<()> {
        self.messages.push(message.to_string());
        Ok(())
    }

    fn debug(&mut self, message: &str) -> ProtocolResult<()> {
        self.messages.push(message.to_string());
        Ok(())
    }

    fn supports_info(&self) -> bool {
        self.info_enabled
    }
}
