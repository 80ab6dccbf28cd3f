use ria_store::StoreError;

/// Errors from SSH sessions and the remote shell.
#[derive(Debug, thiserror::Error)]
pub enum SshError {
    /// The session to a host could not be established.
    #[error("cannot connect to {host}: {reason}")]
    Connect { host: String, reason: String },

    /// The shell process or session broke down (exit, broken pipe, EOF).
    #[error("transport error: {0}")]
    Transport(String),

    /// A command ran and reported failure through the end sentinel.
    #[error("remote command failed: {command}: {output}")]
    CommandFailed { command: String, output: String },

    /// A file transfer over the session failed.
    #[error("{op} of {path} failed: {reason}")]
    Transfer {
        op: &'static str,
        path: String,
        reason: String,
    },
}

impl SshError {
    pub(crate) fn transport(context: &str, err: impl std::fmt::Display) -> Self {
        Self::Transport(format!("{context}: {err}"))
    }

    /// Check if this error is a command-level failure rather than a
    /// transport failure.
    pub fn is_command_failure(&self) -> bool {
        matches!(self, Self::CommandFailed { .. })
    }
}

impl From<SshError> for StoreError {
    fn from(err: SshError) -> Self {
        match err {
            SshError::CommandFailed { command, output } => {
                StoreError::CommandFailed { command, output }
            }
            SshError::Transfer { op, path, reason } => StoreError::CommandFailed {
                command: format!("{op} {path}"),
                output: reason,
            },
            other @ (SshError::Connect { .. } | SshError::Transport(_)) => {
                StoreError::Transport(other.to_string())
            }
        }
    }
}

/// Result alias for SSH operations.
pub type SshResult<T> = Result<T, SshError>;
