use std::io;
use std::path::PathBuf;

use ria_types::TypeError;

/// Errors from store I/O operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The target path or archive member does not exist.
    #[error("not found: {}", .0.display())]
    NotFound(PathBuf),

    /// A filesystem operation failed for a reason other than absence.
    #[error("{op} failed on {}: {source}", path.display())]
    Io {
        op: &'static str,
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// A command ran to completion but reported failure.
    #[error("command failed: {command}: {output}")]
    CommandFailed { command: String, output: String },

    /// The session or process carrying commands broke down.
    #[error("transport error: {0}")]
    Transport(String),

    /// Fewer or more bytes than the key announces.
    #[error("size mismatch on {}: expected {expected} bytes, found {actual}", path.display())]
    SizeMismatch {
        path: PathBuf,
        expected: u64,
        actual: u64,
    },

    /// The archive tool could not be run or failed.
    #[error("archive tool failed on {}: {reason}", archive.display())]
    Archive { archive: PathBuf, reason: String },

    /// A key could not be interpreted.
    #[error(transparent)]
    Key(#[from] TypeError),
}

impl StoreError {
    /// Wrap an `io::Error`, folding `NotFound` into [`StoreError::NotFound`].
    pub fn io(op: &'static str, path: impl Into<PathBuf>, source: io::Error) -> Self {
        let path = path.into();
        if source.kind() == io::ErrorKind::NotFound {
            Self::NotFound(path)
        } else {
            Self::Io { op, path, source }
        }
    }

    /// Check if this error means the target does not exist.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }

    /// Check if this error comes from the transport rather than the target.
    pub fn is_transport(&self) -> bool {
        matches!(self, Self::Transport(_))
    }
}

/// Result alias for store operations.
pub type StoreResult<T> = Result<T, StoreError>;
