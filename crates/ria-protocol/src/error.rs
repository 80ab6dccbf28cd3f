use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("malformed message {line:?}: {reason}")]
    Malformed { line: String, reason: String },

    #[error("unexpected message {line:?}, expected {expected}")]
    Unexpected { expected: &'static str, line: String },

    #[error("host closed the connection")]
    UnexpectedEof,

    #[error("host reported an error: {0}")]
    Host(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ProtocolError {
    pub(crate) fn malformed(line: &str, reason: impl Into<String>) -> Self {
        Self::Malformed {
            line: line.to_string(),
            reason: reason.into(),
        }
    }
}

pub type ProtocolResult<T> = Result<T, ProtocolError>;
