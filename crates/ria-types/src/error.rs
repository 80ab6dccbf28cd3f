use thiserror::Error;

/// Errors produced by type operations.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TypeError {
    #[error("invalid key {key:?}: {reason}")]
    InvalidKey { key: String, reason: String },

    #[error("invalid repository id {id:?}: {reason}")]
    InvalidRepositoryId { id: String, reason: String },
}

impl TypeError {
    pub(crate) fn key(key: &str, reason: impl Into<String>) -> Self {
        Self::InvalidKey {
            key: key.to_string(),
            reason: reason.into(),
        }
    }

    pub(crate) fn repository(id: &str, reason: impl Into<String>) -> Self {
        Self::InvalidRepositoryId {
            id: id.to_string(),
            reason: reason.into(),
        }
    }
}
