use std::path::PathBuf;

use ria_store::StoreError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RemoteError {
    #[error("{0}")]
    Config(String),

    #[error("remote is not prepared")]
    NotPrepared,

    #[error(
        "Remote was set to read-only. Configure 'annex.ria-remote.<name>.force-write' to overrule this."
    )]
    ReadOnly,

    #[error("{key}: upload already in progress ({})", staging.display())]
    StagingConflict { key: String, staging: PathBuf },

    #[error("failed to retrieve {key}: object tree: {object}; archive: {archive}")]
    Retrieve {
        key: String,
        object: StoreError,
        archive: StoreError,
    },

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("layout version check failed: {0}")]
    Gate(#[from] ria_gate::GateError),

    #[error("ssh error: {0}")]
    Ssh(#[from] ria_ssh::SshError),

    #[error("protocol error: {0}")]
    Protocol(#[from] ria_protocol::ProtocolError),

    #[error(transparent)]
    Invalid(#[from] ria_types::TypeError),
}

impl RemoteError {
    pub(crate) fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }
}

pub type RemoteResult<T> = Result<T, RemoteError>;
