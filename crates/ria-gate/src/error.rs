use std::path::PathBuf;

use ria_store::StoreError;

/// Errors that can occur during layout version evaluation.
#[derive(Debug, thiserror::Error)]
pub enum GateError {
    /// An unclaimed marker could not be written. The store cannot be used
    /// safely without knowing whether it was registered.
    #[error("cannot claim layout version marker {}: {source}", path.display())]
    Claim {
        path: PathBuf,
        #[source]
        source: StoreError,
    },

    /// The marker or its parent could not be inspected.
    #[error("cannot inspect layout version marker {}: {source}", path.display())]
    Inspect {
        path: PathBuf,
        #[source]
        source: StoreError,
    },
}

impl GateError {
    /// The store error underneath.
    pub fn store_error(&self) -> &StoreError {
        match self {
            Self::Claim { source, .. } | Self::Inspect { source, .. } => source,
        }
    }
}

/// Result alias for gate evaluation.
pub type GateResult<T> = Result<T, GateError>;
