use atlas_types::DeploymentKey;

/// Errors produced by history operations.
#[derive(Debug, thiserror::Error)]
pub enum HistoryError {
    /// The `(entity, origin server)` pair has already been recorded.
    #[error("duplicate deployment: {0}")]
    DuplicateDeployment(DeploymentKey),

    /// A query range with `from` after `to`.
    #[error("invalid timestamp range: from={from}, to={to}")]
    InvalidRange { from: u64, to: u64 },

    /// Journal entry could not be encoded or decoded.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// I/O error from the journal file.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result alias for history operations.
pub type HistoryResult<T> = Result<T, HistoryError>;
