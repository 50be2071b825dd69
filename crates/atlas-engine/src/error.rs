use atlas_history::HistoryError;
use atlas_types::TypeError;

/// Errors produced by the deployment engine.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// The deployment failed structural validation. Only this deployment is
    /// rejected; the engine is unchanged.
    #[error("malformed deployment: {0}")]
    Malformed(#[from] TypeError),

    /// The history log rejected the event.
    #[error(transparent)]
    History(#[from] HistoryError),

    /// A thread panicked while holding the engine lock.
    #[error("engine lock poisoned")]
    LockPoisoned,
}

/// Result alias for engine operations.
pub type EngineResult<T> = Result<T, EngineError>;
