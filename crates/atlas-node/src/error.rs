use thiserror::Error;

use atlas_engine::EngineError;
use atlas_history::HistoryError;
use atlas_store::StoreError;
use atlas_types::{ContentHash, TypeError};

#[derive(Debug, Error)]
pub enum NodeError {
    /// The deployment failed structural validation at the node boundary.
    #[error("invalid deployment: {0}")]
    Invalid(#[from] TypeError),

    /// The entity names a content file the local store does not hold.
    #[error("content file {name:?} ({hash}) is not in the local store")]
    MissingContent { name: String, hash: ContentHash },

    /// A supplied file is not referenced by the entity's content map.
    #[error("content file {name:?} is not referenced by the entity")]
    UnexpectedContentFile { name: String },

    #[error(transparent)]
    Engine(#[from] EngineError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("journal error: {0}")]
    Journal(#[from] HistoryError),
}

pub type NodeResult<T> = Result<T, NodeError>;
