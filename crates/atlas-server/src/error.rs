use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use thiserror::Error;

use atlas_node::NodeError;
use atlas_protocol::{ErrorBody, ProtocolError};
use atlas_store::StoreError;
use atlas_sync::SyncError;
use atlas_types::TypeError;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("invalid parameter: {0}")]
    Invalid(#[from] TypeError),

    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("node error: {0}")]
    Node(#[from] NodeError),

    #[error("sync error: {0}")]
    Sync(#[from] SyncError),

    #[error("sync is disabled on this server")]
    SyncDisabled,

    #[error("configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("internal error: {0}")]
    Internal(String),
}

pub type ServerResult<T> = Result<T, ServerError>;

impl ServerError {
    /// The HTTP status this error maps to.
    ///
    /// Deployment rejections are the caller's fault and come back as 422;
    /// malformed parameters and payload encodings as 400. Only local faults
    /// turn into 500s.
    fn status(&self) -> StatusCode {
        match self {
            ServerError::NotFound(_) => StatusCode::NOT_FOUND,
            ServerError::Invalid(_) | ServerError::Protocol(_) => StatusCode::BAD_REQUEST,
            ServerError::Node(err) => match err {
                NodeError::Invalid(_)
                | NodeError::MissingContent { .. }
                | NodeError::UnexpectedContentFile { .. } => StatusCode::UNPROCESSABLE_ENTITY,
                NodeError::Store(StoreError::HashMismatch { .. }) => {
                    StatusCode::UNPROCESSABLE_ENTITY
                }
                _ => StatusCode::INTERNAL_SERVER_ERROR,
            },
            ServerError::Sync(_) => StatusCode::BAD_GATEWAY,
            ServerError::SyncDisabled => StatusCode::CONFLICT,
            ServerError::Config(_) | ServerError::Io(_) | ServerError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(%status, error = %self, "request failed");
        }
        (status, Json(ErrorBody::new(self.to_string()))).into_response()
    }
}
