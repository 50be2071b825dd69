use thiserror::Error;

/// Errors from decoding wire payloads.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// A file payload was not valid base64.
    #[error("file {name:?} is not valid base64: {reason}")]
    InvalidFileEncoding { name: String, reason: String },

    /// A query parameter was out of range or unparsable.
    #[error("invalid parameter {name}: {reason}")]
    InvalidParameter {
        name: &'static str,
        reason: String,
    },
}

pub type ProtocolResult<T> = Result<T, ProtocolError>;
