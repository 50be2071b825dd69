use thiserror::Error;

/// Errors produced by type construction and validation.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TypeError {
    #[error("invalid hex string: {0}")]
    InvalidHex(String),

    #[error("invalid byte length: expected {expected}, got {actual}")]
    InvalidLength { expected: usize, actual: usize },

    #[error("invalid entity kind {kind:?}: {reason}")]
    InvalidKind { kind: String, reason: String },

    #[error("invalid pointer {pointer:?}: {reason}")]
    InvalidPointer { pointer: String, reason: String },

    #[error("invalid server name {name:?}: {reason}")]
    InvalidServerName { name: String, reason: String },

    #[error("entity must claim at least one pointer")]
    EmptyPointerSet,

    #[error("entity id mismatch: declared {declared}, computed {computed}")]
    IdMismatch { declared: String, computed: String },

    #[error("audit record does not match entity: {0}")]
    AuditMismatch(String),

    #[error("serialization error: {0}")]
    Serialization(String),
}
