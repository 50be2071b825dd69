use std::time::Duration;

use atlas_node::NodeError;
use atlas_types::ContentHash;
use thiserror::Error;

/// Errors raised while talking to peers or applying what they sent.
///
/// Every variant is scoped to a single peer interaction or a single
/// deployment. The coordinator logs the failure, skips the affected
/// peer or event, and carries on with the rest of the cycle; only a
/// local [`NodeError`] aborts a cycle outright.
#[derive(Debug, Error)]
pub enum SyncError {
    /// The peer directory could not be read or updated.
    #[error("peer directory error: {0}")]
    Directory(String),

    /// A peer could not be dialed or dropped the connection.
    #[error("peer {peer} unreachable: {reason}")]
    PeerUnreachable { peer: String, reason: String },

    /// A deployment references content no reachable peer can serve.
    #[error("content {0} is unavailable from the peer")]
    ContentUnavailable(ContentHash),

    /// A request did not complete within the configured timeout.
    #[error("{operation} timed out after {after:?}")]
    Timeout {
        operation: &'static str,
        after: Duration,
    },

    /// The peer answered with something that contradicts its own feed.
    #[error("protocol error from {peer}: {reason}")]
    Protocol { peer: String, reason: String },

    /// The local node failed while recording or serving data.
    #[error(transparent)]
    Node(#[from] NodeError),
}

pub type SyncResult<T> = Result<T, SyncError>;
