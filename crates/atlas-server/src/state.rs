use std::sync::Arc;

use atlas_node::Node;
use atlas_sync::{PeerDirectory, SyncCoordinator};

/// Shared state behind every handler.
#[derive(Clone)]
pub struct AppState {
    pub node: Arc<Node>,
    /// Directory this server reads and serves. In-memory for a directory
    /// server, an HTTP proxy when `directory_url` points elsewhere.
    pub directory: Arc<dyn PeerDirectory>,
    /// Absent when sync is disabled in the configuration.
    pub coordinator: Option<Arc<SyncCoordinator>>,
}

impl AppState {
    pub fn new(
        node: Arc<Node>,
        directory: Arc<dyn PeerDirectory>,
        coordinator: Option<Arc<SyncCoordinator>>,
    ) -> Self {
        Self {
            node,
            directory,
            coordinator,
        }
    }
}
