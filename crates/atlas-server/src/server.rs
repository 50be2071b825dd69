use std::sync::Arc;

use tokio::net::TcpListener;

use atlas_node::Node;
use atlas_store::{ContentStore, InMemoryContentStore};
use atlas_sync::{
    InMemoryPeerDirectory, PeerAddress, PeerDirectory, PeerRecord, SyncCoordinator,
};
use atlas_types::ServerName;

use crate::config::ServerConfig;
use crate::error::{ServerError, ServerResult};
use crate::http::{HttpPeerDial, HttpPeerDirectory};
use crate::router::build_router;
use crate::state::AppState;

/// One Atlas server: a node, its peer directory view, and the sync loop,
/// wired to an HTTP listener.
pub struct AtlasServer {
    config: ServerConfig,
    node: Arc<Node>,
    directory: Arc<dyn PeerDirectory>,
    coordinator: Option<Arc<SyncCoordinator>>,
}

impl AtlasServer {
    /// Build a server with an in-memory content store.
    pub fn new(config: ServerConfig) -> ServerResult<Self> {
        Self::with_store(config, Arc::new(InMemoryContentStore::new()))
    }

    /// Build a server over an explicit content store.
    ///
    /// Journal-backed configurations replay the journal here, before the
    /// listener exists, so the node never serves a half-restored state.
    pub fn with_store(config: ServerConfig, store: Arc<dyn ContentStore>) -> ServerResult<Self> {
        let server_name = ServerName::new(config.server_name.clone())?;
        let node = match &config.journal {
            Some(journal) => {
                let (node, _report) =
                    Node::open(server_name, store, &journal.path, journal.journal_config())?;
                Arc::new(node)
            }
            None => Arc::new(Node::new(server_name, store)),
        };

        let directory: Arc<dyn PeerDirectory> = match &config.sync.directory_url {
            Some(url) => Arc::new(HttpPeerDirectory::new(url)?),
            None => Arc::new(InMemoryPeerDirectory::new()),
        };

        let coordinator = if config.sync.enabled {
            let dial = Arc::new(HttpPeerDial::new()?);
            Some(SyncCoordinator::new(
                Arc::clone(&node),
                Arc::clone(&directory),
                dial,
                config.sync.sync_config(),
            ))
        } else {
            None
        };

        Ok(Self {
            config,
            node,
            directory,
            coordinator,
        })
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    pub fn node(&self) -> &Arc<Node> {
        &self.node
    }

    /// Build the router (useful for testing).
    pub fn router(&self) -> axum::Router {
        build_router(AppState::new(
            Arc::clone(&self.node),
            Arc::clone(&self.directory),
            self.coordinator.clone(),
        ))
    }

    /// Announce this server to its directory and resolve the configured
    /// seed peers into directory records.
    ///
    /// Failures are logged and skipped: an unreachable seed can still
    /// register itself with us later, and an unreachable directory is
    /// retried by operators, not by crashing the server.
    async fn join_cluster(&self) {
        let own_record = PeerRecord {
            server_name: self.node.server_name().clone(),
            address: PeerAddress::new(self.config.advertised_url()),
        };
        if let Err(err) = self.directory.register(own_record).await {
            tracing::warn!(error = %err, "could not register with the peer directory");
        }

        let Ok(dial) = HttpPeerDial::new() else {
            return;
        };
        for url in &self.config.sync.peers {
            match resolve_seed(&dial, url).await {
                Ok(record) => {
                    tracing::info!(peer = %record.server_name, address = %record.address, "seed peer resolved");
                    if let Err(err) = self.directory.register(record).await {
                        tracing::warn!(seed = %url, error = %err, "could not register seed peer");
                    }
                }
                Err(err) => {
                    tracing::warn!(seed = %url, error = %err, "seed peer unreachable, skipping");
                }
            }
        }
    }

    /// Start serving requests. Runs until the listener fails.
    pub async fn serve(self) -> ServerResult<()> {
        let _sync = match &self.coordinator {
            Some(coordinator) => {
                self.join_cluster().await;
                Some(coordinator.spawn())
            }
            None => None,
        };

        let app = self.router();
        let listener = TcpListener::bind(&self.config.bind_addr).await?;
        tracing::info!(
            server = %self.config.server_name,
            "atlas server listening on {}",
            self.config.bind_addr
        );
        axum::serve(listener, app)
            .await
            .map_err(|e| ServerError::Internal(e.to_string()))
    }
}

/// Ask a seed peer for its name so it can be entered in the directory.
async fn resolve_seed(dial: &HttpPeerDial, url: &str) -> ServerResult<PeerRecord> {
    use atlas_sync::PeerDial;

    let address = PeerAddress::new(url);
    let client = dial.dial(&address).await.map_err(ServerError::Sync)?;
    let info = client.info().await.map_err(ServerError::Sync)?;
    Ok(PeerRecord {
        server_name: info.server_name,
        address,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn server_construction() {
        let server = AtlasServer::new(ServerConfig::default()).unwrap();
        assert_eq!(
            server.config().bind_addr,
            "127.0.0.1:7600".parse().unwrap()
        );
        assert_eq!(server.node().server_name().as_str(), "atlas-local");
    }

    #[test]
    fn router_builds() {
        let server = AtlasServer::new(ServerConfig::default()).unwrap();
        let _router = server.router();
    }

    #[test]
    fn disabled_sync_leaves_no_coordinator() {
        let mut config = ServerConfig::default();
        config.sync.enabled = false;
        let server = AtlasServer::new(config).unwrap();
        assert!(server.coordinator.is_none());
    }

    #[test]
    fn rejects_an_invalid_server_name() {
        let config = ServerConfig {
            server_name: "Not A Name".to_string(),
            ..ServerConfig::default()
        };
        assert!(matches!(
            AtlasServer::new(config),
            Err(ServerError::Invalid(_))
        ));
    }
}
