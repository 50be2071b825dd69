//! In-memory peer plumbing: a directory, a dialer, and a client that
//! serves the peer surface straight off a local [`Node`]. Used for
//! embedded clusters and throughout the test suites; the HTTP
//! equivalents live in the server crate.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use atlas_node::Node;
use atlas_types::{ContentHash, Deployment, DeploymentEvent, ServerName, Timestamp};
use bytes::Bytes;

use crate::error::{SyncError, SyncResult};
use crate::traits::{PeerAddress, PeerClient, PeerDial, PeerDirectory, PeerInfo, PeerRecord};

/// Process-local [`PeerDirectory`] keyed by server name.
#[derive(Debug, Default)]
pub struct InMemoryPeerDirectory {
    records: RwLock<BTreeMap<ServerName, PeerRecord>>,
}

impl InMemoryPeerDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop a server from the directory. Returns true if it was listed.
    pub fn remove(&self, server: &ServerName) -> bool {
        self.records
            .write()
            .expect("directory lock poisoned")
            .remove(server)
            .is_some()
    }
}

#[async_trait]
impl PeerDirectory for InMemoryPeerDirectory {
    async fn register(&self, record: PeerRecord) -> SyncResult<()> {
        self.records
            .write()
            .expect("directory lock poisoned")
            .insert(record.server_name.clone(), record);
        Ok(())
    }

    async fn list_servers(&self) -> SyncResult<Vec<PeerRecord>> {
        Ok(self
            .records
            .read()
            .expect("directory lock poisoned")
            .values()
            .cloned()
            .collect())
    }
}

/// [`PeerClient`] that answers from a node in the same process.
pub struct LocalPeerClient {
    node: Arc<Node>,
}

impl LocalPeerClient {
    pub fn new(node: Arc<Node>) -> Self {
        Self { node }
    }
}

#[async_trait]
impl PeerClient for LocalPeerClient {
    async fn info(&self) -> SyncResult<PeerInfo> {
        Ok(PeerInfo {
            server_name: self.node.server_name().clone(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        })
    }

    async fn events_after(
        &self,
        after: Timestamp,
        limit: usize,
    ) -> SyncResult<Vec<DeploymentEvent>> {
        Ok(self.node.events_after(after, limit)?)
    }

    async fn fetch_deployment(
        &self,
        entity_id: ContentHash,
        origin: &ServerName,
    ) -> SyncResult<Deployment> {
        let (entity, audit) =
            self.node
                .deployment(&entity_id, Some(origin))?
                .ok_or_else(|| SyncError::Protocol {
                    peer: self.node.server_name().to_string(),
                    reason: format!("unknown deployment {}@{origin}", entity_id.short_hex()),
                })?;
        Ok(Deployment::new(entity, audit))
    }

    async fn fetch_content(&self, hash: ContentHash) -> SyncResult<Bytes> {
        self.node
            .content(&hash)?
            .ok_or(SyncError::ContentUnavailable(hash))
    }

    async fn available_content(&self, hashes: &[ContentHash]) -> SyncResult<Vec<ContentHash>> {
        Ok(self.node.available_content(hashes)?)
    }
}

/// [`PeerDial`] over a fixed registry of pre-built clients.
#[derive(Default)]
pub struct StaticPeerDial {
    clients: RwLock<HashMap<String, Arc<dyn PeerClient>>>,
}

impl StaticPeerDial {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, address: impl Into<String>, client: Arc<dyn PeerClient>) {
        self.clients
            .write()
            .expect("dial lock poisoned")
            .insert(address.into(), client);
    }

    /// Make an address undialable, simulating an unreachable peer.
    pub fn unregister(&self, address: &str) {
        self.clients
            .write()
            .expect("dial lock poisoned")
            .remove(address);
    }
}

#[async_trait]
impl PeerDial for StaticPeerDial {
    async fn dial(&self, address: &PeerAddress) -> SyncResult<Arc<dyn PeerClient>> {
        self.clients
            .read()
            .expect("dial lock poisoned")
            .get(address.as_str())
            .cloned()
            .ok_or_else(|| SyncError::PeerUnreachable {
                peer: address.to_string(),
                reason: "no client registered for address".to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use std::collections::{BTreeMap, BTreeSet};

    use atlas_store::InMemoryContentStore;
    use atlas_types::{AuthChain, Entity, EntityKind, Pointer};
    use serde_json::json;

    use super::*;

    // `Result::unwrap_err` needs the Ok side (`Arc<dyn PeerClient>`) to be Debug.
    impl std::fmt::Debug for dyn PeerClient {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            f.write_str("dyn PeerClient")
        }
    }

    fn node(name: &str) -> Arc<Node> {
        Arc::new(Node::new(
            ServerName::new(name).unwrap(),
            Arc::new(InMemoryContentStore::new()),
        ))
    }

    fn record(name: &str) -> PeerRecord {
        PeerRecord {
            server_name: ServerName::new(name).unwrap(),
            address: PeerAddress::new(format!("mem://{name}")),
        }
    }

    #[tokio::test]
    async fn directory_upserts_by_server_name() {
        let directory = InMemoryPeerDirectory::new();
        directory.register(record("atlas-2")).await.unwrap();
        directory.register(record("atlas-1")).await.unwrap();

        let mut moved = record("atlas-2");
        moved.address = PeerAddress::new("mem://atlas-2-new");
        directory.register(moved.clone()).await.unwrap();

        let listed = directory.list_servers().await.unwrap();
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0].server_name.as_str(), "atlas-1");
        assert_eq!(listed[1], moved);

        assert!(directory.remove(&ServerName::new("atlas-1").unwrap()));
        assert_eq!(directory.list_servers().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn local_client_serves_node_data() {
        let node = node("atlas-1");
        let bytes = Bytes::from_static(b"fn main() {}");
        let hash = ContentHash::of(&bytes);
        let entity = Entity::new(
            EntityKind::new("scene").unwrap(),
            std::iter::once(Pointer::new("main").unwrap()).collect::<BTreeSet<_>>(),
            Timestamp::from_millis(1),
            BTreeMap::from([("main.rs".to_string(), hash)]),
            json!({}),
        )
        .unwrap();
        let receipt = node
            .deploy_local(
                entity,
                BTreeMap::from([("main.rs".to_string(), bytes.clone())]),
                AuthChain::empty(),
            )
            .unwrap();

        let client = LocalPeerClient::new(Arc::clone(&node));
        let info = client.info().await.unwrap();
        assert_eq!(info.server_name.as_str(), "atlas-1");

        let events = client
            .events_after(Timestamp::from_millis(0), 10)
            .await
            .unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].entity_id, receipt.entity_id);

        let deployment = client
            .fetch_deployment(receipt.entity_id, node.server_name())
            .await
            .unwrap();
        assert_eq!(deployment.entity_id(), receipt.entity_id);

        assert_eq!(client.fetch_content(hash).await.unwrap(), bytes);
        let other = ContentHash::of(b"missing");
        assert!(matches!(
            client.fetch_content(other).await,
            Err(SyncError::ContentUnavailable(h)) if h == other
        ));
        assert_eq!(
            client.available_content(&[hash, other]).await.unwrap(),
            vec![hash]
        );
    }

    #[tokio::test]
    async fn static_dial_fails_for_unknown_addresses() {
        let dial = StaticPeerDial::new();
        let node = node("atlas-1");
        dial.register("mem://atlas-1", Arc::new(LocalPeerClient::new(node)));

        assert!(dial.dial(&PeerAddress::new("mem://atlas-1")).await.is_ok());
        let err = dial
            .dial(&PeerAddress::new("mem://atlas-9"))
            .await
            .unwrap_err();
        assert!(matches!(err, SyncError::PeerUnreachable { .. }));

        dial.unregister("mem://atlas-1");
        assert!(dial.dial(&PeerAddress::new("mem://atlas-1")).await.is_err());
    }
}
