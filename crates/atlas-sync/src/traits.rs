use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use atlas_types::{ContentHash, Deployment, DeploymentEvent, ServerName, Timestamp};
use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::error::SyncResult;

/// Where a peer can be reached.
///
/// Opaque to the coordinator; only the [`PeerDial`] implementation
/// interprets it. An HTTP dialer reads it as a base URL, the in-memory
/// dialer as a registry key.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PeerAddress(String);

impl PeerAddress {
    pub fn new(address: impl Into<String>) -> Self {
        Self(address.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PeerAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A directory entry: one server and where to reach it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerRecord {
    pub server_name: ServerName,
    pub address: PeerAddress,
}

/// What a peer reports about itself when dialed.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerInfo {
    pub server_name: ServerName,
    pub version: String,
}

/// The peer directory: which servers exist and where to reach them.
///
/// Registration is an upsert keyed by server name, so a server that
/// moves re-registers under the same name. The directory is advisory;
/// the name a peer reports in [`PeerInfo`] is authoritative.
#[async_trait]
pub trait PeerDirectory: Send + Sync {
    async fn register(&self, record: PeerRecord) -> SyncResult<()>;
    async fn list_servers(&self) -> SyncResult<Vec<PeerRecord>>;
}

/// Read interface onto one remote peer.
///
/// All calls are scoped to the dialed peer; a failure affects only the
/// calling cycle's view of that peer.
#[async_trait]
pub trait PeerClient: Send + Sync {
    /// The peer's self-reported identity.
    async fn info(&self) -> SyncResult<PeerInfo>;

    /// The peer's deployment feed strictly after `after`, ascending in
    /// replay order, at most `limit` events.
    async fn events_after(&self, after: Timestamp, limit: usize)
        -> SyncResult<Vec<DeploymentEvent>>;

    /// The full deployment behind a feed event. `origin` selects among
    /// deployments of the same entity from different servers.
    async fn fetch_deployment(
        &self,
        entity_id: ContentHash,
        origin: &ServerName,
    ) -> SyncResult<Deployment>;

    /// Raw bytes of one content file.
    async fn fetch_content(&self, hash: ContentHash) -> SyncResult<Bytes>;

    /// Which of `hashes` the peer can serve.
    async fn available_content(&self, hashes: &[ContentHash]) -> SyncResult<Vec<ContentHash>>;
}

/// Turns a directory address into a live [`PeerClient`].
#[async_trait]
pub trait PeerDial: Send + Sync {
    async fn dial(&self, address: &PeerAddress) -> SyncResult<Arc<dyn PeerClient>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn peer_address_is_transparent_in_serde() {
        let address = PeerAddress::new("http://atlas-2.internal:7311");
        let json = serde_json::to_string(&address).unwrap();
        assert_eq!(json, "\"http://atlas-2.internal:7311\"");
        let parsed: PeerAddress = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, address);
    }

    #[test]
    fn peer_record_roundtrips() {
        let record = PeerRecord {
            server_name: ServerName::new("atlas-2").unwrap(),
            address: PeerAddress::new("mem://atlas-2"),
        };
        let json = serde_json::to_string(&record).unwrap();
        let parsed: PeerRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, record);
    }
}
