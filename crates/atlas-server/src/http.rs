//! reqwest-backed implementations of the sync traits.
//!
//! These are the over-the-network counterparts of the in-memory peer
//! plumbing in `atlas-sync`: a [`PeerClient`] speaking the `/v1` surface,
//! a [`PeerDirectory`] proxying a remote servers endpoint, and the dialer
//! that turns directory addresses into clients.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde::Serialize;

use atlas_protocol::{
    endpoints, AvailabilityRequest, AvailabilityResponse, EventsPage, NodeInfo,
};
use atlas_sync::{
    PeerAddress, PeerClient, PeerDial, PeerDirectory, PeerInfo, PeerRecord, SyncError, SyncResult,
};
use atlas_types::{ContentHash, Deployment, DeploymentEvent, ServerName, Timestamp};

use crate::error::{ServerError, ServerResult};

/// Hard cap on any single peer request; the sync coordinator applies its
/// own, tighter deadline on top.
const HTTP_TIMEOUT: Duration = Duration::from_secs(30);

fn build_client() -> ServerResult<reqwest::Client> {
    reqwest::Client::builder()
        .user_agent(concat!("atlas/", env!("CARGO_PKG_VERSION")))
        .timeout(HTTP_TIMEOUT)
        .build()
        .map_err(|e| ServerError::Internal(format!("building http client: {e}")))
}

fn base_url(address: &str) -> String {
    address.trim_end_matches('/').to_string()
}

/// HTTP client for one remote Atlas server.
pub struct HttpPeerClient {
    http: reqwest::Client,
    base: String,
}

impl HttpPeerClient {
    pub fn new(address: impl AsRef<str>) -> ServerResult<Self> {
        Ok(Self::with_client(build_client()?, address))
    }

    fn with_client(http: reqwest::Client, address: impl AsRef<str>) -> Self {
        Self {
            http,
            base: base_url(address.as_ref()),
        }
    }

    pub fn address(&self) -> &str {
        &self.base
    }

    fn unreachable(&self, err: reqwest::Error) -> SyncError {
        SyncError::PeerUnreachable {
            peer: self.base.clone(),
            reason: err.to_string(),
        }
    }

    fn protocol(&self, reason: impl Into<String>) -> SyncError {
        SyncError::Protocol {
            peer: self.base.clone(),
            reason: reason.into(),
        }
    }

    async fn send(&self, path: &str) -> SyncResult<reqwest::Response> {
        self.http
            .get(format!("{}{path}", self.base))
            .send()
            .await
            .map_err(|e| self.unreachable(e))
    }

    /// Reject non-2xx responses, keeping the error body for the log line.
    async fn checked(&self, response: reqwest::Response) -> SyncResult<reqwest::Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(self.protocol(format!("{status}: {body}")))
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> SyncResult<T> {
        let response = self.send(path).await?;
        let response = self.checked(response).await?;
        response
            .json()
            .await
            .map_err(|e| self.protocol(format!("invalid response body: {e}")))
    }

    async fn post_json<T: DeserializeOwned, B: Serialize>(
        &self,
        path: &str,
        body: &B,
    ) -> SyncResult<T> {
        let response = self
            .http
            .post(format!("{}{path}", self.base))
            .json(body)
            .send()
            .await
            .map_err(|e| self.unreachable(e))?;
        let response = self.checked(response).await?;
        response
            .json()
            .await
            .map_err(|e| self.protocol(format!("invalid response body: {e}")))
    }
}

#[async_trait]
impl PeerClient for HttpPeerClient {
    async fn info(&self) -> SyncResult<PeerInfo> {
        let info: NodeInfo = self.get_json(endpoints::INFO).await?;
        Ok(PeerInfo {
            server_name: info.server_name,
            version: info.version,
        })
    }

    async fn events_after(
        &self,
        after: Timestamp,
        limit: usize,
    ) -> SyncResult<Vec<DeploymentEvent>> {
        let path = format!(
            "{}?after={}&limit={limit}",
            endpoints::DEPLOYMENT_FEED,
            after.as_millis()
        );
        let page: EventsPage = self.get_json(&path).await?;
        Ok(page.events)
    }

    async fn fetch_deployment(
        &self,
        entity_id: ContentHash,
        origin: &ServerName,
    ) -> SyncResult<Deployment> {
        let path = format!(
            "{}/{}?server={origin}",
            endpoints::DEPLOYMENTS,
            entity_id.to_hex()
        );
        self.get_json(&path).await
    }

    async fn fetch_content(&self, hash: ContentHash) -> SyncResult<Bytes> {
        let path = format!("{}/{}", endpoints::CONTENT, hash.to_hex());
        let response = self.send(&path).await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Err(SyncError::ContentUnavailable(hash));
        }
        let response = self.checked(response).await?;
        response.bytes().await.map_err(|e| self.unreachable(e))
    }

    async fn available_content(&self, hashes: &[ContentHash]) -> SyncResult<Vec<ContentHash>> {
        let request = AvailabilityRequest {
            hashes: hashes.to_vec(),
        };
        let response: AvailabilityResponse = self
            .post_json(endpoints::CONTENT_AVAILABLE, &request)
            .await?;
        Ok(response.present)
    }
}

/// Peer directory served by a remote Atlas server.
pub struct HttpPeerDirectory {
    client: HttpPeerClient,
}

impl HttpPeerDirectory {
    pub fn new(address: impl AsRef<str>) -> ServerResult<Self> {
        Ok(Self {
            client: HttpPeerClient::new(address)?,
        })
    }
}

#[async_trait]
impl PeerDirectory for HttpPeerDirectory {
    async fn register(&self, record: PeerRecord) -> SyncResult<()> {
        let response = self
            .client
            .http
            .post(format!("{}{}", self.client.base, endpoints::SERVERS))
            .json(&record)
            .send()
            .await
            .map_err(|e| SyncError::Directory(e.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SyncError::Directory(format!("{status}: {body}")));
        }
        Ok(())
    }

    async fn list_servers(&self) -> SyncResult<Vec<PeerRecord>> {
        self.client
            .get_json(endpoints::SERVERS)
            .await
            .map_err(|e| SyncError::Directory(e.to_string()))
    }
}

/// Dialer handing out [`HttpPeerClient`]s that share one connection pool.
pub struct HttpPeerDial {
    http: reqwest::Client,
}

impl HttpPeerDial {
    pub fn new() -> ServerResult<Self> {
        Ok(Self {
            http: build_client()?,
        })
    }
}

#[async_trait]
impl PeerDial for HttpPeerDial {
    async fn dial(&self, address: &PeerAddress) -> SyncResult<Arc<dyn PeerClient>> {
        Ok(Arc::new(HttpPeerClient::with_client(
            self.http.clone(),
            address.as_str(),
        )))
    }
}
