use std::collections::BTreeMap;

use atlas_types::{
    AuthChain, ContentHash, DeploymentEvent, Entity, ServerName, Timestamp,
};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::error::{ProtocolError, ProtocolResult};

pub const PROTOCOL_VERSION: u32 = 1;

/// Server-side clamp for feed and history page sizes.
pub const MAX_PAGE_LIMIT: usize = 1000;

/// What a server reports about itself on `GET /v1/info`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeInfo {
    pub server_name: ServerName,
    pub version: String,
    pub protocol_version: u32,
    /// Deployments recorded, active or not.
    pub entities: usize,
    pub active_entities: usize,
    pub occupied_pointers: usize,
    pub events: usize,
    pub latest_timestamp: Option<Timestamp>,
}

/// Query string for `GET /v1/deployments/feed`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedParams {
    /// Return events strictly after this timestamp (epoch millis).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub after: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit: Option<usize>,
}

/// One page of the ascending event feed.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventsPage {
    pub events: Vec<DeploymentEvent>,
}

/// Query string for `GET /v1/history`. Bounds are inclusive.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryParams {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub from: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub to: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub offset: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit: Option<usize>,
}

/// Body of `POST /v1/deployments`: a sealed entity, its content files
/// base64-encoded by logical name, and the caller's proof material.
///
/// File names must match the entity's content map exactly; the server
/// verifies every payload against its declared hash before accepting.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeployRequest {
    pub entity: Entity,
    pub files: BTreeMap<String, String>,
    #[serde(default)]
    pub auth_chain: AuthChain,
}

impl DeployRequest {
    pub fn new(entity: Entity, files: BTreeMap<String, Bytes>, auth_chain: AuthChain) -> Self {
        let files = files
            .into_iter()
            .map(|(name, bytes)| (name, BASE64.encode(&bytes)))
            .collect();
        Self {
            entity,
            files,
            auth_chain,
        }
    }

    /// Decode the base64 file payloads back into raw bytes.
    pub fn decode_files(&self) -> ProtocolResult<BTreeMap<String, Bytes>> {
        let mut decoded = BTreeMap::new();
        for (name, encoded) in &self.files {
            let bytes =
                BASE64
                    .decode(encoded)
                    .map_err(|e| ProtocolError::InvalidFileEncoding {
                        name: name.clone(),
                        reason: e.to_string(),
                    })?;
            decoded.insert(name.clone(), Bytes::from(bytes));
        }
        Ok(decoded)
    }
}

/// How the engine disposed of a deployment.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum DeployStatus {
    /// Activated; these entity ids were deactivated to make room.
    Applied { superseded: Vec<ContentHash> },
    /// Recorded but blocked by newer overlapping entities; strictly older
    /// overlaps were still retired.
    Superseded {
        by: Vec<ContentHash>,
        retired: Vec<ContentHash>,
    },
    /// This exact deployment was already recorded.
    AlreadyKnown,
}

/// Response to `POST /v1/deployments`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeployResponse {
    pub entity_id: ContentHash,
    /// The origin timestamp this server assigned.
    pub timestamp: Timestamp,
    #[serde(flatten)]
    pub outcome: DeployStatus,
}

/// Body of `POST /v1/content/available`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AvailabilityRequest {
    pub hashes: Vec<ContentHash>,
}

/// Subset of the requested hashes this server can serve.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AvailabilityResponse {
    pub present: Vec<ContentHash>,
}

/// Error payload every non-2xx response carries.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
}

impl ErrorBody {
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
        }
    }
}
