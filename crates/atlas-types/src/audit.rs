use std::fmt;

use serde::{Deserialize, Serialize};

use crate::entity::Entity;
use crate::error::TypeError;
use crate::event::DeploymentEvent;
use crate::hash::ContentHash;
use crate::names::{EntityKind, ServerName};
use crate::temporal::Timestamp;

/// One link in a deployment's proof chain: a signer and its signature over
/// the entity. Carried verbatim between servers and never interpreted here;
/// verification happens at the request boundary before a deployment is
/// accepted.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthLink {
    pub signer: String,
    pub signature: String,
}

impl AuthLink {
    pub fn new(signer: impl Into<String>, signature: impl Into<String>) -> Self {
        Self {
            signer: signer.into(),
            signature: signature.into(),
        }
    }
}

/// Ordered proof material accompanying a deployment (opaque payload).
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthChain(Vec<AuthLink>);

impl AuthChain {
    pub fn new(links: Vec<AuthLink>) -> Self {
        Self(links)
    }

    /// An empty chain, for callers whose boundary accepts unsigned deploys.
    pub const fn empty() -> Self {
        Self(Vec::new())
    }

    pub fn links(&self) -> &[AuthLink] {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }
}

/// Provenance record kept for every deployment a server has seen.
///
/// `origin_timestamp` is assigned exactly once, by the server that first
/// accepted the deployment, and is the timestamp all ordering decisions use.
/// `local_timestamp` is when this server recorded the deployment; the two
/// differ on servers that learned of the deployment through sync.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditInfo {
    pub entity_id: ContentHash,
    pub kind: EntityKind,
    pub origin_server: ServerName,
    pub origin_timestamp: Timestamp,
    pub local_timestamp: Timestamp,
    pub auth_chain: AuthChain,
}

impl AuditInfo {
    /// Audit record for a deployment accepted locally: local time equals
    /// origin time.
    pub fn origin(
        entity: &Entity,
        origin_server: ServerName,
        origin_timestamp: Timestamp,
        auth_chain: AuthChain,
    ) -> Self {
        Self {
            entity_id: entity.id,
            kind: entity.kind.clone(),
            origin_server,
            origin_timestamp,
            local_timestamp: origin_timestamp,
            auth_chain,
        }
    }

    /// Copy of this record as seen by a server that received the deployment
    /// through sync at `local_timestamp`.
    pub fn received_at(mut self, local_timestamp: Timestamp) -> Self {
        self.local_timestamp = local_timestamp;
        self
    }

    /// The permanent history event this audit record describes.
    pub fn event(&self) -> DeploymentEvent {
        DeploymentEvent {
            entity_id: self.entity_id,
            kind: self.kind.clone(),
            server_name: self.origin_server.clone(),
            timestamp: self.origin_timestamp,
        }
    }

    /// Check that this record describes the given entity.
    pub fn matches(&self, entity: &Entity) -> Result<(), TypeError> {
        if self.entity_id != entity.id {
            return Err(TypeError::AuditMismatch(format!(
                "audit names entity {}, got {}",
                self.entity_id.short_hex(),
                entity.id.short_hex()
            )));
        }
        if self.kind != entity.kind {
            return Err(TypeError::AuditMismatch(format!(
                "audit names kind {}, got {}",
                self.kind, entity.kind
            )));
        }
        Ok(())
    }
}

impl fmt::Display for AuditInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} via {} @ {}",
            self.kind,
            self.entity_id.short_hex(),
            self.origin_server,
            self.origin_timestamp
        )
    }
}
