use std::cmp::Ordering;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::audit::AuditInfo;
use crate::entity::Entity;
use crate::error::TypeError;
use crate::hash::ContentHash;
use crate::names::{EntityKind, ServerName};
use crate::temporal::Timestamp;

/// Permanent record that an entity was deployed from a given server.
///
/// Events are append-only: once a server has recorded one it is never
/// rewritten or removed, including events for entities that were superseded
/// on arrival and never activated.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeploymentEvent {
    pub entity_id: ContentHash,
    pub kind: EntityKind,
    /// The server that first accepted the deployment, not the one that
    /// relayed it.
    pub server_name: ServerName,
    /// Origin acceptance time; the ordering key for supersession.
    pub timestamp: Timestamp,
}

impl DeploymentEvent {
    /// The `(entity, origin server)` pair that uniquely identifies this
    /// deployment cluster-wide.
    pub fn key(&self) -> DeploymentKey {
        DeploymentKey {
            entity_id: self.entity_id,
            server_name: self.server_name.clone(),
        }
    }

    /// Replay order: ascending timestamp, ties by server name, then entity
    /// id. Applying any event set in this order produces the same index on
    /// every server.
    pub fn replay_order(a: &Self, b: &Self) -> Ordering {
        a.timestamp
            .cmp(&b.timestamp)
            .then_with(|| a.server_name.cmp(&b.server_name))
            .then_with(|| a.entity_id.cmp(&b.entity_id))
    }

    /// Read order for history pages: newest first, ties by server name
    /// ascending, then entity id ascending. Not the reverse of
    /// [`replay_order`](Self::replay_order): ties keep ascending order so
    /// pages are bit-identical across servers.
    pub fn read_order(a: &Self, b: &Self) -> Ordering {
        b.timestamp
            .cmp(&a.timestamp)
            .then_with(|| a.server_name.cmp(&b.server_name))
            .then_with(|| a.entity_id.cmp(&b.entity_id))
    }
}

impl fmt::Display for DeploymentEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} via {} @ {}",
            self.kind,
            self.entity_id.short_hex(),
            self.server_name,
            self.timestamp
        )
    }
}

/// Unique identity of a deployment: one entity deployed from one server.
///
/// The same entity re-deployed from a different server is a distinct
/// deployment; the same pair seen twice is a duplicate and is ignored.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DeploymentKey {
    pub entity_id: ContentHash,
    pub server_name: ServerName,
}

impl fmt::Display for DeploymentKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.entity_id.short_hex(), self.server_name)
    }
}

/// A deployment in flight: the entity plus its provenance record.
///
/// This is the unit handed to the engine, whether the deployment arrived at
/// the local request boundary or from a peer during sync.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Deployment {
    pub entity: Entity,
    pub audit: AuditInfo,
}

impl Deployment {
    pub fn new(entity: Entity, audit: AuditInfo) -> Self {
        Self { entity, audit }
    }

    /// The deployment's effective timestamp (origin acceptance time).
    pub fn timestamp(&self) -> Timestamp {
        self.audit.origin_timestamp
    }

    /// The server that first accepted this deployment.
    pub fn origin(&self) -> &ServerName {
        &self.audit.origin_server
    }

    pub fn entity_id(&self) -> ContentHash {
        self.entity.id
    }

    pub fn kind(&self) -> &EntityKind {
        &self.entity.kind
    }

    pub fn key(&self) -> DeploymentKey {
        DeploymentKey {
            entity_id: self.entity.id,
            server_name: self.audit.origin_server.clone(),
        }
    }

    /// The history event this deployment produces when recorded.
    pub fn event(&self) -> DeploymentEvent {
        self.audit.event()
    }

    /// Structural validation before the engine will touch the deployment:
    /// the entity must verify against its declared id and the audit record
    /// must describe that entity.
    pub fn validate(&self) -> Result<(), TypeError> {
        self.entity.validate()?;
        self.audit.matches(&self.entity)
    }
}
