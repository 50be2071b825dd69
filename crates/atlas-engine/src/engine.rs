//! The deployment engine: the single authority over entity activation.
//!
//! Every deployment, whether accepted at the local request boundary or pulled
//! from a peer during sync, goes through [`DeploymentEngine::apply`]. The
//! engine owns the entity store, the audit records, the history log and the
//! active index behind one lock, so a deployment is either fully recorded or
//! not recorded at all.

use std::collections::{BTreeMap, HashMap};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use tracing::{debug, info};

use atlas_history::{DeploymentLog, HistoryQuery};
use atlas_types::{
    AuditInfo, ContentHash, Deployment, DeploymentEvent, DeploymentKey, Entity, EntityKind,
    Pointer, ServerName, Timestamp,
};

use crate::error::{EngineError, EngineResult};
use crate::index::{ActiveEntry, ActiveIndex};

/// What applying one deployment did.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DeployOutcome {
    /// The entity is now active; strictly older overlapping entities were
    /// deactivated in full.
    Applied { superseded: Vec<ContentHash> },
    /// An overlapping entity with an equal or newer timestamp holds a
    /// pointer, so the incoming entity never activates. It is still recorded
    /// in the entity store and history, and strictly older overlapping
    /// entities are still deactivated: servers that see the same deployments
    /// in a different order must end up with the same survivors.
    Superseded {
        by: Vec<ContentHash>,
        retired: Vec<ContentHash>,
    },
    /// This `(entity, origin server)` pair is already recorded. Nothing
    /// changed.
    AlreadyKnown,
}

impl DeployOutcome {
    /// Returns `true` if the deployment's entity ended up active.
    pub fn is_applied(&self) -> bool {
        matches!(self, DeployOutcome::Applied { .. })
    }
}

/// Counters for the info endpoint and log lines.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct EngineStats {
    /// Entities ever stored, active or not.
    pub entities: usize,
    /// Entities currently holding at least one pointer.
    pub active_entities: usize,
    /// Occupied pointer slots across all kinds.
    pub occupied_pointers: usize,
    /// Recorded deployment events.
    pub events: usize,
}

#[derive(Default)]
struct EngineState {
    index: ActiveIndex,
    /// Every entity ever deployed, by content address. Never removed.
    entities: HashMap<ContentHash, Entity>,
    /// Audit record per deployment. The same entity deployed from two
    /// servers has two records.
    audits: HashMap<DeploymentKey, AuditInfo>,
    log: DeploymentLog,
}

/// In-memory deployment state machine.
///
/// The engine is deterministic: two engines fed the same set of deployments,
/// in any order, hold the same active index, entity store and history. That
/// property is what lets servers sync by exchanging deployments with no
/// further coordination.
pub struct DeploymentEngine {
    inner: RwLock<EngineState>,
}

impl DeploymentEngine {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(EngineState::default()),
        }
    }

    fn read(&self) -> EngineResult<RwLockReadGuard<'_, EngineState>> {
        self.inner.read().map_err(|_| EngineError::LockPoisoned)
    }

    fn write(&self) -> EngineResult<RwLockWriteGuard<'_, EngineState>> {
        self.inner.write().map_err(|_| EngineError::LockPoisoned)
    }

    /// Apply one deployment.
    ///
    /// Validation happens before the lock is taken; a malformed deployment
    /// rejects alone and leaves the engine untouched. Duplicates short-circuit
    /// to [`DeployOutcome::AlreadyKnown`] before any mutation.
    ///
    /// The supersession rule: among active entities of the same kind sharing
    /// at least one pointer with the incoming entity, those strictly older
    /// than the incoming timestamp are deactivated entirely (all their
    /// pointers freed, shared or not); if any overlapping entity is equal or
    /// newer, the incoming entity is recorded but not activated. Ties favor
    /// the incumbent.
    pub fn apply(&self, deployment: &Deployment) -> EngineResult<DeployOutcome> {
        deployment.validate()?;

        let mut state = self.write()?;
        let key = deployment.key();
        if state.log.contains(&key) {
            debug!(deployment = %key, "duplicate deployment ignored");
            return Ok(DeployOutcome::AlreadyKnown);
        }

        let timestamp = deployment.timestamp();
        let mut retired = Vec::new();
        let mut blockers = Vec::new();
        for entry in state
            .index
            .overlapping(deployment.kind(), &deployment.entity.pointers)
        {
            if entry.timestamp < timestamp {
                retired.push(entry.entity_id);
            } else {
                blockers.push(entry.entity_id);
            }
        }

        // Cannot be a duplicate: `contains` was checked under this lock.
        state.log.append(deployment.event())?;
        state
            .entities
            .entry(deployment.entity_id())
            .or_insert_with(|| deployment.entity.clone());
        state.audits.insert(key, deployment.audit.clone());

        for id in &retired {
            state.index.deactivate(id);
        }

        let outcome = if blockers.is_empty() {
            state.index.activate(ActiveEntry {
                entity_id: deployment.entity_id(),
                kind: deployment.kind().clone(),
                pointers: deployment.entity.pointers.clone(),
                timestamp,
            });
            info!(
                entity = %deployment.entity.short_id(),
                kind = %deployment.kind(),
                origin = %deployment.origin(),
                superseded = retired.len(),
                "deployment activated"
            );
            DeployOutcome::Applied { superseded: retired }
        } else {
            debug!(
                entity = %deployment.entity.short_id(),
                kind = %deployment.kind(),
                blocked_by = blockers.len(),
                retired = retired.len(),
                "deployment recorded without activation"
            );
            DeployOutcome::Superseded {
                by: blockers,
                retired,
            }
        };

        Ok(outcome)
    }

    /// Every occupied pointer, grouped by kind. Deterministic order.
    pub fn active_map(
        &self,
    ) -> EngineResult<BTreeMap<EntityKind, BTreeMap<Pointer, ContentHash>>> {
        Ok(self.read()?.index.snapshot())
    }

    /// Kinds with at least one active entity, in kind order.
    pub fn active_kinds(&self) -> EngineResult<Vec<EntityKind>> {
        Ok(self.read()?.index.kinds())
    }

    /// Occupied pointers for one kind, in pointer order.
    pub fn active_entities(
        &self,
        kind: &EntityKind,
    ) -> EngineResult<BTreeMap<Pointer, ContentHash>> {
        Ok(self.read()?.index.active_for_kind(kind))
    }

    /// The entity currently active for a pointer, if any.
    pub fn active_id(
        &self,
        kind: &EntityKind,
        pointer: &Pointer,
    ) -> EngineResult<Option<ContentHash>> {
        Ok(self.read()?.index.active_id(kind, pointer))
    }

    /// Returns `true` if the entity currently holds at least one pointer.
    pub fn is_active(&self, id: &ContentHash) -> EngineResult<bool> {
        Ok(self.read()?.index.is_active(id))
    }

    /// Fetch a stored entity, active or superseded.
    pub fn entity(&self, id: &ContentHash) -> EngineResult<Option<Entity>> {
        Ok(self.read()?.entities.get(id).cloned())
    }

    /// All audit records for an entity, ordered by origin timestamp then
    /// origin server.
    pub fn audits_for(&self, id: &ContentHash) -> EngineResult<Vec<AuditInfo>> {
        let state = self.read()?;
        let mut audits: Vec<AuditInfo> = state
            .audits
            .values()
            .filter(|a| a.entity_id == *id)
            .cloned()
            .collect();
        audits.sort_by(|a, b| {
            a.origin_timestamp
                .cmp(&b.origin_timestamp)
                .then_with(|| a.origin_server.cmp(&b.origin_server))
        });
        Ok(audits)
    }

    /// Fetch one deployment: the entity plus its audit record.
    ///
    /// With `origin` set the lookup is exact. Without it, the audit with the
    /// latest origin timestamp wins (ties by origin server name), so callers
    /// that do not care which server deployed the entity get a deterministic
    /// answer.
    pub fn deployment(
        &self,
        id: &ContentHash,
        origin: Option<&ServerName>,
    ) -> EngineResult<Option<(Entity, AuditInfo)>> {
        let state = self.read()?;
        let Some(entity) = state.entities.get(id) else {
            return Ok(None);
        };
        let audit = match origin {
            Some(server) => state
                .audits
                .get(&DeploymentKey {
                    entity_id: *id,
                    server_name: server.clone(),
                })
                .cloned(),
            None => {
                let mut best: Option<&AuditInfo> = None;
                for audit in state.audits.values().filter(|a| a.entity_id == *id) {
                    let newer = match best {
                        None => true,
                        Some(current) => {
                            (audit.origin_timestamp, &audit.origin_server)
                                > (current.origin_timestamp, &current.origin_server)
                        }
                    };
                    if newer {
                        best = Some(audit);
                    }
                }
                best.cloned()
            }
        };
        Ok(audit.map(|audit| (entity.clone(), audit)))
    }

    /// Read a history page, newest first.
    pub fn history(&self, query: &HistoryQuery) -> EngineResult<Vec<DeploymentEvent>> {
        Ok(self.read()?.log.query(query)?)
    }

    /// Total number of recorded deployment events.
    pub fn history_len(&self) -> EngineResult<usize> {
        Ok(self.read()?.log.len())
    }

    /// The sync feed: events strictly after `after`, in replay order.
    pub fn events_after(
        &self,
        after: Timestamp,
        limit: usize,
    ) -> EngineResult<Vec<DeploymentEvent>> {
        Ok(self.read()?.log.events_after(after, limit))
    }

    /// Whether a deployment is already recorded.
    pub fn contains(&self, key: &DeploymentKey) -> EngineResult<bool> {
        Ok(self.read()?.log.contains(key))
    }

    /// Timestamp of the newest recorded event, if any.
    pub fn latest_timestamp(&self) -> EngineResult<Option<Timestamp>> {
        Ok(self.read()?.log.latest_timestamp())
    }

    /// Timestamp of the newest recorded event from one origin server.
    pub fn latest_timestamp_for(&self, server: &ServerName) -> EngineResult<Option<Timestamp>> {
        Ok(self.read()?.log.latest_timestamp_for(server))
    }

    pub fn stats(&self) -> EngineResult<EngineStats> {
        let state = self.read()?;
        Ok(EngineStats {
            entities: state.entities.len(),
            active_entities: state.index.len(),
            occupied_pointers: state.index.slot_count(),
            events: state.log.len(),
        })
    }
}

impl Default for DeploymentEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for DeploymentEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.stats() {
            Ok(stats) => f
                .debug_struct("DeploymentEngine")
                .field("entities", &stats.entities)
                .field("active", &stats.active_entities)
                .field("events", &stats.events)
                .finish(),
            Err(_) => f.write_str("DeploymentEngine(poisoned)"),
        }
    }
}
