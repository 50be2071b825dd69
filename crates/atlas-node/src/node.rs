//! The per-server facade over engine, content store and journal.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use bytes::Bytes;
use tracing::info;

use atlas_engine::{replay, DeployOutcome, DeploymentEngine, EngineStats, ReplayReport};
use atlas_history::{DeploymentJournal, HistoryQuery, JournalConfig};
use atlas_store::ContentStore;
use atlas_types::{
    AuditInfo, AuthChain, ContentHash, Deployment, DeploymentEvent, DeploymentKey, Entity,
    EntityKind, Pointer, ServerName, Timestamp,
};

use crate::error::{NodeError, NodeResult};

/// What a local deploy returned to the caller.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DeployReceipt {
    pub entity_id: ContentHash,
    /// The origin timestamp this server assigned. All ordering decisions
    /// cluster-wide use this value.
    pub timestamp: Timestamp,
    pub outcome: DeployOutcome,
}

/// Snapshot of a node's state for the info endpoint and CLI.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NodeStatus {
    pub server_name: ServerName,
    pub stats: EngineStats,
    pub latest_timestamp: Option<Timestamp>,
    /// Byte offset of the journal, if this node persists one.
    pub journal_offset: Option<u64>,
}

/// One server's deployment state: engine, content store, and the journal
/// that makes restarts survivable.
///
/// A node never records a deployment whose content files it does not hold;
/// the sync layer fetches content before applying. Writes go to the journal
/// before the engine, so anything the engine accepted is recoverable. A
/// raced duplicate may journal twice; replay deduplicates on rebuild.
pub struct Node {
    server_name: ServerName,
    engine: DeploymentEngine,
    store: Arc<dyn ContentStore>,
    journal: Option<DeploymentJournal>,
}

impl Node {
    /// An ephemeral node: no journal, state lives and dies with the process.
    pub fn new(server_name: ServerName, store: Arc<dyn ContentStore>) -> Self {
        Self {
            server_name,
            engine: DeploymentEngine::new(),
            store,
            journal: None,
        }
    }

    /// Open a journal-backed node, replaying any recovered deployments.
    ///
    /// The active index is never persisted; it is rebuilt here from the
    /// journaled deployments. Content bytes are the store's concern and are
    /// not restored by replay.
    pub fn open(
        server_name: ServerName,
        store: Arc<dyn ContentStore>,
        journal_path: impl AsRef<Path>,
        journal_config: JournalConfig,
    ) -> NodeResult<(Self, ReplayReport)> {
        let journal = DeploymentJournal::open(journal_path.as_ref(), journal_config)?;
        let recovered = journal.recover()?;
        let (engine, report) = replay::rebuild(recovered)?;

        info!(
            server = %server_name,
            applied = report.applied,
            superseded = report.superseded,
            duplicates = report.duplicates,
            malformed = report.malformed,
            "node restored from journal"
        );

        let node = Self {
            server_name,
            engine,
            store,
            journal: Some(journal),
        };
        Ok((node, report))
    }

    pub fn server_name(&self) -> &ServerName {
        &self.server_name
    }

    /// Accept a deployment at this server's request boundary.
    ///
    /// Supplied files are verified against the entity's content map and
    /// stored; every content hash the entity names must then be present.
    /// The origin timestamp is assigned here, once, from this server's
    /// clock — it travels with the deployment through sync unchanged.
    pub fn deploy_local(
        &self,
        entity: Entity,
        files: BTreeMap<String, Bytes>,
        auth_chain: AuthChain,
    ) -> NodeResult<DeployReceipt> {
        entity.validate()?;

        for (name, bytes) in files {
            let declared = entity
                .content
                .get(&name)
                .ok_or(NodeError::UnexpectedContentFile { name })?;
            self.store.put_verified(declared, bytes)?;
        }
        self.require_content(&entity)?;

        let timestamp = self.next_origin_timestamp()?;
        let audit = AuditInfo::origin(&entity, self.server_name.clone(), timestamp, auth_chain);
        let deployment = Deployment::new(entity, audit);
        let entity_id = deployment.entity_id();
        let outcome = self.record(&deployment)?;

        Ok(DeployReceipt {
            entity_id,
            timestamp,
            outcome,
        })
    }

    /// Record a deployment learned from a peer.
    ///
    /// The origin timestamp is kept; only the local bookkeeping timestamp is
    /// stamped. Content must already be in the local store.
    pub fn apply_remote(&self, deployment: Deployment) -> NodeResult<DeployOutcome> {
        deployment.validate()?;
        if self.engine.contains(&deployment.key())? {
            return Ok(DeployOutcome::AlreadyKnown);
        }
        self.require_content(&deployment.entity)?;

        let Deployment { entity, audit } = deployment;
        let deployment = Deployment::new(entity, audit.received_at(Timestamp::now()));
        self.record(&deployment)
    }

    /// Journal first, then apply. A deployment the engine accepted is
    /// always recoverable.
    fn record(&self, deployment: &Deployment) -> NodeResult<DeployOutcome> {
        if let Some(journal) = &self.journal {
            journal.append(deployment)?;
        }
        Ok(self.engine.apply(deployment)?)
    }

    /// Wall clock, floored to one past the newest recorded event.
    ///
    /// A local deploy never ties with anything this server already knows:
    /// two deploys in the same millisecond still supersede in order, and an
    /// operator's deploy beats a future-dated event from a skewed peer.
    fn next_origin_timestamp(&self) -> NodeResult<Timestamp> {
        let now = Timestamp::now();
        Ok(match self.engine.latest_timestamp()? {
            Some(latest) if latest >= now => Timestamp::from_millis(latest.as_millis() + 1),
            _ => now,
        })
    }

    fn require_content(&self, entity: &Entity) -> NodeResult<()> {
        for (name, hash) in &entity.content {
            if !self.store.has(hash)? {
                return Err(NodeError::MissingContent {
                    name: name.clone(),
                    hash: *hash,
                });
            }
        }
        Ok(())
    }

    // Queries. Thin wrappers over the engine so callers never touch it
    // directly.

    pub fn active_map(
        &self,
    ) -> NodeResult<BTreeMap<EntityKind, BTreeMap<Pointer, ContentHash>>> {
        Ok(self.engine.active_map()?)
    }

    pub fn active_kinds(&self) -> NodeResult<Vec<EntityKind>> {
        Ok(self.engine.active_kinds()?)
    }

    pub fn active_entities(&self, kind: &EntityKind) -> NodeResult<BTreeMap<Pointer, ContentHash>> {
        Ok(self.engine.active_entities(kind)?)
    }

    pub fn active_id(
        &self,
        kind: &EntityKind,
        pointer: &Pointer,
    ) -> NodeResult<Option<ContentHash>> {
        Ok(self.engine.active_id(kind, pointer)?)
    }

    /// Distinct active entities holding any of the given pointers, in entity
    /// id order.
    pub fn entities_at(
        &self,
        kind: &EntityKind,
        pointers: &[Pointer],
    ) -> NodeResult<Vec<Entity>> {
        let mut ids = std::collections::BTreeSet::new();
        for pointer in pointers {
            if let Some(id) = self.engine.active_id(kind, pointer)? {
                ids.insert(id);
            }
        }
        let mut entities = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(entity) = self.engine.entity(&id)? {
                entities.push(entity);
            }
        }
        Ok(entities)
    }

    pub fn entity(&self, id: &ContentHash) -> NodeResult<Option<Entity>> {
        Ok(self.engine.entity(id)?)
    }

    pub fn is_active(&self, id: &ContentHash) -> NodeResult<bool> {
        Ok(self.engine.is_active(id)?)
    }

    pub fn audits_for(&self, id: &ContentHash) -> NodeResult<Vec<AuditInfo>> {
        Ok(self.engine.audits_for(id)?)
    }

    pub fn deployment(
        &self,
        id: &ContentHash,
        origin: Option<&ServerName>,
    ) -> NodeResult<Option<(Entity, AuditInfo)>> {
        Ok(self.engine.deployment(id, origin)?)
    }

    pub fn history(&self, query: &HistoryQuery) -> NodeResult<Vec<DeploymentEvent>> {
        Ok(self.engine.history(query)?)
    }

    pub fn events_after(
        &self,
        after: Timestamp,
        limit: usize,
    ) -> NodeResult<Vec<DeploymentEvent>> {
        Ok(self.engine.events_after(after, limit)?)
    }

    pub fn contains(&self, key: &DeploymentKey) -> NodeResult<bool> {
        Ok(self.engine.contains(key)?)
    }

    pub fn content(&self, hash: &ContentHash) -> NodeResult<Option<Bytes>> {
        Ok(self.store.get(hash)?)
    }

    /// Store bytes fetched from a peer, verified against their hash.
    pub fn store_content(&self, expected: ContentHash, bytes: Bytes) -> NodeResult<ContentHash> {
        self.store.put_verified(&expected, bytes)?;
        Ok(expected)
    }

    pub fn has_content(&self, hash: &ContentHash) -> NodeResult<bool> {
        Ok(self.store.has(hash)?)
    }

    /// Subset of `hashes` present in the local store, input order kept.
    pub fn available_content(&self, hashes: &[ContentHash]) -> NodeResult<Vec<ContentHash>> {
        let mut present = Vec::new();
        for hash in hashes {
            if self.store.has(hash)? {
                present.push(*hash);
            }
        }
        Ok(present)
    }

    /// Subset of `hashes` absent from the local store, input order kept.
    pub fn missing_content(&self, hashes: &[ContentHash]) -> NodeResult<Vec<ContentHash>> {
        Ok(self.store.missing(hashes)?)
    }

    pub fn status(&self) -> NodeResult<NodeStatus> {
        Ok(NodeStatus {
            server_name: self.server_name.clone(),
            stats: self.engine.stats()?,
            latest_timestamp: self.engine.latest_timestamp()?,
            journal_offset: self.journal.as_ref().map(|j| j.offset()),
        })
    }
}

impl std::fmt::Debug for Node {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Node")
            .field("server", &self.server_name)
            .field("engine", &self.engine)
            .field("journaled", &self.journal.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use atlas_history::SyncMode;
    use atlas_store::InMemoryContentStore;

    use super::*;

    fn node(name: &str) -> Node {
        Node::new(
            ServerName::new(name).unwrap(),
            Arc::new(InMemoryContentStore::new()),
        )
    }

    fn entity_with_files(pointers: &[&str], files: &[(&str, &[u8])]) -> (Entity, BTreeMap<String, Bytes>) {
        let pointers: BTreeSet<Pointer> =
            pointers.iter().map(|p| Pointer::new(*p).unwrap()).collect();
        let mut content = BTreeMap::new();
        let mut payloads = BTreeMap::new();
        for (name, data) in files {
            content.insert(name.to_string(), ContentHash::of(data));
            payloads.insert(name.to_string(), Bytes::copy_from_slice(data));
        }
        let entity = Entity::new(
            EntityKind::new("scene").unwrap(),
            pointers,
            Timestamp::from_millis(1_700_000_000_000),
            content,
            serde_json::Value::Null,
        )
        .unwrap();
        (entity, payloads)
    }

    #[test]
    fn deploy_local_stores_files_and_activates() {
        let node = node("alpha");
        let (entity, files) = entity_with_files(&["20,-34"], &[("scene.dat", b"terrain")]);
        let id = entity.id;

        let receipt = node
            .deploy_local(entity, files, AuthChain::empty())
            .unwrap();
        assert_eq!(receipt.entity_id, id);
        assert!(receipt.outcome.is_applied());
        assert!(receipt.timestamp > Timestamp::zero());

        assert!(node.is_active(&id).unwrap());
        let stored = node.content(&ContentHash::of(b"terrain")).unwrap().unwrap();
        assert_eq!(&stored[..], b"terrain");

        // The audit says this server originated the deployment.
        let audits = node.audits_for(&id).unwrap();
        assert_eq!(audits.len(), 1);
        assert_eq!(audits[0].origin_server.as_str(), "alpha");
        assert_eq!(audits[0].origin_timestamp, receipt.timestamp);
    }

    #[test]
    fn deploy_local_requires_every_content_file() {
        let node = node("alpha");
        let (entity, mut files) =
            entity_with_files(&["a"], &[("one.dat", b"one"), ("two.dat", b"two")]);
        files.remove("two.dat");

        let err = node
            .deploy_local(entity, files, AuthChain::empty())
            .unwrap_err();
        assert!(matches!(err, NodeError::MissingContent { name, .. } if name == "two.dat"));
        assert_eq!(node.status().unwrap().stats.events, 0);
    }

    #[test]
    fn deploy_local_rejects_tampered_file_bytes() {
        let node = node("alpha");
        let (entity, mut files) = entity_with_files(&["a"], &[("one.dat", b"original")]);
        files.insert("one.dat".into(), Bytes::from_static(b"tampered"));

        let err = node
            .deploy_local(entity, files, AuthChain::empty())
            .unwrap_err();
        assert!(matches!(err, NodeError::Store(_)));
    }

    #[test]
    fn deploy_local_rejects_unreferenced_files() {
        let node = node("alpha");
        let (entity, mut files) = entity_with_files(&["a"], &[("one.dat", b"one")]);
        files.insert("rogue.dat".into(), Bytes::from_static(b"rogue"));

        let err = node
            .deploy_local(entity, files, AuthChain::empty())
            .unwrap_err();
        assert!(matches!(err, NodeError::UnexpectedContentFile { name } if name == "rogue.dat"));
    }

    #[test]
    fn apply_remote_keeps_origin_and_stamps_local_time() {
        let origin = node("alpha");
        let (entity, files) = entity_with_files(&["a"], &[("f", b"payload")]);
        let receipt = origin
            .deploy_local(entity.clone(), files, AuthChain::empty())
            .unwrap();
        let (_, audit) = origin.deployment(&entity.id, None).unwrap().unwrap();

        let replica = node("beta");
        replica
            .store_content(ContentHash::of(b"payload"), Bytes::from_static(b"payload"))
            .unwrap();
        let outcome = replica
            .apply_remote(Deployment::new(entity.clone(), audit))
            .unwrap();
        assert!(outcome.is_applied());

        let audits = replica.audits_for(&entity.id).unwrap();
        assert_eq!(audits[0].origin_server.as_str(), "alpha");
        assert_eq!(audits[0].origin_timestamp, receipt.timestamp);
        assert!(audits[0].local_timestamp >= audits[0].origin_timestamp);
    }

    #[test]
    fn apply_remote_requires_content_first() {
        let origin = node("alpha");
        let (entity, files) = entity_with_files(&["a"], &[("f", b"payload")]);
        origin
            .deploy_local(entity.clone(), files, AuthChain::empty())
            .unwrap();
        let (_, audit) = origin.deployment(&entity.id, None).unwrap().unwrap();

        let replica = node("beta");
        let err = replica
            .apply_remote(Deployment::new(entity, audit))
            .unwrap_err();
        assert!(matches!(err, NodeError::MissingContent { .. }));
        assert_eq!(replica.status().unwrap().stats.events, 0);
    }

    #[test]
    fn apply_remote_duplicate_is_already_known() {
        let origin = node("alpha");
        let (entity, files) = entity_with_files(&["a"], &[("f", b"payload")]);
        origin
            .deploy_local(entity.clone(), files, AuthChain::empty())
            .unwrap();
        let (_, audit) = origin.deployment(&entity.id, None).unwrap().unwrap();

        let replica = node("beta");
        replica
            .store_content(ContentHash::of(b"payload"), Bytes::from_static(b"payload"))
            .unwrap();
        let deployment = Deployment::new(entity, audit);
        replica.apply_remote(deployment.clone()).unwrap();
        assert_eq!(
            replica.apply_remote(deployment).unwrap(),
            DeployOutcome::AlreadyKnown
        );
        assert_eq!(replica.status().unwrap().stats.events, 1);
    }

    #[test]
    fn rapid_local_deploys_supersede_in_order() {
        let node = node("alpha");
        let (old, old_files) = entity_with_files(&["a"], &[("f", b"one")]);
        let (new, new_files) = entity_with_files(&["a"], &[("g", b"two")]);

        // Both deploys may land in the same millisecond; the node floors the
        // second past the first, so the later deploy still wins.
        let first = node
            .deploy_local(old.clone(), old_files, AuthChain::empty())
            .unwrap();
        let second = node
            .deploy_local(new.clone(), new_files, AuthChain::empty())
            .unwrap();

        assert!(second.timestamp > first.timestamp);
        assert!(second.outcome.is_applied());
        assert!(node.is_active(&new.id).unwrap());
        assert!(!node.is_active(&old.id).unwrap());
    }

    #[test]
    fn entities_at_dedups_multi_pointer_entities() {
        let node = node("alpha");
        let (entity, files) = entity_with_files(&["a", "b"], &[("f", b"x")]);
        node.deploy_local(entity.clone(), files, AuthChain::empty())
            .unwrap();

        let kind = EntityKind::new("scene").unwrap();
        let pointers = vec![
            Pointer::new("a").unwrap(),
            Pointer::new("b").unwrap(),
            Pointer::new("c").unwrap(),
        ];
        let found = node.entities_at(&kind, &pointers).unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, entity.id);
    }

    #[test]
    fn open_restores_state_from_the_journal() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("atlas.journal");
        let name = ServerName::new("alpha").unwrap();

        let (first, report) = Node::open(
            name.clone(),
            Arc::new(InMemoryContentStore::new()),
            &path,
            JournalConfig {
                sync_mode: SyncMode::EveryWrite,
            },
        )
        .unwrap();
        assert_eq!(report.total(), 0);

        let (old, old_files) = entity_with_files(&["a"], &[("f", b"one")]);
        let (new, new_files) = entity_with_files(&["a", "b"], &[("g", b"two")]);
        first
            .deploy_local(old.clone(), old_files, AuthChain::empty())
            .unwrap();
        first
            .deploy_local(new.clone(), new_files, AuthChain::empty())
            .unwrap();
        let before = first.active_map().unwrap();
        drop(first);

        let (second, report) = Node::open(
            name,
            Arc::new(InMemoryContentStore::new()),
            &path,
            JournalConfig::default(),
        )
        .unwrap();
        assert_eq!(report.applied, 2);
        assert_eq!(second.active_map().unwrap(), before);
        assert!(second.is_active(&new.id).unwrap());
        assert!(!second.is_active(&old.id).unwrap());
        assert_eq!(second.status().unwrap().stats.events, 2);
    }

    #[test]
    fn status_reports_journal_offset_only_when_journaled() {
        let ephemeral = node("alpha");
        assert_eq!(ephemeral.status().unwrap().journal_offset, None);

        let dir = tempfile::tempdir().unwrap();
        let (journaled, _) = Node::open(
            ServerName::new("beta").unwrap(),
            Arc::new(InMemoryContentStore::new()),
            dir.path().join("atlas.journal"),
            JournalConfig::default(),
        )
        .unwrap();
        assert_eq!(journaled.status().unwrap().journal_offset, Some(0));

        let (entity, files) = entity_with_files(&["a"], &[("f", b"x")]);
        journaled
            .deploy_local(entity, files, AuthChain::empty())
            .unwrap();
        assert!(journaled.status().unwrap().journal_offset.unwrap() > 0);
    }
}
