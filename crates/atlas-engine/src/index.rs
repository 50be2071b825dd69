//! The active-pointer index: which entity currently holds each pointer.
//!
//! Purely in-memory and rebuilt by replay after a restart; it is the only
//! mutable structure in the system. Entities, audit records and history are
//! append-only and live elsewhere.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use atlas_types::{ContentHash, EntityKind, Pointer, Timestamp};

/// Reverse entry for one active entity: everything needed to deactivate it
/// entirely when any of its pointers is superseded.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ActiveEntry {
    pub entity_id: ContentHash,
    pub kind: EntityKind,
    pub pointers: BTreeSet<Pointer>,
    /// Effective timestamp of the deployment that activated the entity
    /// (origin acceptance time, not the entity's author timestamp).
    pub timestamp: Timestamp,
}

/// Mapping `(kind, pointer) -> active entity`, at most one entity per slot.
///
/// Slots are kept per kind so entities of different kinds never compete even
/// on identical pointer strings. `BTreeMap` keys keep every iteration order
/// deterministic across servers.
#[derive(Default)]
pub struct ActiveIndex {
    slots: BTreeMap<EntityKind, BTreeMap<Pointer, ContentHash>>,
    entries: HashMap<ContentHash, ActiveEntry>,
}

impl ActiveIndex {
    /// Create an empty index.
    pub fn new() -> Self {
        Self::default()
    }

    /// The entity currently active for a pointer, if any.
    pub fn active_id(&self, kind: &EntityKind, pointer: &Pointer) -> Option<ContentHash> {
        self.slots.get(kind)?.get(pointer).copied()
    }

    /// Reverse entry for an active entity.
    pub fn entry(&self, id: &ContentHash) -> Option<&ActiveEntry> {
        self.entries.get(id)
    }

    /// Returns `true` if the entity is currently active.
    pub fn is_active(&self, id: &ContentHash) -> bool {
        self.entries.contains_key(id)
    }

    /// Distinct active entities holding any of the given pointers, in entity
    /// id order.
    ///
    /// An entity claiming several of the pointers appears once.
    pub fn overlapping(&self, kind: &EntityKind, pointers: &BTreeSet<Pointer>) -> Vec<ActiveEntry> {
        let Some(kind_slots) = self.slots.get(kind) else {
            return Vec::new();
        };
        let ids: BTreeSet<ContentHash> = pointers
            .iter()
            .filter_map(|p| kind_slots.get(p).copied())
            .collect();
        ids.iter()
            .filter_map(|id| self.entries.get(id).cloned())
            .collect()
    }

    /// Activate an entity under all its pointers.
    ///
    /// The caller must have deactivated every conflicting entity first; a
    /// slot still held by another entity is overwritten.
    pub fn activate(&mut self, entry: ActiveEntry) {
        let kind_slots = self.slots.entry(entry.kind.clone()).or_default();
        for pointer in &entry.pointers {
            kind_slots.insert(pointer.clone(), entry.entity_id);
        }
        self.entries.insert(entry.entity_id, entry);
    }

    /// Deactivate an entity entirely, freeing all of its pointers.
    ///
    /// Returns the removed entry, or `None` if the entity was not active.
    /// A slot is only cleared if it still maps to this entity.
    pub fn deactivate(&mut self, id: &ContentHash) -> Option<ActiveEntry> {
        let entry = self.entries.remove(id)?;
        if let Some(kind_slots) = self.slots.get_mut(&entry.kind) {
            for pointer in &entry.pointers {
                if kind_slots.get(pointer) == Some(id) {
                    kind_slots.remove(pointer);
                }
            }
            if kind_slots.is_empty() {
                self.slots.remove(&entry.kind);
            }
        }
        Some(entry)
    }

    /// All occupied pointers for a kind, in pointer order.
    pub fn active_for_kind(&self, kind: &EntityKind) -> BTreeMap<Pointer, ContentHash> {
        self.slots.get(kind).cloned().unwrap_or_default()
    }

    /// Full copy of the slot table, grouped by kind.
    pub fn snapshot(&self) -> BTreeMap<EntityKind, BTreeMap<Pointer, ContentHash>> {
        self.slots.clone()
    }

    /// Kinds with at least one occupied pointer, in kind order.
    pub fn kinds(&self) -> Vec<EntityKind> {
        self.slots.keys().cloned().collect()
    }

    /// Number of active entities.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if nothing is active.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Total number of occupied pointer slots across all kinds.
    pub fn slot_count(&self) -> usize {
        self.slots.values().map(|m| m.len()).sum()
    }
}

impl std::fmt::Debug for ActiveIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActiveIndex")
            .field("entities", &self.entries.len())
            .field("slots", &self.slot_count())
            .finish()
    }
}
