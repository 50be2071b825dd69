use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::error::TypeError;
use crate::hash::ContentHash;
use crate::names::{validate_kind, validate_pointer, EntityKind, Pointer};
use crate::temporal::Timestamp;

/// An immutable, content-addressed unit of deployment.
///
/// An entity claims one kind and a non-empty set of pointers, and names its
/// content files by hash. The `id` is the BLAKE3 hash of the entity's
/// canonical JSON serialization with the `id` field zeroed, so any server can
/// recompute and check it. Entities are never mutated or deleted; a new
/// deployment that claims an overlapping pointer supersedes the old entity
/// instead.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entity {
    /// Content address of this entity (hash of the sealed serialization).
    pub id: ContentHash,
    /// Classification, e.g. `scene`.
    pub kind: EntityKind,
    /// Pointer keys this entity claims. Never empty.
    pub pointers: BTreeSet<Pointer>,
    /// Author-assigned creation time. Covered by the hash and carried
    /// verbatim; activation ordering uses the audit record instead.
    pub timestamp: Timestamp,
    /// Content files by logical name, each addressed by hash.
    pub content: BTreeMap<String, ContentHash>,
    /// Free-form author metadata, covered by the hash.
    pub metadata: serde_json::Value,
}

impl Entity {
    /// Build a sealed entity: validates the pointer set and computes the id.
    pub fn new(
        kind: EntityKind,
        pointers: BTreeSet<Pointer>,
        timestamp: Timestamp,
        content: BTreeMap<String, ContentHash>,
        metadata: serde_json::Value,
    ) -> Result<Self, TypeError> {
        if pointers.is_empty() {
            return Err(TypeError::EmptyPointerSet);
        }
        let mut entity = Self {
            id: ContentHash::null(),
            kind,
            pointers,
            timestamp,
            content,
            metadata,
        };
        entity.id = entity.compute_id()?;
        Ok(entity)
    }

    /// Recompute the content address from the entity's fields.
    ///
    /// Canonical form: JSON serialization with `id` zeroed. Ordered maps and
    /// sets keep the byte stream identical on every server.
    pub fn compute_id(&self) -> Result<ContentHash, TypeError> {
        let mut unsealed = self.clone();
        unsealed.id = ContentHash::null();
        let bytes =
            serde_json::to_vec(&unsealed).map_err(|e| TypeError::Serialization(e.to_string()))?;
        let mut hasher = blake3::Hasher::new();
        hasher.update(b"atlas-entity-v1:");
        hasher.update(&bytes);
        Ok(ContentHash::from_hash(*hasher.finalize().as_bytes()))
    }

    /// Check the declared id against a fresh recomputation.
    pub fn verify_id(&self) -> Result<(), TypeError> {
        let computed = self.compute_id()?;
        if computed != self.id {
            return Err(TypeError::IdMismatch {
                declared: self.id.to_hex(),
                computed: computed.to_hex(),
            });
        }
        Ok(())
    }

    /// Full structural validation for entities that arrived over the wire.
    ///
    /// Deserialization bypasses [`Entity::new`], so names and the pointer set
    /// are re-checked here along with the id.
    pub fn validate(&self) -> Result<(), TypeError> {
        if self.pointers.is_empty() {
            return Err(TypeError::EmptyPointerSet);
        }
        validate_kind(self.kind.as_str())?;
        for pointer in &self.pointers {
            validate_pointer(pointer.as_str())?;
        }
        self.verify_id()
    }

    /// Returns `true` if the two entities compete for any pointer: same kind
    /// and at least one shared pointer. Entities of different kinds never
    /// conflict, even on identical pointer strings.
    pub fn overlaps(&self, other: &Entity) -> bool {
        self.kind == other.kind && !self.pointers.is_disjoint(&other.pointers)
    }

    /// Short identifier for log lines.
    pub fn short_id(&self) -> String {
        self.id.short_hex()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scene(pointers: &[&str]) -> Entity {
        let pointers = pointers
            .iter()
            .map(|p| Pointer::new(*p).unwrap())
            .collect::<BTreeSet<_>>();
        let mut content = BTreeMap::new();
        content.insert("scene.dat".to_string(), ContentHash::of(b"scene bytes"));
        Entity::new(
            EntityKind::new("scene").unwrap(),
            pointers,
            Timestamp::from_millis(1_700_000_000_000),
            content,
            serde_json::json!({ "author": "aria" }),
        )
        .unwrap()
    }

    fn profile(pointers: &[&str]) -> Entity {
        let pointers = pointers
            .iter()
            .map(|p| Pointer::new(*p).unwrap())
            .collect::<BTreeSet<_>>();
        Entity::new(
            EntityKind::new("profile").unwrap(),
            pointers,
            Timestamp::from_millis(1_700_000_000_000),
            BTreeMap::new(),
            serde_json::Value::Null,
        )
        .unwrap()
    }

    #[test]
    fn id_is_deterministic() {
        let a = scene(&["20,-34"]);
        let b = scene(&["20,-34"]);
        assert_eq!(a.id, b.id);
        assert!(!a.id.is_null());
    }

    #[test]
    fn id_covers_every_field() {
        let base = scene(&["20,-34"]);

        let other_pointer = scene(&["21,-34"]);
        assert_ne!(base.id, other_pointer.id);

        let mut other_meta = base.clone();
        other_meta.metadata = serde_json::json!({ "author": "borel" });
        other_meta.id = other_meta.compute_id().unwrap();
        assert_ne!(base.id, other_meta.id);
    }

    #[test]
    fn verify_id_accepts_sealed_entity() {
        let entity = scene(&["20,-34"]);
        assert!(entity.verify_id().is_ok());
    }

    #[test]
    fn verify_id_catches_tampering() {
        let mut entity = scene(&["20,-34"]);
        entity.timestamp = Timestamp::from_millis(1);
        assert!(matches!(
            entity.verify_id(),
            Err(TypeError::IdMismatch { .. })
        ));
    }

    #[test]
    fn empty_pointer_set_rejected() {
        let result = Entity::new(
            EntityKind::new("scene").unwrap(),
            BTreeSet::new(),
            Timestamp::zero(),
            BTreeMap::new(),
            serde_json::Value::Null,
        );
        assert_eq!(result.unwrap_err(), TypeError::EmptyPointerSet);
    }

    #[test]
    fn overlaps_requires_shared_pointer() {
        let a = scene(&["20,-34", "20,-35"]);
        let b = scene(&["20,-35", "20,-36"]);
        let c = scene(&["40,0"]);
        assert!(a.overlaps(&b));
        assert!(b.overlaps(&a));
        assert!(!a.overlaps(&c));
    }

    #[test]
    fn overlaps_requires_same_kind() {
        let a = scene(&["20,-34"]);
        let b = profile(&["20,-34"]);
        assert!(!a.overlaps(&b));
    }

    #[test]
    fn overlaps_is_reflexive() {
        let a = scene(&["20,-34"]);
        assert!(a.overlaps(&a));
    }

    #[test]
    fn serde_roundtrip_preserves_id() {
        let entity = scene(&["20,-34"]);
        let json = serde_json::to_string(&entity).unwrap();
        let parsed: Entity = serde_json::from_str(&json).unwrap();
        assert_eq!(entity, parsed);
        assert!(parsed.validate().is_ok());
    }

    #[test]
    fn validate_rejects_forged_names() {
        let mut entity = scene(&["20,-34"]);
        // Simulate a wire payload that skipped constructor validation.
        entity.pointers = std::iter::once(Pointer::new("ok").unwrap()).collect();
        assert!(entity.validate().is_err()); // id no longer matches
    }
}
