//! Rebuilding engine state from journaled deployments after a restart.

use tracing::{info, warn};

use atlas_types::{Deployment, DeploymentEvent};

use crate::engine::{DeployOutcome, DeploymentEngine};
use crate::error::EngineResult;

/// Counters from one replay run.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ReplayReport {
    /// Deployments whose entity ended up active at some point during replay.
    pub applied: u64,
    /// Deployments recorded but blocked by a newer overlap.
    pub superseded: u64,
    /// Deployments already recorded when replay reached them.
    pub duplicates: u64,
    /// Deployments that failed validation and were skipped.
    pub malformed: u64,
}

impl ReplayReport {
    /// Total deployments examined.
    pub fn total(&self) -> u64 {
        self.applied + self.superseded + self.duplicates + self.malformed
    }
}

/// Rebuild an engine from a set of recovered deployments.
///
/// Deployments are applied in replay order (ascending timestamp, ties by
/// origin server then entity id), so the rebuilt engine matches what any
/// server holding the same deployments computes. Malformed records are
/// skipped with a warning rather than aborting the restart; duplicates are
/// counted and ignored.
pub fn rebuild(deployments: Vec<Deployment>) -> EngineResult<(DeploymentEngine, ReplayReport)> {
    let mut deployments = deployments;
    deployments.sort_by(|a, b| DeploymentEvent::replay_order(&a.event(), &b.event()));

    let engine = DeploymentEngine::new();
    let mut report = ReplayReport::default();

    for deployment in &deployments {
        match engine.apply(deployment) {
            Ok(DeployOutcome::Applied { .. }) => report.applied += 1,
            Ok(DeployOutcome::Superseded { .. }) => report.superseded += 1,
            Ok(DeployOutcome::AlreadyKnown) => report.duplicates += 1,
            Err(crate::error::EngineError::Malformed(reason)) => {
                report.malformed += 1;
                warn!(
                    entity = %deployment.entity.short_id(),
                    %reason,
                    "skipping malformed deployment during replay"
                );
            }
            Err(other) => return Err(other),
        }
    }

    info!(
        applied = report.applied,
        superseded = report.superseded,
        duplicates = report.duplicates,
        malformed = report.malformed,
        "replay complete"
    );
    Ok((engine, report))
}

#[cfg(test)]
mod tests {
    use std::collections::{BTreeMap, BTreeSet};

    use atlas_types::{
        AuditInfo, AuthChain, Entity, EntityKind, Pointer, ServerName, Timestamp,
    };

    use super::*;

    fn entity(pointers: &[&str], marker: u64) -> Entity {
        let pointers: BTreeSet<Pointer> =
            pointers.iter().map(|p| Pointer::new(*p).unwrap()).collect();
        Entity::new(
            EntityKind::new("scene").unwrap(),
            pointers,
            Timestamp::from_millis(marker),
            BTreeMap::new(),
            serde_json::json!({ "marker": marker }),
        )
        .unwrap()
    }

    fn deploy(entity: &Entity, origin: &str, ts: u64) -> Deployment {
        let audit = AuditInfo::origin(
            entity,
            ServerName::new(origin).unwrap(),
            Timestamp::from_millis(ts),
            AuthChain::empty(),
        );
        Deployment::new(entity.clone(), audit)
    }

    #[test]
    fn rebuild_sorts_before_applying() {
        let old = entity(&["a"], 1);
        let new = entity(&["a"], 2);

        // Recovered newest-first; replay must reorder so both engines agree.
        let (engine, report) = rebuild(vec![
            deploy(&new, "alpha", 200),
            deploy(&old, "alpha", 100),
        ])
        .unwrap();

        assert_eq!(report.applied, 1);
        assert_eq!(report.superseded, 1);
        assert!(engine.is_active(&new.id).unwrap());
        assert!(!engine.is_active(&old.id).unwrap());
        assert_eq!(engine.history_len().unwrap(), 2);
    }

    #[test]
    fn rebuild_skips_malformed_and_duplicate_records() {
        let good = entity(&["a"], 1);
        let mut forged = entity(&["b"], 2);
        let audit = AuditInfo::origin(
            &forged,
            ServerName::new("alpha").unwrap(),
            Timestamp::from_millis(150),
            AuthChain::empty(),
        );
        forged.metadata = serde_json::json!({ "marker": 999 });

        let (engine, report) = rebuild(vec![
            deploy(&good, "alpha", 100),
            deploy(&good, "alpha", 100),
            Deployment::new(forged, audit),
        ])
        .unwrap();

        assert_eq!(report.applied, 1);
        assert_eq!(report.duplicates, 1);
        assert_eq!(report.malformed, 1);
        assert_eq!(report.total(), 3);
        assert!(engine.is_active(&good.id).unwrap());
        assert_eq!(engine.history_len().unwrap(), 1);
    }

    #[test]
    fn rebuild_of_nothing_is_empty() {
        let (engine, report) = rebuild(Vec::new()).unwrap();
        assert_eq!(report, ReplayReport::default());
        assert_eq!(engine.history_len().unwrap(), 0);
    }

    #[test]
    fn rebuild_matches_live_application() {
        let e1 = entity(&["a", "b"], 1);
        let e2 = entity(&["b", "c"], 2);
        let e3 = entity(&["c", "d"], 3);
        let deployments = vec![
            deploy(&e1, "alpha", 100),
            deploy(&e2, "beta", 200),
            deploy(&e3, "gamma", 300),
        ];

        let live = DeploymentEngine::new();
        for d in &deployments {
            live.apply(d).unwrap();
        }

        let (rebuilt, _) = rebuild(deployments.into_iter().rev().collect()).unwrap();
        assert_eq!(rebuilt.active_map().unwrap(), live.active_map().unwrap());
        assert_eq!(rebuilt.history_len().unwrap(), live.history_len().unwrap());
    }
}
