use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use atlas_types::{DeploymentEvent, DeploymentKey, ServerName, Timestamp};

use crate::error::{HistoryError, HistoryResult};

/// Default page size for history queries.
pub const DEFAULT_PAGE_LIMIT: usize = 100;

/// Filter and pagination for a history read.
///
/// Timestamp bounds are inclusive on both ends. Offset and limit apply after
/// ordering, so two servers holding the same event set return bit-identical
/// pages for the same query.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryQuery {
    pub from: Option<Timestamp>,
    pub to: Option<Timestamp>,
    pub offset: usize,
    pub limit: usize,
}

impl Default for HistoryQuery {
    fn default() -> Self {
        Self {
            from: None,
            to: None,
            offset: 0,
            limit: DEFAULT_PAGE_LIMIT,
        }
    }
}

/// Append-only record of every deployment this server has seen.
///
/// Events are never rewritten or removed, including events for entities that
/// were superseded on arrival and never activated. The log keeps events in
/// replay order internally; reads re-order into the newest-first page order.
///
/// The log has no interior locking: the engine serializes access, and replay
/// after a restart rebuilds the log from the journal.
#[derive(Default)]
pub struct DeploymentLog {
    /// Events in replay order (ascending timestamp, then origin server, then
    /// entity id).
    events: Vec<DeploymentEvent>,
    /// Dedup index over `(entity, origin server)`.
    keys: HashSet<DeploymentKey>,
}

impl DeploymentLog {
    /// Create an empty log.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a deployment event.
    ///
    /// Returns [`HistoryError::DuplicateDeployment`] if the `(entity, origin
    /// server)` pair is already recorded; the log is unchanged in that case.
    pub fn append(&mut self, event: DeploymentEvent) -> HistoryResult<()> {
        let key = event.key();
        if self.keys.contains(&key) {
            return Err(HistoryError::DuplicateDeployment(key));
        }
        let at = self
            .events
            .partition_point(|e| DeploymentEvent::replay_order(e, &event).is_lt());
        self.events.insert(at, event);
        self.keys.insert(key);
        Ok(())
    }

    /// Read a history page: newest first, ties by origin server then entity
    /// id ascending.
    pub fn query(&self, query: &HistoryQuery) -> HistoryResult<Vec<DeploymentEvent>> {
        if let (Some(from), Some(to)) = (query.from, query.to) {
            if from > to {
                return Err(HistoryError::InvalidRange {
                    from: from.as_millis(),
                    to: to.as_millis(),
                });
            }
        }

        let lo = match query.from {
            Some(from) => self.events.partition_point(|e| e.timestamp < from),
            None => 0,
        };
        let hi = match query.to {
            Some(to) => self.events.partition_point(|e| e.timestamp <= to),
            None => self.events.len(),
        };

        let mut page = self.events[lo..hi].to_vec();
        page.sort_by(DeploymentEvent::read_order);
        Ok(page
            .into_iter()
            .skip(query.offset)
            .take(query.limit)
            .collect())
    }

    /// Events with timestamp strictly after `after`, in replay order.
    ///
    /// This is the feed peers poll during sync: a peer remembers the last
    /// timestamp it applied from this server and asks for everything newer.
    pub fn events_after(&self, after: Timestamp, limit: usize) -> Vec<DeploymentEvent> {
        let start = self.events.partition_point(|e| e.timestamp <= after);
        self.events[start..].iter().take(limit).cloned().collect()
    }

    /// Whether the `(entity, origin server)` pair is already recorded.
    pub fn contains(&self, key: &DeploymentKey) -> bool {
        self.keys.contains(key)
    }

    /// Number of recorded events.
    pub fn len(&self) -> usize {
        self.events.len()
    }

    /// Returns `true` if no events are recorded.
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Timestamp of the newest recorded event.
    pub fn latest_timestamp(&self) -> Option<Timestamp> {
        self.events.last().map(|e| e.timestamp)
    }

    /// Timestamp of the newest event that originated from `server`.
    pub fn latest_timestamp_for(&self, server: &ServerName) -> Option<Timestamp> {
        self.events
            .iter()
            .rev()
            .find(|e| &e.server_name == server)
            .map(|e| e.timestamp)
    }
}

impl std::fmt::Debug for DeploymentLog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeploymentLog")
            .field("events", &self.events.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use atlas_types::{ContentHash, EntityKind};

    use super::*;

    fn event(ts: u64, server: &str, id_byte: u8) -> DeploymentEvent {
        DeploymentEvent {
            entity_id: ContentHash::from_hash([id_byte; 32]),
            kind: EntityKind::new("scene").unwrap(),
            server_name: ServerName::new(server).unwrap(),
            timestamp: Timestamp::from_millis(ts),
        }
    }

    fn log_of(events: &[DeploymentEvent]) -> DeploymentLog {
        let mut log = DeploymentLog::new();
        for e in events {
            log.append(e.clone()).unwrap();
        }
        log
    }

    #[test]
    fn query_returns_newest_first() {
        let log = log_of(&[
            event(100, "alpha", 1),
            event(300, "beta", 2),
            event(200, "alpha", 3),
        ]);
        let page = log.query(&HistoryQuery::default()).unwrap();
        let ts: Vec<u64> = page.iter().map(|e| e.timestamp.as_millis()).collect();
        assert_eq!(ts, vec![300, 200, 100]);
    }

    #[test]
    fn equal_timestamps_break_ties_by_server_then_id() {
        let log = log_of(&[
            event(100, "beta", 1),
            event(100, "alpha", 9),
            event(100, "alpha", 2),
        ]);
        let page = log.query(&HistoryQuery::default()).unwrap();
        let keys: Vec<(&str, u8)> = page
            .iter()
            .map(|e| (e.server_name.as_str(), e.entity_id.as_bytes()[0]))
            .collect();
        assert_eq!(keys, vec![("alpha", 2), ("alpha", 9), ("beta", 1)]);
    }

    #[test]
    fn duplicate_key_is_rejected_even_with_new_timestamp() {
        let mut log = DeploymentLog::new();
        log.append(event(100, "alpha", 1)).unwrap();

        let err = log.append(event(900, "alpha", 1)).unwrap_err();
        assert!(matches!(err, HistoryError::DuplicateDeployment(_)));
        assert_eq!(log.len(), 1);

        // Same entity from a different origin is a distinct deployment.
        log.append(event(900, "beta", 1)).unwrap();
        assert_eq!(log.len(), 2);
    }

    #[test]
    fn range_bounds_are_inclusive() {
        let log = log_of(&[
            event(100, "alpha", 1),
            event(200, "alpha", 2),
            event(300, "alpha", 3),
            event(400, "alpha", 4),
        ]);
        let page = log
            .query(&HistoryQuery {
                from: Some(Timestamp::from_millis(200)),
                to: Some(Timestamp::from_millis(300)),
                ..Default::default()
            })
            .unwrap();
        let ts: Vec<u64> = page.iter().map(|e| e.timestamp.as_millis()).collect();
        assert_eq!(ts, vec![300, 200]);
    }

    #[test]
    fn inverted_range_is_rejected() {
        let log = log_of(&[event(100, "alpha", 1)]);
        let err = log
            .query(&HistoryQuery {
                from: Some(Timestamp::from_millis(300)),
                to: Some(Timestamp::from_millis(200)),
                ..Default::default()
            })
            .unwrap_err();
        assert!(matches!(
            err,
            HistoryError::InvalidRange { from: 300, to: 200 }
        ));
    }

    #[test]
    fn offset_and_limit_paginate_the_ordered_page() {
        let log = log_of(&[
            event(100, "alpha", 1),
            event(200, "alpha", 2),
            event(300, "alpha", 3),
            event(400, "alpha", 4),
        ]);
        let page = log
            .query(&HistoryQuery {
                offset: 1,
                limit: 2,
                ..Default::default()
            })
            .unwrap();
        let ts: Vec<u64> = page.iter().map(|e| e.timestamp.as_millis()).collect();
        assert_eq!(ts, vec![300, 200]);
    }

    #[test]
    fn events_after_is_strict_and_ascending() {
        let log = log_of(&[
            event(100, "alpha", 1),
            event(200, "beta", 2),
            event(200, "alpha", 3),
            event(300, "alpha", 4),
        ]);
        let feed = log.events_after(Timestamp::from_millis(100), 10);
        let keys: Vec<(u64, &str)> = feed
            .iter()
            .map(|e| (e.timestamp.as_millis(), e.server_name.as_str()))
            .collect();
        // Strictly after 100; equal timestamps ordered by server name.
        assert_eq!(keys, vec![(200, "alpha"), (200, "beta"), (300, "alpha")]);

        let bounded = log.events_after(Timestamp::from_millis(100), 2);
        assert_eq!(bounded.len(), 2);

        let empty = log.events_after(Timestamp::from_millis(300), 10);
        assert!(empty.is_empty());
    }

    #[test]
    fn contains_and_latest_timestamps() {
        let log = log_of(&[event(100, "alpha", 1), event(300, "beta", 2)]);
        assert!(log.contains(&event(100, "alpha", 1).key()));
        assert!(!log.contains(&event(100, "gamma", 1).key()));

        assert_eq!(log.latest_timestamp(), Some(Timestamp::from_millis(300)));
        assert_eq!(
            log.latest_timestamp_for(&ServerName::new("alpha").unwrap()),
            Some(Timestamp::from_millis(100))
        );
        assert_eq!(
            log.latest_timestamp_for(&ServerName::new("gamma").unwrap()),
            None
        );
    }

    #[test]
    fn empty_log_queries() {
        let log = DeploymentLog::new();
        assert!(log.is_empty());
        assert!(log.query(&HistoryQuery::default()).unwrap().is_empty());
        assert!(log.events_after(Timestamp::zero(), 10).is_empty());
        assert_eq!(log.latest_timestamp(), None);
    }

    proptest! {
        /// Whatever order events arrive in, the readable history is the same.
        #[test]
        fn query_is_insertion_order_insensitive(
            order in Just((0..8usize).collect::<Vec<_>>()).prop_shuffle()
        ) {
            let events = vec![
                event(100, "alpha", 1),
                event(100, "beta", 2),
                event(200, "alpha", 3),
                event(250, "gamma", 4),
                event(300, "beta", 5),
                event(300, "alpha", 6),
                event(400, "alpha", 7),
                event(400, "alpha", 8),
            ];
            let sequential = log_of(&events);

            let mut shuffled = DeploymentLog::new();
            for i in order {
                shuffled.append(events[i].clone()).unwrap();
            }

            let all = HistoryQuery { limit: usize::MAX, ..Default::default() };
            prop_assert_eq!(sequential.query(&all).unwrap(), shuffled.query(&all).unwrap());
            prop_assert_eq!(
                sequential.events_after(Timestamp::from_millis(150), 100),
                shuffled.events_after(Timestamp::from_millis(150), 100)
            );
        }
    }
}
