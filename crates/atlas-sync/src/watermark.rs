use std::collections::{BTreeMap, HashMap};
use std::sync::RwLock;

use atlas_types::{ServerName, Timestamp};

/// Per-origin sync progress: for each peer server name, the timestamp
/// through which that peer's feed has been fully processed.
///
/// Watermarks only move forward. A watermark may only be advanced to `T`
/// once every feed event at or before `T` has been recorded locally;
/// held-back events therefore pin the watermark just before themselves
/// until their content arrives.
#[derive(Debug, Default)]
pub struct WatermarkTable {
    marks: RwLock<HashMap<ServerName, Timestamp>>,
}

impl WatermarkTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// The watermark for `server`, zero if the peer has never been synced.
    pub fn get(&self, server: &ServerName) -> Timestamp {
        self.marks
            .read()
            .expect("watermark lock poisoned")
            .get(server)
            .copied()
            .unwrap_or_default()
    }

    /// Advance the watermark for `server` to `to`. Returns false and
    /// leaves the table untouched when `to` is not ahead of the current
    /// mark.
    pub fn advance(&self, server: &ServerName, to: Timestamp) -> bool {
        let mut marks = self.marks.write().expect("watermark lock poisoned");
        match marks.get(server) {
            Some(current) if *current >= to => false,
            _ => {
                marks.insert(server.clone(), to);
                true
            }
        }
    }

    /// Every known watermark, ordered by server name.
    pub fn snapshot(&self) -> BTreeMap<ServerName, Timestamp> {
        self.marks
            .read()
            .expect("watermark lock poisoned")
            .iter()
            .map(|(server, mark)| (server.clone(), *mark))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.marks.read().expect("watermark lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn server(name: &str) -> ServerName {
        ServerName::new(name).unwrap()
    }

    #[test]
    fn unknown_peer_starts_at_zero() {
        let table = WatermarkTable::new();
        assert_eq!(table.get(&server("atlas-1")), Timestamp::from_millis(0));
        assert!(table.is_empty());
    }

    #[test]
    fn advance_is_forward_only() {
        let table = WatermarkTable::new();
        assert!(table.advance(&server("atlas-1"), Timestamp::from_millis(500)));
        assert!(!table.advance(&server("atlas-1"), Timestamp::from_millis(400)));
        assert!(!table.advance(&server("atlas-1"), Timestamp::from_millis(500)));
        assert_eq!(table.get(&server("atlas-1")), Timestamp::from_millis(500));
        assert!(table.advance(&server("atlas-1"), Timestamp::from_millis(501)));
        assert_eq!(table.get(&server("atlas-1")), Timestamp::from_millis(501));
    }

    #[test]
    fn snapshot_orders_by_server_name() {
        let table = WatermarkTable::new();
        table.advance(&server("atlas-2"), Timestamp::from_millis(20));
        table.advance(&server("atlas-1"), Timestamp::from_millis(10));
        let snapshot = table.snapshot();
        let names: Vec<&str> = snapshot.keys().map(|s| s.as_str()).collect();
        assert_eq!(names, vec!["atlas-1", "atlas-2"]);
        assert_eq!(table.len(), 2);
    }
}
