use std::collections::HashMap;
use std::sync::RwLock;

use atlas_types::ContentHash;
use bytes::Bytes;

use crate::error::StoreResult;
use crate::traits::ContentStore;

/// In-memory, HashMap-based content store.
///
/// Intended for tests and embedding. All content is held in memory behind a
/// `RwLock` for safe concurrent access. `Bytes` payloads are reference-counted
/// so reads never copy.
pub struct InMemoryContentStore {
    content: RwLock<HashMap<ContentHash, Bytes>>,
}

impl InMemoryContentStore {
    /// Create a new empty in-memory store.
    pub fn new() -> Self {
        Self {
            content: RwLock::new(HashMap::new()),
        }
    }

    /// Number of distinct payloads currently stored.
    pub fn len(&self) -> usize {
        self.content.read().expect("lock poisoned").len()
    }

    /// Returns `true` if the store is empty.
    pub fn is_empty(&self) -> bool {
        self.content.read().expect("lock poisoned").is_empty()
    }

    /// Total bytes across all stored payloads.
    pub fn total_bytes(&self) -> u64 {
        self.content
            .read()
            .expect("lock poisoned")
            .values()
            .map(|data| data.len() as u64)
            .sum()
    }

    /// Return a sorted list of all content hashes in the store.
    pub fn all_hashes(&self) -> Vec<ContentHash> {
        let map = self.content.read().expect("lock poisoned");
        let mut hashes: Vec<ContentHash> = map.keys().copied().collect();
        hashes.sort();
        hashes
    }
}

impl Default for InMemoryContentStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ContentStore for InMemoryContentStore {
    fn get(&self, hash: &ContentHash) -> StoreResult<Option<Bytes>> {
        let map = self.content.read().expect("lock poisoned");
        Ok(map.get(hash).cloned())
    }

    fn put(&self, data: Bytes) -> StoreResult<ContentHash> {
        let hash = ContentHash::of(&data);
        let mut map = self.content.write().expect("lock poisoned");
        // Idempotent: same hash always maps to the same bytes.
        map.entry(hash).or_insert(data);
        Ok(hash)
    }

    fn has(&self, hash: &ContentHash) -> StoreResult<bool> {
        let map = self.content.read().expect("lock poisoned");
        Ok(map.contains_key(hash))
    }
}

impl std::fmt::Debug for InMemoryContentStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryContentStore")
            .field("payload_count", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StoreError;

    #[test]
    fn put_and_get() {
        let store = InMemoryContentStore::new();
        let hash = store.put(Bytes::from_static(b"scene bytes")).unwrap();
        let read_back = store.get(&hash).unwrap().expect("should exist");
        assert_eq!(read_back, Bytes::from_static(b"scene bytes"));
    }

    #[test]
    fn same_content_produces_same_hash() {
        let store = InMemoryContentStore::new();
        let h1 = store.put(Bytes::from_static(b"identical")).unwrap();
        let h2 = store.put(Bytes::from_static(b"identical")).unwrap();
        assert_eq!(h1, h2);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn get_missing_returns_none() {
        let store = InMemoryContentStore::new();
        let hash = ContentHash::of(b"never stored");
        assert!(store.get(&hash).unwrap().is_none());
        assert!(!store.has(&hash).unwrap());
    }

    #[test]
    fn require_maps_absence_to_not_found() {
        let store = InMemoryContentStore::new();
        let hash = ContentHash::of(b"missing");
        assert!(matches!(
            store.require(&hash),
            Err(StoreError::NotFound(h)) if h == hash
        ));
    }

    #[test]
    fn put_verified_accepts_matching_bytes() {
        let store = InMemoryContentStore::new();
        let data = Bytes::from_static(b"fetched from a peer");
        let hash = ContentHash::of(&data);
        store.put_verified(&hash, data.clone()).unwrap();
        assert_eq!(store.require(&hash).unwrap(), data);
    }

    #[test]
    fn put_verified_rejects_substituted_bytes() {
        let store = InMemoryContentStore::new();
        let expected = ContentHash::of(b"what was asked for");
        let result = store.put_verified(&expected, Bytes::from_static(b"something else"));
        assert!(matches!(result, Err(StoreError::HashMismatch { .. })));
        assert!(store.is_empty());
    }

    #[test]
    fn missing_reports_only_absent_hashes() {
        let store = InMemoryContentStore::new();
        let present = store.put(Bytes::from_static(b"here")).unwrap();
        let absent = ContentHash::of(b"not here");

        let missing = store.missing(&[present, absent]).unwrap();
        assert_eq!(missing, vec![absent]);
    }

    #[test]
    fn total_bytes_sums_payloads() {
        let store = InMemoryContentStore::new();
        store.put(Bytes::from_static(b"12345")).unwrap();
        store.put(Bytes::from_static(b"123456789")).unwrap();
        assert_eq!(store.total_bytes(), 14);
    }

    #[test]
    fn all_hashes_is_sorted() {
        let store = InMemoryContentStore::new();
        store.put(Bytes::from_static(b"aaa")).unwrap();
        store.put(Bytes::from_static(b"bbb")).unwrap();
        store.put(Bytes::from_static(b"ccc")).unwrap();

        let hashes = store.all_hashes();
        assert_eq!(hashes.len(), 3);
        for w in hashes.windows(2) {
            assert!(w[0] <= w[1]);
        }
    }

    #[test]
    fn concurrent_reads_are_safe() {
        use std::sync::Arc;
        use std::thread;

        let store = Arc::new(InMemoryContentStore::new());
        let hash = store.put(Bytes::from_static(b"shared data")).unwrap();

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let store = Arc::clone(&store);
                thread::spawn(move || {
                    let data = store.require(&hash).unwrap();
                    assert_eq!(ContentHash::of(&data), hash);
                })
            })
            .collect();

        for h in handles {
            h.join().expect("thread should not panic");
        }
    }

    #[test]
    fn debug_format() {
        let store = InMemoryContentStore::new();
        store.put(Bytes::from_static(b"x")).unwrap();
        let debug = format!("{store:?}");
        assert!(debug.contains("InMemoryContentStore"));
        assert!(debug.contains("payload_count"));
    }
}
