use atlas_types::ContentHash;
use bytes::Bytes;

use crate::error::{StoreError, StoreResult};

/// Content-addressed byte store.
///
/// All implementations must satisfy these invariants:
/// - Content is immutable once written. Content-addressing guarantees this:
///   the same bytes always produce the same hash.
/// - Writes are idempotent: storing bytes that already exist is a no-op.
/// - Concurrent reads are always safe (content is immutable).
/// - The store never interprets content — it is a pure key-value store.
/// - All I/O errors are propagated, never silently ignored.
pub trait ContentStore: Send + Sync {
    /// Read content by its hash.
    ///
    /// Returns `Ok(None)` if the content does not exist.
    /// Returns `Err` on I/O failure.
    fn get(&self, hash: &ContentHash) -> StoreResult<Option<Bytes>>;

    /// Store bytes and return their content hash.
    fn put(&self, data: Bytes) -> StoreResult<ContentHash>;

    /// Check whether content exists in the store.
    fn has(&self, hash: &ContentHash) -> StoreResult<bool>;

    /// Read content that is required to exist.
    ///
    /// Maps absence to [`StoreError::NotFound`]. Default implementation calls
    /// `get()`.
    fn require(&self, hash: &ContentHash) -> StoreResult<Bytes> {
        self.get(hash)?.ok_or(StoreError::NotFound(*hash))
    }

    /// Store bytes that were fetched by hash, verifying they match it.
    ///
    /// Returns [`StoreError::HashMismatch`] without storing anything if the
    /// bytes hash to a different value. Default implementation hashes and
    /// delegates to `put()`.
    fn put_verified(&self, expected: &ContentHash, data: Bytes) -> StoreResult<()> {
        let computed = ContentHash::of(&data);
        if computed != *expected {
            return Err(StoreError::HashMismatch {
                expected: *expected,
                computed,
            });
        }
        self.put(data)?;
        Ok(())
    }

    /// Of the given hashes, return those not present in the store.
    ///
    /// Default implementation calls `has()` for each hash. Backends may
    /// override for fewer round-trips.
    fn missing(&self, hashes: &[ContentHash]) -> StoreResult<Vec<ContentHash>> {
        let mut absent = Vec::new();
        for hash in hashes {
            if !self.has(hash)? {
                absent.push(*hash);
            }
        }
        Ok(absent)
    }
}
