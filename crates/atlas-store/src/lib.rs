//! Content-addressed byte storage for Atlas.
//!
//! Every content file an entity names — scene payloads, textures, scripts —
//! is stored as an immutable blob identified by its BLAKE3 hash. The rest of
//! the system treats hashes as opaque names: supersession and sync decide
//! *which* content is active, the store only answers whether the bytes are
//! present locally.
//!
//! # Design Rules
//!
//! 1. Content is immutable once written (content-addressing guarantees this).
//! 2. Writes are idempotent; the same bytes are stored once.
//! 3. Concurrent reads are always safe.
//! 4. The store never interprets content — it is a pure key-value store.
//! 5. All I/O errors are propagated, never silently ignored.

pub mod error;
pub mod memory;
pub mod traits;

pub use error::{StoreError, StoreResult};
pub use memory::InMemoryContentStore;
pub use traits::ContentStore;
