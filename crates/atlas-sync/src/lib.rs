//! Peer synchronization for Atlas.
//!
//! Servers converge by periodically pulling each other's deployment
//! feeds. A [`SyncCoordinator`] drives the loop for one node: it asks
//! the [`PeerDirectory`] who exists, dials each peer, fetches feed
//! events past that peer's watermark, pulls the deployments and content
//! behind them, and applies the merged batch through the local node in
//! replay order. Ordering by origin timestamp makes application
//! commutative, so it does not matter which peer delivered an event
//! first.
//!
//! Watermarks in the [`WatermarkTable`] record how far each origin's
//! feed has been fully processed. An event that cannot be applied yet,
//! usually because its content has not arrived, pins its origin's
//! watermark just before itself; the next cycle picks it up again.
//!
//! The traits in [`traits`] abstract the transport. [`memory`] provides
//! in-process implementations; the HTTP implementations live in the
//! server crate.

pub mod coordinator;
pub mod error;
pub mod memory;
pub mod traits;
pub mod watermark;

pub use coordinator::{CyclePhase, CycleReport, SyncConfig, SyncCoordinator, SyncHandle};
pub use error::{SyncError, SyncResult};
pub use memory::{InMemoryPeerDirectory, LocalPeerClient, StaticPeerDial};
pub use traits::{PeerAddress, PeerClient, PeerDial, PeerDirectory, PeerInfo, PeerRecord};
pub use watermark::WatermarkTable;
