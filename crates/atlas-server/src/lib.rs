//! HTTP surface for an Atlas node.
//!
//! Serves the `/v1` API: local deploys, the peer feed, history and
//! active-map queries, content bytes, and the peer directory. Also home
//! to the reqwest-backed peer client the sync coordinator dials other
//! servers with.

pub mod config;
pub mod error;
pub mod handler;
pub mod http;
pub mod router;
pub mod server;
pub mod state;

pub use config::{JournalSection, ServerConfig, SyncSection};
pub use error::{ServerError, ServerResult};
pub use http::{HttpPeerClient, HttpPeerDial, HttpPeerDirectory};
pub use router::build_router;
pub use server::AtlasServer;
pub use state::AppState;
