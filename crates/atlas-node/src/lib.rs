//! One server's view of the atlas cluster.
//!
//! [`Node`] composes the deployment engine, a content store and an optional
//! journal behind a narrow API: `deploy_local` for the request boundary,
//! `apply_remote` for the sync path, and read queries for the HTTP surface
//! and CLI. Opening a journaled node replays the journal to rebuild the
//! active index.

pub mod error;
pub mod node;

pub use error::{NodeError, NodeResult};
pub use node::{DeployReceipt, Node, NodeStatus};
