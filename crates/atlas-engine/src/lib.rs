//! Deployment state machine for the atlas cluster.
//!
//! The engine decides which entity is active for every `(kind, pointer)`
//! slot. Deployments carry an origin timestamp assigned once by the server
//! that first accepted them; the engine applies a pure supersession rule over
//! those timestamps, so any two engines fed the same deployments converge on
//! the same active set regardless of arrival order. That determinism is the
//! foundation the sync layer builds on.
//!
//! - [`DeploymentEngine`]: apply deployments, query active state, read
//!   history.
//! - [`ActiveIndex`]: the `(kind, pointer) -> entity` table.
//! - [`replay::rebuild`]: reconstruct an engine from journaled deployments.

pub mod engine;
pub mod error;
pub mod index;
pub mod replay;

pub use engine::{DeployOutcome, DeploymentEngine, EngineStats};
pub use error::{EngineError, EngineResult};
pub use index::{ActiveEntry, ActiveIndex};
pub use replay::{rebuild, ReplayReport};
