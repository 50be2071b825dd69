//! Append-only deployment history for Atlas.
//!
//! Every deployment a server sees — locally accepted or learned through sync,
//! activated or superseded on arrival — is recorded exactly once and never
//! removed. Two servers holding the same deployment set return bit-identical
//! history pages, which is what lets operators diff cluster state by eye.
//!
//! Two pieces:
//!
//! - [`DeploymentLog`] — the in-memory record with deterministic ordering,
//!   duplicate detection, and the ascending feed peers poll during sync.
//!   It has no locking of its own; the engine serializes access.
//! - [`DeploymentJournal`] — the crash-recoverable file journal the log and
//!   entity map are rebuilt from on restart. The active-pointer index is
//!   never persisted; replay recreates it.

pub mod error;
pub mod journal;
pub mod log;

pub use error::{HistoryError, HistoryResult};
pub use journal::{DeploymentJournal, JournalConfig, SyncMode};
pub use log::{DeploymentLog, HistoryQuery, DEFAULT_PAGE_LIMIT};
