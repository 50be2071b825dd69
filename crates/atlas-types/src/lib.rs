//! Foundation types for Atlas.
//!
//! This crate provides the identity, naming, and record types used throughout
//! the Atlas cluster. Every other Atlas crate depends on `atlas-types`.
//!
//! # Key Types
//!
//! - [`ContentHash`] — Content-addressed identifier (BLAKE3 hash)
//! - [`EntityKind`], [`Pointer`], [`ServerName`] — Validated name newtypes
//! - [`Timestamp`] — Wall-clock milliseconds; deployment ordering key
//! - [`Entity`] — Immutable, content-addressed unit of deployment
//! - [`AuditInfo`] — Provenance record (origin server, timestamps, auth chain)
//! - [`DeploymentEvent`] — Permanent history record with its total orders
//! - [`Deployment`] — Entity plus audit, the unit handed to the engine

pub mod audit;
pub mod entity;
pub mod error;
pub mod event;
pub mod hash;
pub mod names;
pub mod temporal;

pub use audit::{AuditInfo, AuthChain, AuthLink};
pub use entity::Entity;
pub use error::TypeError;
pub use event::{Deployment, DeploymentEvent, DeploymentKey};
pub use hash::ContentHash;
pub use names::{EntityKind, Pointer, ServerName};
pub use temporal::Timestamp;
