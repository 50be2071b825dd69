//! Wire types for the Atlas peer surface.
//!
//! Defines the endpoint paths and the request/response DTOs exchanged
//! between Atlas servers (and by the CLI). Core records — entities,
//! audits, feed events — serialize directly; this crate adds the shapes
//! that exist only on the wire, such as base64 file payloads and error
//! bodies.

pub mod dto;
pub mod endpoint;
pub mod error;

pub use dto::{
    AvailabilityRequest, AvailabilityResponse, DeployRequest, DeployResponse, DeployStatus,
    ErrorBody, EventsPage, FeedParams, HistoryParams, NodeInfo, MAX_PAGE_LIMIT, PROTOCOL_VERSION,
};
pub use endpoint::{endpoints, HealthResponse};
pub use error::{ProtocolError, ProtocolResult};
