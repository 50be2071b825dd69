//! Request handlers for the Atlas HTTP surface.
//!
//! Thin translations between wire DTOs and the node: parameters are
//! validated into domain types here, and everything else is delegated.

use std::collections::BTreeMap;

use axum::extract::{Path, Query, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Json, Response};
use serde::Deserialize;

use atlas_engine::DeployOutcome;
use atlas_history::HistoryQuery;
use atlas_protocol::{
    AvailabilityRequest, AvailabilityResponse, DeployRequest, DeployResponse, DeployStatus,
    EventsPage, FeedParams, HealthResponse, HistoryParams, NodeInfo, ProtocolError,
    MAX_PAGE_LIMIT, PROTOCOL_VERSION,
};
use atlas_sync::{CycleReport, PeerRecord};
use atlas_types::{
    AuditInfo, ContentHash, Deployment, Entity, EntityKind, Pointer, ServerName, Timestamp,
};

use crate::error::{ServerError, ServerResult};
use crate::state::AppState;

pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse::default())
}

pub async fn info(State(state): State<AppState>) -> ServerResult<Json<NodeInfo>> {
    let status = state.node.status()?;
    Ok(Json(NodeInfo {
        server_name: status.server_name,
        version: env!("CARGO_PKG_VERSION").to_string(),
        protocol_version: PROTOCOL_VERSION,
        entities: status.stats.entities,
        active_entities: status.stats.active_entities,
        occupied_pointers: status.stats.occupied_pointers,
        events: status.stats.events,
        latest_timestamp: status.latest_timestamp,
    }))
}

/// `POST /v1/deployments`: deploy an entity at this server.
pub async fn deploy(
    State(state): State<AppState>,
    Json(request): Json<DeployRequest>,
) -> ServerResult<Json<DeployResponse>> {
    let files = request.decode_files()?;
    let receipt = state
        .node
        .deploy_local(request.entity, files, request.auth_chain)?;
    Ok(Json(DeployResponse {
        entity_id: receipt.entity_id,
        timestamp: receipt.timestamp,
        outcome: deploy_status(receipt.outcome),
    }))
}

fn deploy_status(outcome: DeployOutcome) -> DeployStatus {
    match outcome {
        DeployOutcome::Applied { superseded } => DeployStatus::Applied { superseded },
        DeployOutcome::Superseded { by, retired } => DeployStatus::Superseded { by, retired },
        DeployOutcome::AlreadyKnown => DeployStatus::AlreadyKnown,
    }
}

/// `GET /v1/deployments/feed`: ascending event feed for peers.
pub async fn deployment_feed(
    State(state): State<AppState>,
    Query(params): Query<FeedParams>,
) -> ServerResult<Json<EventsPage>> {
    let after = Timestamp::from_millis(params.after.unwrap_or(0));
    let events = state.node.events_after(after, page_limit(params.limit))?;
    Ok(Json(EventsPage { events }))
}

#[derive(Debug, Deserialize)]
pub struct DeploymentParams {
    /// Origin server, for entities deployed from more than one.
    pub server: Option<String>,
}

/// `GET /v1/deployments/:id`: the full deployment behind a feed event.
pub async fn get_deployment(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(params): Query<DeploymentParams>,
) -> ServerResult<Json<Deployment>> {
    let id = ContentHash::from_hex(&id)?;
    let origin = params.server.map(ServerName::new).transpose()?;
    let (entity, audit) = state
        .node
        .deployment(&id, origin.as_ref())?
        .ok_or_else(|| ServerError::NotFound(format!("deployment {}", id.short_hex())))?;
    Ok(Json(Deployment::new(entity, audit)))
}

/// `GET /v1/history`: read-ordered history with inclusive bounds.
pub async fn history(
    State(state): State<AppState>,
    Query(params): Query<HistoryParams>,
) -> ServerResult<Json<EventsPage>> {
    let query = HistoryQuery {
        from: params.from.map(Timestamp::from_millis),
        to: params.to.map(Timestamp::from_millis),
        offset: params.offset.unwrap_or(0),
        limit: page_limit(params.limit),
    };
    let events = state.node.history(&query)?;
    Ok(Json(EventsPage { events }))
}

/// `GET /v1/active`: the whole active map, kind by kind.
pub async fn active_map(
    State(state): State<AppState>,
) -> ServerResult<Json<BTreeMap<EntityKind, BTreeMap<Pointer, ContentHash>>>> {
    Ok(Json(state.node.active_map()?))
}

#[derive(Debug, Deserialize)]
pub struct ActiveParams {
    pub pointer: Option<String>,
}

/// `GET /v1/active/:kind`: occupied pointers of one kind, or a single
/// pointer's active entity id when `?pointer=` is given.
pub async fn active_for_kind(
    State(state): State<AppState>,
    Path(kind): Path<String>,
    Query(params): Query<ActiveParams>,
) -> ServerResult<Response> {
    let kind = EntityKind::new(kind)?;
    match params.pointer {
        Some(raw) => {
            let pointer = Pointer::new(raw)?;
            let id = state.node.active_id(&kind, &pointer)?.ok_or_else(|| {
                ServerError::NotFound(format!("no active entity at {kind}/{pointer}"))
            })?;
            Ok(Json(id).into_response())
        }
        None => Ok(Json(state.node.active_entities(&kind)?).into_response()),
    }
}

/// `GET /v1/entities?kind=scene&pointer=a&pointer=b`: distinct active
/// entities of a kind, narrowed to the named pointers when any are given.
///
/// `pointer` repeats, so the query string is parsed as raw pairs rather
/// than a typed struct.
pub async fn entities(
    State(state): State<AppState>,
    Query(params): Query<Vec<(String, String)>>,
) -> ServerResult<Json<Vec<Entity>>> {
    let mut kind = None;
    let mut pointers = Vec::new();
    for (key, value) in params {
        match key.as_str() {
            "kind" => kind = Some(EntityKind::new(value)?),
            "pointer" => pointers.push(Pointer::new(value)?),
            _ => {}
        }
    }
    let kind = kind.ok_or(ServerError::Protocol(ProtocolError::InvalidParameter {
        name: "kind",
        reason: "required".to_string(),
    }))?;
    if pointers.is_empty() {
        pointers = state.node.active_entities(&kind)?.into_keys().collect();
    }
    Ok(Json(state.node.entities_at(&kind, &pointers)?))
}

/// `GET /v1/entities/:id`: one entity by content address, active or not.
pub async fn get_entity(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ServerResult<Json<Entity>> {
    let id = ContentHash::from_hex(&id)?;
    let entity = state
        .node
        .entity(&id)?
        .ok_or_else(|| ServerError::NotFound(format!("entity {}", id.short_hex())))?;
    Ok(Json(entity))
}

/// `GET /v1/audit/:id`: every audit record for an entity. A recorded
/// entity always has at least one, so an empty result is a 404.
pub async fn audit(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ServerResult<Json<Vec<AuditInfo>>> {
    let id = ContentHash::from_hex(&id)?;
    let audits = state.node.audits_for(&id)?;
    if audits.is_empty() {
        return Err(ServerError::NotFound(format!("entity {}", id.short_hex())));
    }
    Ok(Json(audits))
}

/// `GET /v1/content/:hash`: raw content bytes.
pub async fn get_content(
    State(state): State<AppState>,
    Path(hash): Path<String>,
) -> ServerResult<impl IntoResponse> {
    let hash = ContentHash::from_hex(&hash)?;
    let bytes = state
        .node
        .content(&hash)?
        .ok_or_else(|| ServerError::NotFound(format!("content {}", hash.short_hex())))?;
    Ok((
        [(header::CONTENT_TYPE, "application/octet-stream")],
        bytes,
    ))
}

/// `POST /v1/content/available`: which of the given hashes this server
/// can serve.
pub async fn content_available(
    State(state): State<AppState>,
    Json(request): Json<AvailabilityRequest>,
) -> ServerResult<Json<AvailabilityResponse>> {
    let present = state.node.available_content(&request.hashes)?;
    Ok(Json(AvailabilityResponse { present }))
}

/// `GET /v1/servers`: the peer directory as this server sees it.
pub async fn list_servers(State(state): State<AppState>) -> ServerResult<Json<Vec<PeerRecord>>> {
    Ok(Json(state.directory.list_servers().await?))
}

/// `POST /v1/servers`: register or update one peer record.
pub async fn register_server(
    State(state): State<AppState>,
    Json(record): Json<PeerRecord>,
) -> ServerResult<StatusCode> {
    state.directory.register(record).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// `POST /v1/sync`: run a sync cycle now instead of waiting for the timer.
pub async fn trigger_sync(State(state): State<AppState>) -> ServerResult<Json<CycleReport>> {
    let coordinator = state
        .coordinator
        .as_ref()
        .ok_or(ServerError::SyncDisabled)?;
    Ok(Json(coordinator.run_cycle().await?))
}

fn page_limit(requested: Option<usize>) -> usize {
    requested.unwrap_or(MAX_PAGE_LIMIT).min(MAX_PAGE_LIMIT)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn page_limit_clamps_to_the_protocol_maximum() {
        assert_eq!(page_limit(None), MAX_PAGE_LIMIT);
        assert_eq!(page_limit(Some(10)), 10);
        assert_eq!(page_limit(Some(MAX_PAGE_LIMIT * 4)), MAX_PAGE_LIMIT);
    }
}
