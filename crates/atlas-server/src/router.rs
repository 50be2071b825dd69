use axum::routing::{get, post};
use axum::Router;
use tower_http::trace::TraceLayer;

use atlas_protocol::endpoints;

use crate::handler;
use crate::state::AppState;

/// Build the axum router over all Atlas endpoints.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route(endpoints::HEALTH, get(handler::health))
        .route(endpoints::INFO, get(handler::info))
        .route(endpoints::DEPLOYMENTS, post(handler::deploy))
        .route(endpoints::DEPLOYMENT_FEED, get(handler::deployment_feed))
        .route("/v1/deployments/:id", get(handler::get_deployment))
        .route(endpoints::HISTORY, get(handler::history))
        .route(endpoints::ACTIVE, get(handler::active_map))
        .route("/v1/active/:kind", get(handler::active_for_kind))
        .route(endpoints::ENTITIES, get(handler::entities))
        .route("/v1/entities/:id", get(handler::get_entity))
        .route("/v1/audit/:id", get(handler::audit))
        .route("/v1/content/:hash", get(handler::get_content))
        .route(endpoints::CONTENT_AVAILABLE, post(handler::content_available))
        .route(
            endpoints::SERVERS,
            get(handler::list_servers).post(handler::register_server),
        )
        .route(endpoints::SYNC, post(handler::trigger_sync))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
