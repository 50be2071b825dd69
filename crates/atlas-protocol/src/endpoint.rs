/// HTTP endpoint paths of the Atlas peer surface.
///
/// Entries with a trailing segment parameter list the prefix only; the
/// router appends `/:id`, `/:kind`, or `/:hash`.
pub mod endpoints {
    pub const INFO: &str = "/v1/info";
    pub const HEALTH: &str = "/v1/health";
    /// `POST` deploys locally; the feed and `/:id` lookups are reads.
    pub const DEPLOYMENTS: &str = "/v1/deployments";
    pub const DEPLOYMENT_FEED: &str = "/v1/deployments/feed";
    pub const HISTORY: &str = "/v1/history";
    pub const ACTIVE: &str = "/v1/active";
    pub const ENTITIES: &str = "/v1/entities";
    pub const AUDIT: &str = "/v1/audit";
    pub const CONTENT: &str = "/v1/content";
    pub const CONTENT_AVAILABLE: &str = "/v1/content/available";
    pub const SERVERS: &str = "/v1/servers";
    /// `POST` runs a sync cycle immediately.
    pub const SYNC: &str = "/v1/sync";
}

/// Health check response.
#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub protocol_version: u32,
}

impl Default for HealthResponse {
    fn default() -> Self {
        Self {
            status: "ok".into(),
            version: env!("CARGO_PKG_VERSION").into(),
            protocol_version: super::dto::PROTOCOL_VERSION,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn health_response_defaults() {
        let h = HealthResponse::default();
        assert_eq!(h.status, "ok");
        assert_eq!(h.protocol_version, 1);
    }

    #[test]
    fn endpoint_paths() {
        assert_eq!(endpoints::HEALTH, "/v1/health");
        assert_eq!(endpoints::DEPLOYMENT_FEED, "/v1/deployments/feed");
        assert_eq!(endpoints::CONTENT_AVAILABLE, "/v1/content/available");
        assert_eq!(endpoints::SERVERS, "/v1/servers");
    }
}
