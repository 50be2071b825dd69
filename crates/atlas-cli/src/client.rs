//! HTTP client for one Atlas server.

use anyhow::{anyhow, Result};
use bytes::Bytes;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Serialize;

use atlas_protocol::{
    endpoints, DeployRequest, DeployResponse, ErrorBody, EventsPage, HistoryParams, NodeInfo,
};
use atlas_sync::{CycleReport, PeerRecord};
use atlas_types::{AuditInfo, ContentHash, Entity};

pub struct ApiClient {
    client: Client,
    base_url: String,
}

impl ApiClient {
    pub fn new(base_url: &str) -> Result<Self> {
        let client = Client::builder()
            .user_agent(concat!("atlas-cli/", env!("CARGO_PKG_VERSION")))
            .timeout(std::time::Duration::from_secs(30))
            .build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    /// Turn a non-2xx response into an error carrying the server's message.
    async fn fail(response: reqwest::Response) -> anyhow::Error {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        match serde_json::from_str::<ErrorBody>(&body) {
            Ok(parsed) => anyhow!("{status}: {}", parsed.error),
            Err(_) => anyhow!("{status}: {body}"),
        }
    }

    async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let url = format!("{}{path}", self.base_url);
        let response = self.client.get(&url).send().await?;
        if !response.status().is_success() {
            return Err(Self::fail(response).await);
        }
        Ok(response.json().await?)
    }

    async fn post<T: DeserializeOwned, B: Serialize>(&self, path: &str, body: &B) -> Result<T> {
        let url = format!("{}{path}", self.base_url);
        let response = self.client.post(&url).json(body).send().await?;
        if !response.status().is_success() {
            return Err(Self::fail(response).await);
        }
        Ok(response.json().await?)
    }

    pub async fn info(&self) -> Result<NodeInfo> {
        self.get(endpoints::INFO).await
    }

    pub async fn deploy(&self, request: &DeployRequest) -> Result<DeployResponse> {
        self.post(endpoints::DEPLOYMENTS, request).await
    }

    pub async fn active_map(&self) -> Result<serde_json::Value> {
        self.get(endpoints::ACTIVE).await
    }

    pub async fn active_for_kind(&self, kind: &str) -> Result<serde_json::Value> {
        self.get(&format!("{}/{kind}", endpoints::ACTIVE)).await
    }

    pub async fn active_id(&self, kind: &str, pointer: &str) -> Result<ContentHash> {
        let query = encode_query(pointer);
        self.get(&format!("{}/{kind}?pointer={query}", endpoints::ACTIVE))
            .await
    }

    pub async fn history(&self, params: &HistoryParams) -> Result<EventsPage> {
        let mut path = format!("{}?", endpoints::HISTORY);
        if let Some(from) = params.from {
            path.push_str(&format!("from={from}&"));
        }
        if let Some(to) = params.to {
            path.push_str(&format!("to={to}&"));
        }
        if let Some(offset) = params.offset {
            path.push_str(&format!("offset={offset}&"));
        }
        if let Some(limit) = params.limit {
            path.push_str(&format!("limit={limit}&"));
        }
        self.get(path.trim_end_matches(['?', '&'])).await
    }

    pub async fn entity(&self, id: &str) -> Result<Entity> {
        self.get(&format!("{}/{id}", endpoints::ENTITIES)).await
    }

    pub async fn audits(&self, id: &str) -> Result<Vec<AuditInfo>> {
        self.get(&format!("{}/{id}", endpoints::AUDIT)).await
    }

    pub async fn content(&self, hash: &str) -> Result<Bytes> {
        let url = format!("{}{}/{hash}", self.base_url, endpoints::CONTENT);
        let response = self.client.get(&url).send().await?;
        if !response.status().is_success() {
            return Err(Self::fail(response).await);
        }
        Ok(response.bytes().await?)
    }

    pub async fn servers(&self) -> Result<Vec<PeerRecord>> {
        self.get(endpoints::SERVERS).await
    }

    pub async fn sync(&self) -> Result<CycleReport> {
        self.post(endpoints::SYNC, &serde_json::json!({})).await
    }
}

/// Percent-encode the characters that would change the query string's
/// meaning. Pointers are printable ASCII, so this short list is enough.
fn encode_query(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for ch in raw.chars() {
        match ch {
            '%' => out.push_str("%25"),
            '&' => out.push_str("%26"),
            '+' => out.push_str("%2B"),
            '#' => out.push_str("%23"),
            '=' => out.push_str("%3D"),
            '?' => out.push_str("%3F"),
            _ => out.push(ch),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pointer_encoding_escapes_query_metacharacters() {
        assert_eq!(encode_query("12,4"), "12,4");
        assert_eq!(encode_query("a&b=c"), "a%26b%3Dc");
        assert_eq!(encode_query("50%"), "50%25");
    }

    #[test]
    fn base_url_trailing_slash_is_trimmed() {
        let client = ApiClient::new("http://alpha:7600/").unwrap();
        assert_eq!(client.base_url, "http://alpha:7600");
    }
}
