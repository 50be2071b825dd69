use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use atlas_history::{JournalConfig, SyncMode};
use atlas_sync::SyncConfig;

use crate::error::{ServerError, ServerResult};

/// Top-level configuration for one Atlas server.
///
/// Everything has a default, so an empty TOML file (or none at all) yields a
/// standalone in-memory node on localhost.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Address the HTTP listener binds to.
    pub bind_addr: SocketAddr,
    /// This server's name in audit records and peer feeds. Must be unique
    /// across the cluster.
    pub server_name: String,
    /// Base URL peers should use to reach this server. Defaults to
    /// `http://{bind_addr}`, which is only right when peers share the host.
    pub advertise_url: Option<String>,
    /// Journal settings. Absent means an ephemeral node.
    pub journal: Option<JournalSection>,
    pub sync: SyncSection,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:7600".parse().expect("static addr"),
            server_name: "atlas-local".to_string(),
            advertise_url: None,
            journal: None,
            sync: SyncSection::default(),
        }
    }
}

impl ServerConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> ServerResult<Self> {
        let raw = std::fs::read_to_string(path.as_ref())?;
        toml::from_str(&raw).map_err(|e| ServerError::Config(e.to_string()))
    }

    /// The URL peers use to reach this server.
    pub fn advertised_url(&self) -> String {
        self.advertise_url
            .clone()
            .unwrap_or_else(|| format!("http://{}", self.bind_addr))
    }
}

/// Journal settings for a durable node.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct JournalSection {
    /// Journal file path. Parent directories must exist.
    pub path: PathBuf,
    /// `fsync` after every record instead of trusting the page cache.
    #[serde(default)]
    pub sync_every_write: bool,
}

impl JournalSection {
    pub fn journal_config(&self) -> JournalConfig {
        JournalConfig {
            sync_mode: if self.sync_every_write {
                SyncMode::EveryWrite
            } else {
                SyncMode::OsDefault
            },
        }
    }
}

/// Peer synchronization settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncSection {
    /// Run the periodic sync loop. Disable for a standalone node.
    pub enabled: bool,
    pub interval_ms: u64,
    pub request_timeout_ms: u64,
    pub cycle_deadline_ms: u64,
    pub feed_page_limit: usize,
    pub start_jitter_ms: u64,
    /// Seed peers, as base URLs. Resolved and registered at startup.
    pub peers: Vec<String>,
    /// Remote peer directory to register with and poll. Absent means this
    /// server keeps its own directory, seeded from `peers`.
    pub directory_url: Option<String>,
}

impl Default for SyncSection {
    fn default() -> Self {
        let defaults = SyncConfig::default();
        Self {
            enabled: true,
            interval_ms: defaults.interval.as_millis() as u64,
            request_timeout_ms: defaults.request_timeout.as_millis() as u64,
            cycle_deadline_ms: defaults.cycle_deadline.as_millis() as u64,
            feed_page_limit: defaults.feed_page_limit,
            start_jitter_ms: defaults.start_jitter.as_millis() as u64,
            peers: Vec::new(),
            directory_url: None,
        }
    }
}

impl SyncSection {
    pub fn sync_config(&self) -> SyncConfig {
        SyncConfig {
            interval: Duration::from_millis(self.interval_ms),
            request_timeout: Duration::from_millis(self.request_timeout_ms),
            cycle_deadline: Duration::from_millis(self.cycle_deadline_ms),
            feed_page_limit: self.feed_page_limit,
            start_jitter: Duration::from_millis(self.start_jitter_ms),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let c = ServerConfig::default();
        assert_eq!(c.bind_addr, "127.0.0.1:7600".parse::<SocketAddr>().unwrap());
        assert_eq!(c.server_name, "atlas-local");
        assert!(c.journal.is_none());
        assert!(c.sync.enabled);
        assert!(c.sync.peers.is_empty());
        assert_eq!(c.advertised_url(), "http://127.0.0.1:7600");
    }

    #[test]
    fn sync_section_mirrors_sync_config_defaults() {
        let section = SyncSection::default();
        let config = section.sync_config();
        assert_eq!(config, SyncConfig::default());
    }

    #[test]
    fn partial_toml_fills_in_defaults() {
        let raw = r#"
            server_name = "alpha"
            bind_addr = "0.0.0.0:8100"

            [sync]
            peers = ["http://beta:7600"]
            interval_ms = 5000
        "#;
        let c: ServerConfig = toml::from_str(raw).unwrap();
        assert_eq!(c.server_name, "alpha");
        assert_eq!(c.bind_addr, "0.0.0.0:8100".parse::<SocketAddr>().unwrap());
        assert_eq!(c.sync.peers, vec!["http://beta:7600".to_string()]);
        assert_eq!(c.sync.interval_ms, 5000);
        assert_eq!(c.sync.feed_page_limit, SyncConfig::default().feed_page_limit);
    }

    #[test]
    fn journal_section_selects_sync_mode() {
        let section = JournalSection {
            path: "/tmp/atlas.journal".into(),
            sync_every_write: true,
        };
        assert!(matches!(
            section.journal_config().sync_mode,
            SyncMode::EveryWrite
        ));
    }
}
