use std::collections::{BTreeMap, HashMap, HashSet};
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use atlas_engine::DeployOutcome;
use atlas_node::{Node, NodeError};
use atlas_types::{Deployment, DeploymentEvent, DeploymentKey, ServerName, Timestamp};
use rand::Rng;
use serde::{Deserialize, Serialize};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::error::{SyncError, SyncResult};
use crate::traits::{PeerClient, PeerDial, PeerDirectory, PeerRecord};
use crate::watermark::WatermarkTable;

/// Tuning for the sync loop.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SyncConfig {
    /// Time between cycle starts.
    pub interval: Duration,
    /// Timeout applied to each individual peer request.
    pub request_timeout: Duration,
    /// Wall-clock budget for one cycle; peers not yet fetched when it
    /// runs out wait for the next cycle.
    pub cycle_deadline: Duration,
    /// Maximum feed events fetched per request.
    pub feed_page_limit: usize,
    /// Upper bound on the random delay before the first cycle, so a
    /// cluster booting together does not sync in lockstep.
    pub start_jitter: Duration,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(30),
            request_timeout: Duration::from_secs(5),
            cycle_deadline: Duration::from_secs(20),
            feed_page_limit: 256,
            start_jitter: Duration::from_secs(3),
        }
    }
}

/// Where the coordinator currently is in a cycle.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum CyclePhase {
    #[default]
    Idle,
    FetchingPeerList,
    FetchingDeployments,
    Applying,
}

/// What one sync cycle saw and did.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CycleReport {
    /// Peers whose feed was fetched, fully or in part.
    pub peers_polled: usize,
    /// Peers that could not be dialed or failed before any event landed.
    pub peers_failed: usize,
    /// Peers skipped because the cycle deadline ran out first.
    pub peers_abandoned: usize,
    /// Feed events received across all peers, duplicates included.
    pub events_seen: usize,
    /// Deployments recorded and activated.
    pub applied: usize,
    /// Deployments recorded but blocked by a newer overlap.
    pub stale: usize,
    /// Events already recorded locally.
    pub duplicates: usize,
    /// Events whose deployment failed validation and was discarded.
    pub rejected: usize,
    /// Events waiting on content; their watermarks did not pass them.
    pub held_back: usize,
}

/// What one peer's fetch phase produced.
///
/// `events` is the feed window in feed order. Every event ends up in
/// exactly one of `known`, `ready`, `held`, or `rejected`, except for a
/// tail that was never examined because the peer failed mid-fetch.
struct PeerFetch {
    server_name: ServerName,
    events: Vec<DeploymentEvent>,
    ready: HashMap<DeploymentKey, Deployment>,
    known: HashSet<DeploymentKey>,
    held: HashSet<DeploymentKey>,
    rejected: HashSet<DeploymentKey>,
}

impl PeerFetch {
    fn new(server_name: ServerName) -> Self {
        Self {
            server_name,
            events: Vec::new(),
            ready: HashMap::new(),
            known: HashSet::new(),
            held: HashSet::new(),
            rejected: HashSet::new(),
        }
    }
}

/// Pulls peers' deployment feeds and applies them to the local node.
///
/// A cycle runs in two phases: fetch everything first, then apply the
/// merged batch in replay order with no awaits in between. Peer and
/// deployment failures are scoped; a peer that cannot be reached or an
/// event that cannot be materialized is skipped and retried next cycle,
/// pinned by its origin's watermark.
pub struct SyncCoordinator {
    node: Arc<Node>,
    directory: Arc<dyn PeerDirectory>,
    dial: Arc<dyn PeerDial>,
    config: SyncConfig,
    watermarks: WatermarkTable,
    cycle_lock: tokio::sync::Mutex<()>,
    phase: Mutex<CyclePhase>,
}

impl SyncCoordinator {
    pub fn new(
        node: Arc<Node>,
        directory: Arc<dyn PeerDirectory>,
        dial: Arc<dyn PeerDial>,
        config: SyncConfig,
    ) -> Arc<Self> {
        Arc::new(Self {
            node,
            directory,
            dial,
            config,
            watermarks: WatermarkTable::new(),
            cycle_lock: tokio::sync::Mutex::new(()),
            phase: Mutex::new(CyclePhase::Idle),
        })
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    pub fn phase(&self) -> CyclePhase {
        *self.phase.lock().expect("phase lock poisoned")
    }

    /// Current watermark per origin server.
    pub fn watermarks(&self) -> BTreeMap<ServerName, Timestamp> {
        self.watermarks.snapshot()
    }

    /// Run one full cycle now, waiting for any cycle in flight to finish
    /// first. This is the manual trigger; the background loop uses
    /// [`spawn`](Self::spawn).
    pub async fn run_cycle(&self) -> SyncResult<CycleReport> {
        let _guard = self.cycle_lock.lock().await;
        self.cycle().await
    }

    /// Interval-driven entry: skips the tick when a cycle is already
    /// running instead of queueing behind it.
    async fn tick(&self) {
        let Ok(_guard) = self.cycle_lock.try_lock() else {
            debug!("previous sync cycle still running, skipping tick");
            return;
        };
        if let Err(error) = self.cycle().await {
            warn!(%error, "sync cycle failed");
        }
    }

    async fn cycle(&self) -> SyncResult<CycleReport> {
        let result = self.cycle_phases().await;
        self.set_phase(CyclePhase::Idle);
        result
    }

    async fn cycle_phases(&self) -> SyncResult<CycleReport> {
        let started = Instant::now();
        let mut report = CycleReport::default();

        self.set_phase(CyclePhase::FetchingPeerList);
        let records = self
            .with_timeout("peer listing", self.directory.list_servers())
            .await?;

        self.set_phase(CyclePhase::FetchingDeployments);
        let mut fetches: Vec<PeerFetch> = Vec::new();
        for record in records {
            if record.server_name == *self.node.server_name() {
                continue;
            }
            if started.elapsed() >= self.config.cycle_deadline {
                report.peers_abandoned += 1;
                warn!(peer = %record.server_name, "cycle deadline reached, peer deferred");
                continue;
            }
            match self.fetch_from_peer(&record, started).await {
                Ok(Some(fetch)) => {
                    report.peers_polled += 1;
                    fetches.push(fetch);
                }
                Ok(None) => {}
                Err(error) => {
                    report.peers_failed += 1;
                    warn!(peer = %record.server_name, %error, "peer skipped for this cycle");
                }
            }
        }

        self.set_phase(CyclePhase::Applying);
        // One deployment may arrive via several peers; apply it once.
        let mut batch: HashMap<DeploymentKey, Deployment> = HashMap::new();
        for fetch in &fetches {
            for (key, deployment) in &fetch.ready {
                batch
                    .entry(key.clone())
                    .or_insert_with(|| deployment.clone());
            }
        }
        let mut deployments: Vec<Deployment> = batch.into_values().collect();
        deployments.sort_by(|a, b| DeploymentEvent::replay_order(&a.event(), &b.event()));

        let mut covered: HashSet<DeploymentKey> = HashSet::new();
        for deployment in deployments {
            let key = deployment.key();
            match self.node.apply_remote(deployment) {
                Ok(DeployOutcome::Applied { .. }) => {
                    report.applied += 1;
                    covered.insert(key);
                }
                Ok(DeployOutcome::Superseded { .. }) => {
                    report.stale += 1;
                    covered.insert(key);
                }
                Ok(DeployOutcome::AlreadyKnown) => {
                    report.duplicates += 1;
                    covered.insert(key);
                }
                Err(NodeError::MissingContent { name, hash }) => {
                    // Content verified during fetch has gone missing; the
                    // watermark stays behind the event and the next cycle
                    // retries.
                    report.held_back += 1;
                    warn!(%key, file = %name, %hash, "content lost between fetch and apply");
                }
                Err(error) => return Err(error.into()),
            }
        }

        for fetch in &fetches {
            report.events_seen += fetch.events.len();
            report.duplicates += fetch.known.len();
            report.rejected += fetch.rejected.len();
            report.held_back += fetch.held.len();

            let is_covered = |event: &DeploymentEvent| {
                let key = event.key();
                fetch.known.contains(&key)
                    || fetch.rejected.contains(&key)
                    || covered.contains(&key)
            };
            if let Some(cap) = watermark_cap(&fetch.events, is_covered) {
                if self.watermarks.advance(&fetch.server_name, cap) {
                    debug!(peer = %fetch.server_name, watermark = %cap, "watermark advanced");
                }
            }
        }

        if report.events_seen > 0 {
            info!(
                peers = report.peers_polled,
                events = report.events_seen,
                applied = report.applied,
                stale = report.stale,
                duplicates = report.duplicates,
                held_back = report.held_back,
                "sync cycle finished"
            );
        } else {
            debug!(peers = report.peers_polled, "sync cycle found nothing new");
        }
        Ok(report)
    }

    /// Fetch one peer's feed window and materialize its deployments.
    ///
    /// Returns `Ok(None)` when the dialed peer turns out to be this
    /// server. Errors before the first page mean nothing was fetched;
    /// later failures keep the partial window, whose unexamined tail
    /// simply stays uncovered.
    async fn fetch_from_peer(
        &self,
        record: &PeerRecord,
        started: Instant,
    ) -> SyncResult<Option<PeerFetch>> {
        let client = self
            .with_timeout("dial", self.dial.dial(&record.address))
            .await?;
        let info = self.with_timeout("peer info", client.info()).await?;
        if info.server_name == *self.node.server_name() {
            debug!(address = %record.address, "directory listed this server, skipping");
            return Ok(None);
        }

        let mut fetch = PeerFetch::new(info.server_name);
        let mut after = self.watermarks.get(&fetch.server_name);

        'pages: loop {
            let mut page = self
                .with_timeout(
                    "events feed",
                    client.events_after(after, self.config.feed_page_limit),
                )
                .await?;
            if page.is_empty() {
                break;
            }
            let full = page.len() >= self.config.feed_page_limit;
            if full {
                // The feed cursor is strictly-after by timestamp, so a
                // timestamp group split across the page boundary would be
                // skipped. Defer the trailing group to the next request,
                // which re-fetches it from its first event.
                let tail = page[page.len() - 1].timestamp;
                let cut = page.partition_point(|e| e.timestamp < tail);
                if cut > 0 {
                    page.truncate(cut);
                }
            }
            after = page[page.len() - 1].timestamp;

            for event in page {
                let key = event.key();
                if self.node.contains(&key)? {
                    fetch.known.insert(key);
                } else {
                    match self.materialize(client.as_ref(), &fetch.server_name, &event).await {
                        Ok(deployment) => {
                            fetch.ready.insert(key, deployment);
                        }
                        Err(SyncError::ContentUnavailable(hash)) => {
                            warn!(
                                peer = %fetch.server_name,
                                %event,
                                %hash,
                                "content unavailable, holding event back"
                            );
                            fetch.held.insert(key);
                        }
                        Err(SyncError::Protocol { reason, .. }) => {
                            warn!(
                                peer = %fetch.server_name,
                                %event,
                                %reason,
                                "discarding deployment that failed validation"
                            );
                            fetch.rejected.insert(key);
                        }
                        Err(error) => {
                            warn!(peer = %fetch.server_name, %event, %error, "peer fetch aborted");
                            fetch.events.push(event);
                            break 'pages;
                        }
                    }
                }
                fetch.events.push(event);
            }

            if !full || started.elapsed() >= self.config.cycle_deadline {
                break;
            }
        }

        Ok(Some(fetch))
    }

    /// Turn a feed event into an applicable deployment: fetch the full
    /// record, check it against the event, and pull any content files the
    /// local store is missing.
    async fn materialize(
        &self,
        client: &dyn PeerClient,
        peer: &ServerName,
        event: &DeploymentEvent,
    ) -> SyncResult<Deployment> {
        let deployment = self
            .with_timeout(
                "deployment fetch",
                client.fetch_deployment(event.entity_id, &event.server_name),
            )
            .await?;
        if deployment.event() != *event {
            return Err(SyncError::Protocol {
                peer: peer.to_string(),
                reason: format!("deployment does not match feed event {event}"),
            });
        }
        deployment.validate().map_err(|e| SyncError::Protocol {
            peer: peer.to_string(),
            reason: e.to_string(),
        })?;

        let hashes: Vec<_> = deployment.entity.content.values().copied().collect();
        let missing = self.node.missing_content(&hashes)?;
        if !missing.is_empty() {
            let present = self
                .with_timeout("content availability", client.available_content(&missing))
                .await?;
            if let Some(absent) = missing.iter().find(|h| !present.contains(h)) {
                return Err(SyncError::ContentUnavailable(*absent));
            }
            for hash in missing {
                let bytes = self
                    .with_timeout("content fetch", client.fetch_content(hash))
                    .await?;
                self.node.store_content(hash, bytes).map_err(|e| match e {
                    NodeError::Store(atlas_store::StoreError::HashMismatch { .. }) => {
                        SyncError::Protocol {
                            peer: peer.to_string(),
                            reason: format!("content {} did not match its hash", hash.short_hex()),
                        }
                    }
                    other => SyncError::Node(other),
                })?;
            }
        }
        Ok(deployment)
    }

    async fn with_timeout<T, F>(&self, operation: &'static str, fut: F) -> SyncResult<T>
    where
        F: Future<Output = SyncResult<T>>,
    {
        match tokio::time::timeout(self.config.request_timeout, fut).await {
            Ok(result) => result,
            Err(_) => Err(SyncError::Timeout {
                operation,
                after: self.config.request_timeout,
            }),
        }
    }

    fn set_phase(&self, phase: CyclePhase) {
        *self.phase.lock().expect("phase lock poisoned") = phase;
    }

    /// Start the background loop. The returned handle owns it: dropping
    /// the handle stops the loop after the cycle in flight, if any.
    pub fn spawn(self: &Arc<Self>) -> SyncHandle {
        let coordinator = Arc::clone(self);
        let (shutdown_tx, mut shutdown_rx) = oneshot::channel::<()>();
        let task = tokio::spawn(async move {
            let jitter = coordinator.config.start_jitter;
            if !jitter.is_zero() {
                let delay = rand::thread_rng().gen_range(0..=jitter.as_millis() as u64);
                tokio::time::sleep(Duration::from_millis(delay)).await;
            }
            let mut ticker = tokio::time::interval(coordinator.config.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            info!(interval = ?coordinator.config.interval, "sync loop started");
            loop {
                tokio::select! {
                    _ = &mut shutdown_rx => {
                        info!("sync loop stopped");
                        break;
                    }
                    _ = ticker.tick() => coordinator.tick().await,
                }
            }
        });
        SyncHandle {
            shutdown: Some(shutdown_tx),
            task,
        }
    }
}

impl std::fmt::Debug for SyncCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncCoordinator")
            .field("server", self.node.server_name())
            .field("phase", &self.phase())
            .field("watermarks", &self.watermarks.len())
            .finish()
    }
}

/// Highest watermark the events justify: the timestamp of the last
/// covered event, or just before the first uncovered one. `None` means
/// the watermark cannot move at all.
fn watermark_cap<F>(events: &[DeploymentEvent], covered: F) -> Option<Timestamp>
where
    F: Fn(&DeploymentEvent) -> bool,
{
    for (i, event) in events.iter().enumerate() {
        if !covered(event) {
            return if i == 0 {
                None
            } else {
                // Claiming the uncovered event's own timestamp would skip
                // it forever; stop one millisecond short and let the next
                // cycle re-fetch the boundary.
                event
                    .timestamp
                    .as_millis()
                    .checked_sub(1)
                    .map(Timestamp::from_millis)
            };
        }
    }
    events.last().map(|e| e.timestamp)
}

/// Owner handle for the background sync loop.
pub struct SyncHandle {
    shutdown: Option<oneshot::Sender<()>>,
    task: JoinHandle<()>,
}

impl SyncHandle {
    /// Signal the loop and wait for the cycle in flight to finish.
    pub async fn shutdown(mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        let _ = self.task.await;
    }

    /// Tear the loop down without waiting.
    pub fn abort(&self) {
        self.task.abort();
    }
}

#[cfg(test)]
mod tests {
    use atlas_types::{ContentHash, EntityKind};

    use super::*;

    fn event(ts: u64, server: &str, id_byte: u8) -> DeploymentEvent {
        DeploymentEvent {
            entity_id: ContentHash::from_hash([id_byte; 32]),
            kind: EntityKind::new("scene").unwrap(),
            server_name: ServerName::new(server).unwrap(),
            timestamp: Timestamp::from_millis(ts),
        }
    }

    #[test]
    fn cap_reaches_the_last_covered_event() {
        let events = vec![event(100, "a", 1), event(200, "a", 2)];
        assert_eq!(
            watermark_cap(&events, |_| true),
            Some(Timestamp::from_millis(200))
        );
    }

    #[test]
    fn cap_is_none_when_nothing_was_covered() {
        let events = vec![event(100, "a", 1)];
        assert_eq!(watermark_cap(&events, |_| false), None);
        assert_eq!(watermark_cap(&[], |_| true), None);
    }

    #[test]
    fn cap_stops_just_before_the_first_gap() {
        let events = vec![event(100, "a", 1), event(250, "a", 2), event(300, "a", 3)];
        let gap = events[1].key();
        let cap = watermark_cap(&events, |e| e.key() != gap);
        assert_eq!(cap, Some(Timestamp::from_millis(249)));
    }

    #[test]
    fn cap_backs_off_within_an_equal_timestamp_group() {
        // First event processed, second at the same millisecond held back:
        // the cap must not claim that millisecond.
        let events = vec![event(100, "a", 1), event(100, "b", 2)];
        let gap = events[1].key();
        let cap = watermark_cap(&events, |e| e.key() != gap);
        assert_eq!(cap, Some(Timestamp::from_millis(99)));
    }

    #[test]
    fn cap_cannot_go_below_zero() {
        let events = vec![event(0, "a", 1), event(0, "b", 2)];
        let gap = events[1].key();
        assert_eq!(watermark_cap(&events, |e| e.key() != gap), None);
    }

    #[test]
    fn default_config_covers_a_cycle() {
        let config = SyncConfig::default();
        assert!(config.cycle_deadline <= config.interval);
        assert!(config.request_timeout < config.cycle_deadline);
        assert!(config.feed_page_limit > 0);
    }
}
