//! The engine owns all agent state and reacts to host events.
//!
//! Every entry point follows the same shape:
//!
//! 1. Take the state lock, apply the mutation synchronously, release it
//! 2. Broadcast a fresh snapshot if anything changed
//! 3. Only then await collaborators (history lookups, dispatch, host control)
//!
//! The lock is never held across an await. Any mutation that follows an
//! await re-checks that the agent still exists.

use std::sync::Arc;

use parking_lot::RwLock;
use serde::Deserialize;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use tabhive_config::AppConfig;
use tabhive_core::agent::{AgentContext, AgentId, AgentStatus, TemporalSnapshot};
use tabhive_core::clock::{Clock, SystemClock};
use tabhive_core::envelope::Envelope;
use tabhive_core::error::{BridgeError, Error};
use tabhive_core::event::{EngineEvent, EventSource, LifecycleEvent};
use tabhive_core::history::{HistoryEvent, HistoryProvider, HistoryQuery, HistoryRecord};
use tabhive_core::runtime::RuntimeContext;
use tabhive_core::snapshot::{Snapshot, SnapshotReason, SnapshotSubscriber};
use tabhive_core::transport::{DispatchTransport, HostControl};

use crate::classify::classify_url;
use crate::dispatch::{AgentLiveness, DispatchController, RetryPolicy};
use crate::history::HistoryCache;
use crate::registry::AgentRegistry;
use crate::resolve::{Candidate, TargetMatch, TargetQuery, TargetResolver};
use crate::runtime_context::RuntimeContextStore;
use crate::snapshot::{BroadcastReport, SnapshotBuilder, SubscriptionBroadcaster};

/// History records fetched when an agent lands on an uncached url.
const READ_THROUGH_LIMIT: usize = 10;

/// Everything guarded by the engine lock.
#[derive(Debug)]
struct EngineState {
    registry: AgentRegistry,
    history: HistoryCache,
    runtime: RuntimeContextStore,
}

/// A mutation that was applied and should be broadcast.
#[derive(Debug)]
struct Applied {
    reason: SnapshotReason,
    /// Url to look up in the history log once the lock is released.
    lookup: Option<String>,
}

impl Applied {
    fn new(reason: SnapshotReason) -> Self {
        Self {
            reason,
            lookup: None,
        }
    }
}

/// Page content an agent may report back after an action.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PageDigest {
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    text_excerpt: Option<String>,
    #[serde(default)]
    details: Option<serde_json::Value>,
}

impl EngineState {
    fn apply_lifecycle(&mut self, event: LifecycleEvent, now: i64) -> Option<Applied> {
        match event {
            LifecycleEvent::AgentCreated { agent_id, url } => {
                if self.registry.contains(&agent_id) {
                    return self.update_agent(&agent_id, Some(url), None, None, now);
                }
                Some(self.create_agent(agent_id, url, None, None, now))
            }
            LifecycleEvent::AgentUpdated {
                agent_id,
                url,
                title,
                status,
            } => {
                if self.registry.contains(&agent_id) {
                    return self.update_agent(&agent_id, url, title, status, now);
                }
                // Adopt agents that existed before the engine started
                match url {
                    Some(url) => Some(self.create_agent(agent_id, url, title, status, now)),
                    None => {
                        debug!(agent_id = %agent_id, "Update for unknown agent ignored");
                        None
                    }
                }
            }
            LifecycleEvent::AgentRemoved { agent_id } => {
                self.registry.remove(&agent_id)?;
                Some(Applied::new(SnapshotReason::AgentRemoved))
            }
            LifecycleEvent::AgentActivated { agent_id } => {
                let previous = self.registry.temporal().foreground().cloned();
                self.registry
                    .temporal_mut()
                    .set_foreground(Some(&agent_id), now);
                if let Some(previous) = previous.filter(|p| p != &agent_id) {
                    self.registry.refresh_derived(&previous, now, &self.history);
                }
                self.registry.refresh_derived(&agent_id, now, &self.history);
                Some(Applied::new(SnapshotReason::AgentActivated))
            }
            LifecycleEvent::HostFocusChanged { host_id } => {
                self.registry
                    .temporal_mut()
                    .host_focus_changed(host_id.is_some(), now);
                if let Some(foreground) = self.registry.temporal().foreground().cloned() {
                    self.registry.refresh_derived(&foreground, now, &self.history);
                }
                Some(Applied::new(SnapshotReason::HostFocusChanged))
            }
        }
    }

    fn create_agent(
        &mut self,
        agent_id: AgentId,
        url: String,
        title: Option<String>,
        status: Option<AgentStatus>,
        now: i64,
    ) -> Applied {
        let mut context = AgentContext::new(agent_id.clone(), url.clone());
        context.classification = classify_url(&url);
        if let Some(title) = title {
            context.title = title;
        }
        if let Some(status) = status {
            context.status = status;
        }
        self.registry.upsert(context, now);
        self.registry.refresh_derived(&agent_id, now, &self.history);
        Applied {
            reason: SnapshotReason::AgentCreated,
            lookup: self.lookup_for(&url),
        }
    }

    fn update_agent(
        &mut self,
        agent_id: &AgentId,
        url: Option<String>,
        title: Option<String>,
        status: Option<AgentStatus>,
        now: i64,
    ) -> Option<Applied> {
        let before = self.registry.get(agent_id)?.clone();
        let mut context = before.clone();

        let mut navigated = false;
        if let Some(url) = url.filter(|u| *u != context.url) {
            context.url = url;
            context.classification = classify_url(&context.url);
            // Content describes the previous page
            context.description.clear();
            context.text_excerpt.clear();
            context.details = serde_json::Value::Null;
            navigated = true;
        }
        if let Some(title) = title {
            context.title = title;
        }
        if let Some(status) = status {
            context.status = status;
        }

        if context == before {
            return None;
        }

        let lookup = if navigated {
            self.registry.temporal_mut().navigated(agent_id, now);
            self.lookup_for(&context.url)
        } else {
            self.registry.temporal_mut().touch(agent_id, now);
            None
        };
        self.registry.upsert(context, now);
        self.registry.refresh_derived(agent_id, now, &self.history);
        Some(Applied {
            reason: SnapshotReason::AgentUpdated,
            lookup,
        })
    }

    fn apply_history(&mut self, event: HistoryEvent) -> bool {
        match event {
            HistoryEvent::Visited(record) => self.merge_history(vec![record]),
            HistoryEvent::VisitsRemoved { urls } => {
                let removed = urls
                    .iter()
                    .filter(|url| self.history.remove(url).is_some())
                    .count();
                self.registry.rejoin_history(&self.history);
                removed > 0
            }
            HistoryEvent::AllVisitsRemoved => {
                let removed = self.history.clear();
                self.registry.rejoin_history(&self.history);
                removed > 0
            }
        }
    }

    fn merge_history(&mut self, records: Vec<HistoryRecord>) -> bool {
        let changed = self.history.prime(records);
        if changed > 0 {
            self.registry.rejoin_history(&self.history);
        }
        changed > 0
    }

    /// Fold content an agent reported into its record.
    fn fold_digest(&mut self, agent_id: &AgentId, digest: PageDigest, now: i64) -> bool {
        let Some(before) = self.registry.get(agent_id).cloned() else {
            return false;
        };
        let mut context = before.clone();
        if let Some(title) = digest.title.filter(|t| !t.is_empty()) {
            context.title = title;
        }
        if let Some(description) = digest.description {
            context.description = description;
        }
        if let Some(excerpt) = digest.text_excerpt {
            context.text_excerpt = excerpt;
        }
        if let Some(details) = digest.details.filter(|d| !d.is_null()) {
            context.details = details;
        }
        if context == before {
            return false;
        }
        self.registry.upsert(context, now);
        self.registry.refresh_derived(agent_id, now, &self.history);
        true
    }

    fn lookup_for(&self, url: &str) -> Option<String> {
        let web = url.starts_with("https://") || url.starts_with("http://");
        (web && !self.history.contains(url)).then(|| url.to_string())
    }
}

/// The agent engine.
pub struct Engine {
    state: RwLock<EngineState>,
    clock: Arc<dyn Clock>,
    builder: SnapshotBuilder,
    broadcaster: SubscriptionBroadcaster,
    dispatcher: DispatchController,
    resolver: TargetResolver,
    host: Arc<dyn HostControl>,
    history_provider: Arc<dyn HistoryProvider>,
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.read();
        f.debug_struct("Engine")
            .field("agents", &state.registry.len())
            .field("history", &state.history.len())
            .field("broadcaster", &self.broadcaster)
            .finish()
    }
}

impl Engine {
    /// Create an engine over the host's collaborators.
    pub fn new(
        config: &AppConfig,
        transport: Arc<dyn DispatchTransport>,
        host: Arc<dyn HostControl>,
        history_provider: Arc<dyn HistoryProvider>,
    ) -> Self {
        Self {
            state: RwLock::new(EngineState {
                registry: AgentRegistry::new(),
                history: HistoryCache::new(config.engine.history_capacity),
                runtime: RuntimeContextStore::new(),
            }),
            clock: Arc::new(SystemClock),
            builder: SnapshotBuilder::new(config.engine.snapshot_history_limit),
            broadcaster: SubscriptionBroadcaster::new(config.engine.broadcast_capacity),
            dispatcher: DispatchController::new(transport, RetryPolicy::from(&config.dispatch)),
            resolver: TargetResolver::new(config.resolver.clone()),
            host,
            history_provider,
        }
    }

    /// Create an engine over a single object that plays every host role.
    pub fn from_host<H>(config: &AppConfig, host: Arc<H>) -> Self
    where
        H: DispatchTransport + HostControl + HistoryProvider + 'static,
    {
        Self::new(config, host.clone(), host.clone(), host)
    }

    /// Replace the wall clock (tests use `ManualClock`).
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn now(&self) -> i64 {
        self.clock.now_ms()
    }

    // --- Host events ---

    /// Apply a lifecycle event. Returns `None` when it changed nothing.
    pub async fn handle(&self, event: LifecycleEvent) -> Option<BroadcastReport> {
        let now = self.now();
        let applied = self.state.write().apply_lifecycle(event, now)?;
        let report = self.broadcast(applied.reason);
        if let Some(url) = applied.lookup {
            self.read_through(&url).await;
        }
        Some(report)
    }

    /// Apply a history push event.
    pub fn handle_history(&self, event: HistoryEvent) -> Option<BroadcastReport> {
        let changed = self.state.write().apply_history(event);
        changed.then(|| self.broadcast(SnapshotReason::HistoryChanged))
    }

    /// Replace the runtime context. Always broadcasts.
    pub fn push_runtime_context(&self, mut context: RuntimeContext) -> BroadcastReport {
        if context.updated_at == 0 {
            context.updated_at = self.now();
        }
        self.state.write().runtime.replace(context);
        self.broadcast(SnapshotReason::RuntimeContextChanged)
    }

    /// Route any engine event to its handler.
    pub async fn apply(&self, event: EngineEvent) -> Option<BroadcastReport> {
        match event {
            EngineEvent::Lifecycle(event) => self.handle(event).await,
            EngineEvent::History(event) => self.handle_history(event),
            EngineEvent::RuntimeContext(context) => Some(self.push_runtime_context(context)),
        }
    }

    /// Drain an event source until it closes. Returns the number of events.
    pub async fn run(&self, source: &dyn EventSource) -> Result<usize, Error> {
        let mut events = source.start().await?;
        info!(source = source.name(), "Engine consuming events");

        let mut handled = 0usize;
        while let Some(event) = events.recv().await {
            self.apply(event).await;
            handled += 1;
        }

        info!(source = source.name(), handled, "Event source closed");
        Ok(handled)
    }

    // --- Snapshots ---

    /// Build a snapshot without broadcasting it.
    pub fn request_snapshot(&self) -> Arc<Snapshot> {
        Arc::new(self.build_snapshot(SnapshotReason::Requested))
    }

    pub fn subscribe(&self, subscriber: Arc<dyn SnapshotSubscriber>) {
        self.broadcaster.subscribe(subscriber);
    }

    pub fn unsubscribe(&self, name: &str) -> bool {
        self.broadcaster.unsubscribe(name)
    }

    /// A channel that receives every broadcast snapshot.
    pub fn snapshot_channel(&self) -> broadcast::Receiver<Arc<Snapshot>> {
        self.broadcaster.channel()
    }

    fn build_snapshot(&self, reason: SnapshotReason) -> Snapshot {
        let now = self.now();
        let state = self.state.read();
        self.builder
            .build(reason.as_str(), &state.registry, &state.history, &state.runtime, now)
    }

    fn broadcast(&self, reason: SnapshotReason) -> BroadcastReport {
        let snapshot = Arc::new(self.build_snapshot(reason));
        let report = self.broadcaster.broadcast(snapshot);
        debug!(
            reason = %reason,
            delivered = report.delivered,
            failed = report.failed,
            "Snapshot broadcast"
        );
        report
    }

    // --- Queries ---

    pub fn list_agents(&self) -> Vec<AgentContext> {
        self.state.read().registry.list()
    }

    pub fn get_agent(&self, agent_id: &AgentId) -> Option<AgentContext> {
        self.state.read().registry.get(agent_id).cloned()
    }

    pub fn agent_count(&self) -> usize {
        self.state.read().registry.len()
    }

    /// The foreground agent, if any.
    pub fn active_agent_id(&self) -> Option<AgentId> {
        self.state.read().registry.active_agent_id().cloned()
    }

    /// Live temporal figures, computed at call time rather than at the last event.
    pub fn temporal_snapshot(&self, agent_id: &AgentId) -> Option<TemporalSnapshot> {
        let now = self.now();
        self.state.read().registry.temporal().snapshot(agent_id, now)
    }

    pub fn recent_history(&self, limit: usize) -> Vec<HistoryRecord> {
        self.state.read().history.recent(limit)
    }

    /// Score live agents against a free-text selector.
    pub fn resolve_targets(&self, query: &TargetQuery) -> Vec<TargetMatch> {
        let state = self.state.read();
        let temporal = state.registry.temporal();
        let candidates: Vec<Candidate<'_>> = state
            .registry
            .iter()
            .map(|context| Candidate {
                context,
                last_foregrounded_at: temporal.last_foregrounded_at(&context.agent_id),
            })
            .collect();
        self.resolver.resolve(query, &candidates)
    }

    // --- Outbound operations ---

    /// Send an action to an agent through the dispatch controller.
    ///
    /// Page content in a successful result (`title`, `description`,
    /// `textExcerpt`, `details`) is folded back into the agent's record.
    pub async fn dispatch(
        &self,
        agent_id: &AgentId,
        action: &str,
        payload: serde_json::Value,
    ) -> Envelope {
        if !self.is_live(agent_id) {
            let error = BridgeError::NotFound(format!("agent {agent_id}"));
            return Envelope::failure(error.to_string());
        }

        let envelope = self.dispatcher.dispatch(agent_id, action, payload, self).await;

        if envelope.ok {
            let digest = envelope
                .result
                .as_ref()
                .filter(|r| r.is_object())
                .and_then(|r| serde_json::from_value::<PageDigest>(r.clone()).ok());
            if let Some(digest) = digest {
                let now = self.now();
                let folded = self.state.write().fold_digest(agent_id, digest, now);
                if folded {
                    self.broadcast(SnapshotReason::DispatchCompleted);
                } else if !self.is_live(agent_id) {
                    debug!(
                        agent_id = %agent_id,
                        action,
                        "Agent removed during dispatch; result not folded"
                    );
                }
            }
        }

        envelope
    }

    /// Bring an agent to the foreground.
    pub async fn focus_agent(&self, agent_id: &AgentId) -> Result<(), Error> {
        if !self.is_live(agent_id) {
            return Err(BridgeError::NotFound(format!("agent {agent_id}")).into());
        }
        self.host.focus(agent_id).await?;
        if self.is_live(agent_id) {
            self.handle(LifecycleEvent::AgentActivated {
                agent_id: agent_id.clone(),
            })
            .await;
        }
        info!(agent_id = %agent_id, "Agent focused");
        Ok(())
    }

    /// Close agents. Unknown ids are skipped; returns the ids actually closed.
    /// Fails with `NotFound` when none of the ids is live.
    pub async fn close_agents(&self, agent_ids: &[AgentId]) -> Result<Vec<AgentId>, Error> {
        let live: Vec<AgentId> = {
            let state = self.state.read();
            agent_ids
                .iter()
                .filter(|id| state.registry.contains(id))
                .cloned()
                .collect()
        };
        if live.is_empty() {
            let requested: Vec<&str> = agent_ids.iter().map(AgentId::as_str).collect();
            return Err(BridgeError::NotFound(format!("agents [{}]", requested.join(", "))).into());
        }

        self.host.close(&live).await?;
        for agent_id in &live {
            // No-op if the host's own removal event got here first
            self.handle(LifecycleEvent::AgentRemoved {
                agent_id: agent_id.clone(),
            })
            .await;
        }
        info!(count = live.len(), "Agents closed");
        Ok(live)
    }

    /// Search the history log. Results are primed into the cache.
    pub async fn search_history(&self, query: HistoryQuery) -> Result<Vec<HistoryRecord>, Error> {
        let records = self.history_provider.search(query).await?;
        let changed = self.state.write().merge_history(records.clone());
        if changed {
            self.broadcast(SnapshotReason::HistoryChanged);
        }
        Ok(records)
    }

    async fn read_through(&self, url: &str) {
        let query = HistoryQuery {
            text: url.to_string(),
            max_results: READ_THROUGH_LIMIT,
            start_time: None,
            end_time: None,
        };
        match self.history_provider.search(query).await {
            Ok(records) => {
                let exact: Vec<HistoryRecord> =
                    records.into_iter().filter(|r| r.url == url).collect();
                if exact.is_empty() {
                    return;
                }
                let changed = self.state.write().merge_history(exact);
                if changed {
                    self.broadcast(SnapshotReason::HistoryChanged);
                }
            }
            Err(e) => {
                warn!(
                    provider = self.history_provider.name(),
                    url,
                    error = %e,
                    "History lookup failed"
                );
            }
        }
    }
}

impl AgentLiveness for Engine {
    fn is_live(&self, agent_id: &AgentId) -> bool {
        self.state.read().registry.contains(agent_id)
    }
}
