//! In-process host: pages, history and an event stream held in memory.
//!
//! Drives the engine without a real browser, for replays, the demo gateway
//! and tests. Each simulated page can be told to drop its receiver, stay
//! loading, or answer with scripted results.

use std::collections::{BTreeMap, HashMap, VecDeque};

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::mpsc;

use tabhive_core::agent::{AgentId, AgentStatus};
use tabhive_core::envelope::Envelope;
use tabhive_core::error::{Error, HistoryError, TransportError};
use tabhive_core::event::{EngineEvent, EventSource, LifecycleEvent};
use tabhive_core::history::{HistoryProvider, HistoryQuery, HistoryRecord};
use tabhive_core::transport::{ActionMessage, DispatchTransport, HostControl, ReadinessProbe};

/// Capacity of the stream handed to the engine. Events beyond it wait in the
/// host's own queue rather than being dropped.
const EVENT_BUFFER: usize = 256;

/// A simulated page.
#[derive(Debug, Clone)]
pub struct HostPage {
    pub url: String,
    pub title: String,
    pub status: AgentStatus,
    /// Whether the bootstrap program is listening inside the page.
    pub listening: bool,
}

#[derive(Debug, Default)]
struct HostState {
    pages: BTreeMap<AgentId, HostPage>,
    history: Vec<HistoryRecord>,
    scripted: HashMap<AgentId, VecDeque<Result<Envelope, TransportError>>>,
    sent: Vec<(AgentId, ActionMessage)>,
    injected: Vec<AgentId>,
    focused: Vec<AgentId>,
    closed: Vec<AgentId>,
    /// Probes that report `loading` before the page flips to complete.
    loading_probes: HashMap<AgentId, u32>,
    /// Events produced before anyone called `start`.
    backlog: Vec<EngineEvent>,
    history_offline: bool,
}

/// An in-memory implementation of every host-facing trait.
#[derive(Debug, Default)]
pub struct InMemoryHost {
    state: Mutex<HostState>,
    events: Mutex<Option<mpsc::UnboundedSender<EngineEvent>>>,
}

impl InMemoryHost {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a listening, fully loaded page and announce it.
    pub fn open_page(&self, agent_id: impl Into<AgentId>, url: &str, title: &str) -> AgentId {
        let agent_id = agent_id.into();
        self.state.lock().pages.insert(
            agent_id.clone(),
            HostPage {
                url: url.to_string(),
                title: title.to_string(),
                status: AgentStatus::Complete,
                listening: true,
            },
        );
        self.emit(LifecycleEvent::AgentCreated {
            agent_id: agent_id.clone(),
            url: url.to_string(),
        });
        self.emit(LifecycleEvent::AgentUpdated {
            agent_id: agent_id.clone(),
            url: None,
            title: Some(title.to_string()),
            status: Some(AgentStatus::Complete),
        });
        agent_id
    }

    /// Simulate a torn-down bootstrap: sends fail until re-injected.
    pub fn drop_receiver(&self, agent_id: &AgentId) {
        if let Some(page) = self.state.lock().pages.get_mut(agent_id) {
            page.listening = false;
        }
    }

    /// Put the page into `loading` for the next `probes` readiness checks.
    pub fn begin_loading(&self, agent_id: &AgentId, probes: u32) {
        let mut state = self.state.lock();
        if let Some(page) = state.pages.get_mut(agent_id) {
            page.status = AgentStatus::Loading;
            state.loading_probes.insert(agent_id.clone(), probes);
        }
    }

    /// Queue a result for the next send to `agent_id`.
    pub fn script(&self, agent_id: &AgentId, result: Result<Envelope, TransportError>) {
        self.state
            .lock()
            .scripted
            .entry(agent_id.clone())
            .or_default()
            .push_back(result);
    }

    pub fn add_history(&self, record: HistoryRecord) {
        self.state.lock().history.push(record);
    }

    /// Make history searches fail until switched back on.
    pub fn set_history_offline(&self, offline: bool) {
        self.state.lock().history_offline = offline;
    }

    pub fn page(&self, agent_id: &AgentId) -> Option<HostPage> {
        self.state.lock().pages.get(agent_id).cloned()
    }

    /// Every message delivered to `agent_id`, in order.
    pub fn sent_to(&self, agent_id: &AgentId) -> Vec<ActionMessage> {
        self.state
            .lock()
            .sent
            .iter()
            .filter(|(id, _)| id == agent_id)
            .map(|(_, msg)| msg.clone())
            .collect()
    }

    /// Total send attempts across all agents.
    pub fn send_count(&self) -> usize {
        self.state.lock().sent.len()
    }

    pub fn injections(&self) -> Vec<AgentId> {
        self.state.lock().injected.clone()
    }

    pub fn focused(&self) -> Vec<AgentId> {
        self.state.lock().focused.clone()
    }

    pub fn closed(&self) -> Vec<AgentId> {
        self.state.lock().closed.clone()
    }

    /// Push an event to the running stream, or buffer it until `start`.
    ///
    /// Never blocks and never drops while the stream is open.
    pub fn emit(&self, event: impl Into<EngineEvent>) {
        let event = event.into();
        // Held across the backlog push so `start` cannot miss the event
        let events = self.events.lock();
        match events.as_ref() {
            Some(tx) => {
                if tx.send(event).is_err() {
                    tracing::warn!("In-memory host event stream is closed; event dropped");
                }
            }
            None => self.state.lock().backlog.push(event),
        }
    }

    /// Load a recorded session: pages follow the lifecycle events and every
    /// event is re-emitted in order.
    pub fn seed(&self, events: impl IntoIterator<Item = EngineEvent>) {
        for event in events {
            if let EngineEvent::Lifecycle(lifecycle) = &event {
                let mut state = self.state.lock();
                match lifecycle {
                    LifecycleEvent::AgentCreated { agent_id, url } => {
                        state.pages.insert(
                            agent_id.clone(),
                            HostPage {
                                url: url.clone(),
                                title: String::new(),
                                status: AgentStatus::Complete,
                                listening: true,
                            },
                        );
                    }
                    LifecycleEvent::AgentUpdated {
                        agent_id,
                        url,
                        title,
                        status,
                    } => {
                        if let Some(page) = state.pages.get_mut(agent_id) {
                            if let Some(url) = url {
                                page.url = url.clone();
                            }
                            if let Some(title) = title {
                                page.title = title.clone();
                            }
                            if let Some(status) = status {
                                page.status = *status;
                            }
                        }
                    }
                    LifecycleEvent::AgentRemoved { agent_id } => {
                        state.pages.remove(agent_id);
                    }
                    _ => {}
                }
            }
            self.emit(event);
        }
    }

    /// Stop the event stream; `Engine::run` returns once it drains.
    pub fn shutdown(&self) {
        self.events.lock().take();
    }
}

#[async_trait]
impl DispatchTransport for InMemoryHost {
    async fn send(
        &self,
        agent_id: &AgentId,
        message: &ActionMessage,
    ) -> Result<Envelope, TransportError> {
        let mut state = self.state.lock();
        state.sent.push((agent_id.clone(), message.clone()));

        if let Some(next) = state.scripted.get_mut(agent_id).and_then(|q| q.pop_front()) {
            return next;
        }

        let page = state
            .pages
            .get(agent_id)
            .ok_or_else(|| TransportError::Gone(format!("No tab with id: {agent_id}")))?;
        if page.status == AgentStatus::Loading {
            return Err(TransportError::NotReady(format!("tab {agent_id} is loading")));
        }
        if !page.listening {
            return Err(TransportError::Other(
                "Could not establish connection. Receiving end does not exist.".into(),
            ));
        }

        Ok(Envelope::success(serde_json::json!({
            "action": message.action,
            "url": page.url,
            "title": page.title,
        })))
    }

    async fn inject(
        &self,
        agent_id: &AgentId,
        _bootstrap_files: &[String],
    ) -> Result<(), TransportError> {
        let mut state = self.state.lock();
        state.injected.push(agent_id.clone());
        match state.pages.get_mut(agent_id) {
            Some(page) => {
                page.listening = true;
                Ok(())
            }
            None => Err(TransportError::Gone(format!("No tab with id: {agent_id}"))),
        }
    }

    async fn probe_readiness(&self, agent_id: &AgentId) -> ReadinessProbe {
        let mut state = self.state.lock();
        let remaining = state.loading_probes.get(agent_id).copied().unwrap_or(0);
        if remaining > 0 {
            state.loading_probes.insert(agent_id.clone(), remaining - 1);
        } else if let Some(page) = state.pages.get_mut(agent_id) {
            page.status = AgentStatus::Complete;
        }
        match state.pages.get(agent_id) {
            Some(page) => ReadinessProbe {
                found: true,
                status: Some(page.status),
                url: Some(page.url.clone()),
            },
            None => ReadinessProbe::default(),
        }
    }
}

#[async_trait]
impl HostControl for InMemoryHost {
    async fn focus(&self, agent_id: &AgentId) -> Result<(), TransportError> {
        {
            let mut state = self.state.lock();
            if !state.pages.contains_key(agent_id) {
                return Err(TransportError::Gone(format!("No tab with id: {agent_id}")));
            }
            state.focused.push(agent_id.clone());
        }
        self.emit(LifecycleEvent::AgentActivated {
            agent_id: agent_id.clone(),
        });
        Ok(())
    }

    async fn close(&self, agent_ids: &[AgentId]) -> Result<(), TransportError> {
        let removed: Vec<AgentId> = {
            let mut state = self.state.lock();
            let removed: Vec<AgentId> = agent_ids
                .iter()
                .filter(|id| state.pages.remove(*id).is_some())
                .cloned()
                .collect();
            state.closed.extend(removed.iter().cloned());
            removed
        };
        for agent_id in removed {
            self.emit(LifecycleEvent::AgentRemoved { agent_id });
        }
        Ok(())
    }
}

#[async_trait]
impl HistoryProvider for InMemoryHost {
    fn name(&self) -> &str {
        "in-memory"
    }

    async fn search(&self, query: HistoryQuery) -> Result<Vec<HistoryRecord>, HistoryError> {
        let state = self.state.lock();
        if state.history_offline {
            return Err(HistoryError::Unavailable("in-memory history is offline".into()));
        }
        let mut records: Vec<HistoryRecord> = state
            .history
            .iter()
            .filter(|r| query.matches(r))
            .cloned()
            .collect();
        records.sort_by(|a, b| b.last_visit_time.cmp(&a.last_visit_time));
        records.truncate(query.max_results);
        Ok(records)
    }
}

#[async_trait]
impl EventSource for InMemoryHost {
    fn name(&self) -> &str {
        "in-memory"
    }

    async fn start(&self) -> Result<mpsc::Receiver<EngineEvent>, Error> {
        let (tx, rx) = mpsc::channel(EVENT_BUFFER);
        let (queue, mut pending) = mpsc::unbounded_channel();
        {
            let mut events = self.events.lock();
            for event in self.state.lock().backlog.drain(..) {
                queue
                    .send(event)
                    .map_err(|e| Error::Internal(format!("event queue closed: {e}")))?;
            }
            *events = Some(queue);
        }

        // Forwards in order; ends once `shutdown` drops the queue or the
        // engine drops its receiver
        tokio::spawn(async move {
            while let Some(event) = pending.recv().await {
                if tx.send(event).await.is_err() {
                    break;
                }
            }
        });
        Ok(rx)
    }
}
