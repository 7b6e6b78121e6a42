//! Host events — what the platform tells the engine about its agents.
//!
//! The engine never polls the host. Everything it knows arrives as an
//! [`EngineEvent`] through an [`EventSource`] or a direct `handle` call.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::agent::{AgentId, AgentStatus};
use crate::error::Error;
use crate::history::HistoryEvent;
use crate::runtime::RuntimeContext;

/// Agent lifecycle notifications from the host platform.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LifecycleEvent {
    AgentCreated {
        agent_id: AgentId,
        url: String,
    },

    AgentUpdated {
        agent_id: AgentId,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        url: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        title: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        status: Option<AgentStatus>,
    },

    AgentRemoved {
        agent_id: AgentId,
    },

    /// The host brought this agent to the foreground.
    AgentActivated {
        agent_id: AgentId,
    },

    /// The host window gained (`Some`) or lost (`None`) focus.
    HostFocusChanged {
        #[serde(default)]
        host_id: Option<String>,
    },
}

impl LifecycleEvent {
    /// The agent this event is about, if any.
    pub fn agent_id(&self) -> Option<&AgentId> {
        match self {
            LifecycleEvent::AgentCreated { agent_id, .. }
            | LifecycleEvent::AgentUpdated { agent_id, .. }
            | LifecycleEvent::AgentRemoved { agent_id }
            | LifecycleEvent::AgentActivated { agent_id } => Some(agent_id),
            LifecycleEvent::HostFocusChanged { .. } => None,
        }
    }
}

/// Everything an event source can deliver.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EngineEvent {
    Lifecycle(LifecycleEvent),
    History(HistoryEvent),
    RuntimeContext(RuntimeContext),
}

impl From<LifecycleEvent> for EngineEvent {
    fn from(event: LifecycleEvent) -> Self {
        EngineEvent::Lifecycle(event)
    }
}

impl From<HistoryEvent> for EngineEvent {
    fn from(event: HistoryEvent) -> Self {
        EngineEvent::History(event)
    }
}

/// A producer of host events.
///
/// Implementations handle whatever wiring the platform needs (callbacks,
/// sockets, a replay file) and hand the engine a single ordered stream.
#[async_trait]
pub trait EventSource: Send + Sync {
    /// Human-readable source name (e.g. "extension", "replay").
    fn name(&self) -> &str;

    /// Start producing events. The stream ends when the source shuts down.
    async fn start(&self) -> std::result::Result<mpsc::Receiver<EngineEvent>, Error>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lifecycle_event_parses_from_json_line() {
        let line = r#"{"kind":"lifecycle","type":"agent_updated","agent_id":"7","title":"Inbox"}"#;
        let event: EngineEvent = serde_json::from_str(line).unwrap();
        match event {
            EngineEvent::Lifecycle(LifecycleEvent::AgentUpdated {
                agent_id, title, url, ..
            }) => {
                assert_eq!(agent_id.as_str(), "7");
                assert_eq!(title.as_deref(), Some("Inbox"));
                assert!(url.is_none());
            }
            other => panic!("Expected AgentUpdated, got: {other:?}"),
        }
    }

    #[test]
    fn focus_change_has_no_agent() {
        let event = LifecycleEvent::HostFocusChanged { host_id: None };
        assert!(event.agent_id().is_none());
    }
}
