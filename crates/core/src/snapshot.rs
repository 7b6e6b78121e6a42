//! Snapshots: immutable, full-state aggregates handed to subscribers.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::agent::{AgentContext, AgentId};
use crate::error::SubscriberError;
use crate::history::HistoryRecord;
use crate::runtime::RuntimeContext;

/// Why a snapshot was produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SnapshotReason {
    AgentCreated,
    AgentUpdated,
    AgentRemoved,
    AgentActivated,
    HostFocusChanged,
    HistoryChanged,
    RuntimeContextChanged,
    DispatchCompleted,
    Requested,
}

impl SnapshotReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            SnapshotReason::AgentCreated => "agent_created",
            SnapshotReason::AgentUpdated => "agent_updated",
            SnapshotReason::AgentRemoved => "agent_removed",
            SnapshotReason::AgentActivated => "agent_activated",
            SnapshotReason::HostFocusChanged => "host_focus_changed",
            SnapshotReason::HistoryChanged => "history_changed",
            SnapshotReason::RuntimeContextChanged => "runtime_context_changed",
            SnapshotReason::DispatchCompleted => "dispatch_completed",
            SnapshotReason::Requested => "requested",
        }
    }
}

impl std::fmt::Display for SnapshotReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A point-in-time aggregate of engine state.
///
/// Never mutated after construction; a newer snapshot supersedes it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    pub reason: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub active_agent_id: Option<AgentId>,

    pub history: Vec<HistoryRecord>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub runtime_context: Option<RuntimeContext>,

    pub agents: Vec<AgentContext>,

    pub updated_at: i64,
}

impl Snapshot {
    /// Compare two snapshots ignoring when they were built.
    pub fn same_state_as(&self, other: &Snapshot) -> bool {
        self.active_agent_id == other.active_agent_id
            && self.history == other.history
            && self.runtime_context == other.runtime_context
            && self.agents == other.agents
    }

    pub fn agent(&self, agent_id: &AgentId) -> Option<&AgentContext> {
        self.agents.iter().find(|a| &a.agent_id == agent_id)
    }
}

/// A push consumer of snapshots.
///
/// Delivery is fire-and-forget: an error here is counted by the broadcaster
/// and otherwise ignored.
pub trait SnapshotSubscriber: Send + Sync {
    fn name(&self) -> &str;

    fn on_snapshot(&self, snapshot: Arc<Snapshot>) -> Result<(), SubscriberError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot(updated_at: i64) -> Snapshot {
        Snapshot {
            reason: SnapshotReason::Requested.to_string(),
            active_agent_id: Some(AgentId::from("a1")),
            history: vec![],
            runtime_context: None,
            agents: vec![AgentContext::new("a1", "https://a.test")],
            updated_at,
        }
    }

    #[test]
    fn same_state_ignores_timestamp() {
        assert!(snapshot(1).same_state_as(&snapshot(2)));
        assert_ne!(snapshot(1), snapshot(2));
    }

    #[test]
    fn finds_agent_by_id() {
        let snap = snapshot(1);
        assert!(snap.agent(&AgentId::from("a1")).is_some());
        assert!(snap.agent(&AgentId::from("zz")).is_none());
    }
}
