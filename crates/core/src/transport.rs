//! Dispatch transport: how actions reach an agent inside its page.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::agent::{AgentId, AgentStatus};
use crate::envelope::Envelope;
use crate::error::TransportError;

/// The message delivered to an agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionMessage {
    pub action: String,

    #[serde(default)]
    pub payload: serde_json::Value,
}

impl ActionMessage {
    pub fn new(action: impl Into<String>, payload: serde_json::Value) -> Self {
        Self {
            action: action.into(),
            payload,
        }
    }
}

/// What the host knows about an agent's page right now.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReadinessProbe {
    pub found: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<AgentStatus>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

impl ReadinessProbe {
    pub fn is_ready(&self) -> bool {
        self.found && self.status == Some(AgentStatus::Complete)
    }
}

/// The host-side channel into agents.
///
/// `send` resolves with the agent's own envelope when the agent answered (even
/// if it answered `ok=false`) and with a [`TransportError`] when the message
/// never got a response.
#[async_trait]
pub trait DispatchTransport: Send + Sync {
    async fn send(
        &self,
        agent_id: &AgentId,
        message: &ActionMessage,
    ) -> Result<Envelope, TransportError>;

    /// Re-load the agent's bootstrap program into its page.
    async fn inject(
        &self,
        agent_id: &AgentId,
        bootstrap_files: &[String],
    ) -> Result<(), TransportError>;

    async fn probe_readiness(&self, agent_id: &AgentId) -> ReadinessProbe;
}

/// Host-level operations on agents that do not go through the agent itself.
#[async_trait]
pub trait HostControl: Send + Sync {
    /// Bring an agent's page to the foreground.
    async fn focus(&self, agent_id: &AgentId) -> Result<(), TransportError>;

    /// Close the pages hosting these agents.
    async fn close(&self, agent_ids: &[AgentId]) -> Result<(), TransportError>;
}
