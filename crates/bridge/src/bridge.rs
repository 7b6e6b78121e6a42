//! The external command bridge.
//!
//! Order of checks for every request:
//!
//! 1. **Origin**: external callers must present an allow-listed `https`
//!    origin. Rejected before anything else runs.
//! 2. **Route**: unknown commands get the catalog back.
//! 3. **Tier**: internal-only commands are refused for external callers.
//! 4. **Arguments**: validated into a typed [`Command`].
//! 5. **Execute** against the engine.
//!
//! Every outcome is an [`Envelope`] and leaves an audit entry.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, info, warn};

use tabhive_config::BridgeConfig;
use tabhive_core::agent::AgentId;
use tabhive_core::envelope::Envelope;
use tabhive_core::error::{BridgeError, Error};
use tabhive_engine::{Engine, TargetQuery};
use tabhive_security::{
    AuditEvent, AuditLogger, AuditOutcome, OriginCheckResult, OriginPolicy, TracingSink,
};

use crate::catalog::{self, CATALOG_VERSION, Command, Target};

/// Who is calling.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Caller {
    /// Code running inside the engine's own trust boundary.
    Internal,
    /// Anything else. `origin` is whatever the sender claims to run on.
    External { origin: String },
}

impl Caller {
    pub fn external(origin: impl Into<String>) -> Self {
        Caller::External {
            origin: origin.into(),
        }
    }

    fn actor(&self) -> &str {
        match self {
            Caller::Internal => "internal",
            Caller::External { origin } => origin,
        }
    }

    fn is_external(&self) -> bool {
        matches!(self, Caller::External { .. })
    }
}

/// A raw command as it arrives over the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandRequest {
    pub command: String,
    #[serde(default)]
    pub args: serde_json::Value,
}

impl CommandRequest {
    pub fn new(command: impl Into<String>, args: serde_json::Value) -> Self {
        Self {
            command: command.into(),
            args,
        }
    }
}

/// Routes external commands to the engine.
pub struct ExternalBridge {
    engine: Arc<Engine>,
    policy: OriginPolicy,
    audit: Arc<AuditLogger>,
}

impl std::fmt::Debug for ExternalBridge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExternalBridge")
            .field("allowed_hosts", &self.policy.allowed_hosts())
            .field("audit", &self.audit)
            .finish()
    }
}

impl ExternalBridge {
    pub fn new(engine: Arc<Engine>, policy: OriginPolicy) -> Self {
        Self {
            engine,
            policy,
            audit: Arc::new(AuditLogger::with_sinks(vec![Box::new(TracingSink)])),
        }
    }

    pub fn from_config(engine: Arc<Engine>, config: &BridgeConfig) -> Self {
        Self::new(engine, OriginPolicy::new(config.allowed_origins.iter().cloned()))
    }

    /// Use a shared audit logger.
    pub fn with_audit(mut self, audit: Arc<AuditLogger>) -> Self {
        self.audit = audit;
        self
    }

    pub fn audit(&self) -> &AuditLogger {
        &self.audit
    }

    pub fn engine(&self) -> &Arc<Engine> {
        &self.engine
    }

    /// The `help` payload: catalog version and every command.
    pub fn help() -> serde_json::Value {
        json!({
            "version": CATALOG_VERSION,
            "commands": catalog::catalog().collect::<Vec<_>>(),
        })
    }

    /// Check an external caller's origin. Denials are audited against
    /// `target`.
    pub fn authorize(&self, caller: &Caller, target: &str) -> Result<(), BridgeError> {
        let Caller::External { origin } = caller else {
            return Ok(());
        };
        match self.policy.check_origin(origin) {
            OriginCheckResult::Allowed => Ok(()),
            OriginCheckResult::Denied { origin, reason } => {
                warn!(
                    origin = %origin,
                    target = %target,
                    reason = %reason,
                    "External caller rejected"
                );
                self.audit.log(
                    AuditEvent::OriginDenied,
                    caller.actor(),
                    target,
                    AuditOutcome::Denied,
                    Some(reason.clone()),
                );
                Err(BridgeError::Unauthorized { origin, reason })
            }
        }
    }

    /// Handle one command. Never fails; errors come back as `ok=false`.
    pub async fn handle(&self, caller: &Caller, request: CommandRequest) -> Envelope {
        let actor = caller.actor().to_string();
        let name = request.command.clone();

        if let Err(e) = self.authorize(caller, &name) {
            return Envelope::failure(e.to_string());
        }

        let Some(route) = catalog::route(&name) else {
            debug!(command = %name, actor = %actor, "Unsupported command");
            self.audit.log(
                AuditEvent::ValidationFailed {
                    command: name.clone(),
                },
                &actor,
                &name,
                AuditOutcome::Failure,
                Some("unsupported command".into()),
            );
            return Envelope::failure_with(
                BridgeError::Unsupported(name).to_string(),
                json!({ "supported": catalog::command_names() }),
            );
        };

        if route.spec.internal_only && caller.is_external() {
            self.audit.log(
                AuditEvent::InternalOnlyDenied {
                    command: name.clone(),
                },
                &actor,
                &name,
                AuditOutcome::Denied,
                None,
            );
            return Envelope::failure(BridgeError::InternalOnly(name).to_string());
        }

        let command = match route.parse(request.args) {
            Ok(command) => command,
            Err(e) => {
                self.audit.log(
                    AuditEvent::ValidationFailed {
                        command: name.clone(),
                    },
                    &actor,
                    &name,
                    AuditOutcome::Failure,
                    Some(e.to_string()),
                );
                return Envelope::failure(e.to_string());
            }
        };

        let envelope = match self.execute(command).await {
            Ok(envelope) => envelope,
            Err(e) => Envelope::failure(e.to_string()),
        };

        let outcome = if envelope.ok {
            AuditOutcome::Success
        } else {
            AuditOutcome::Failure
        };
        self.audit.log(
            AuditEvent::CommandExecuted {
                command: name.clone(),
            },
            &actor,
            &name,
            outcome,
            envelope.error.clone(),
        );
        envelope
    }

    async fn execute(&self, command: Command) -> Result<Envelope, BridgeError> {
        let engine = &self.engine;
        let result = match command {
            Command::Help => Self::help(),
            Command::ListAgents => json!({ "agents": engine.list_agents() }),
            Command::GetAgent(agent_id) => {
                let agent = engine
                    .get_agent(&agent_id)
                    .ok_or_else(|| BridgeError::NotFound(format!("agent {agent_id}")))?;
                json!({ "agent": agent })
            }
            Command::FindAgents { query, match_all } => {
                let matches = engine.resolve_targets(&TargetQuery {
                    selector: query,
                    match_all,
                });
                json!({ "matches": matches })
            }
            Command::FocusAgent(target) => {
                let agent_id = self.resolve_one(target)?;
                engine.focus_agent(&agent_id).await.map_err(into_bridge_error)?;
                json!({ "agentId": agent_id })
            }
            Command::CloseAgents(target) => {
                let ids = self.resolve_many(target)?;
                let closed = engine.close_agents(&ids).await.map_err(into_bridge_error)?;
                info!(closed = closed.len(), "Agents closed by command");
                json!({ "closed": closed })
            }
            Command::GetSnapshot => {
                let snapshot = engine.request_snapshot();
                serde_json::to_value(snapshot.as_ref())
                    .map_err(|e| BridgeError::Failed(e.to_string()))?
            }
            Command::RecentHistory { limit } => {
                json!({ "history": engine.recent_history(limit) })
            }
            Command::SearchHistory(query) => {
                let records = engine
                    .search_history(query)
                    .await
                    .map_err(into_bridge_error)?;
                json!({ "history": records })
            }
            Command::DispatchAction {
                target,
                action,
                payload,
            } => {
                let agent_id = self.resolve_one(target)?;
                // The agent's own envelope goes back untouched
                return Ok(engine.dispatch(&agent_id, &action, payload).await);
            }
        };
        Ok(Envelope::success(result))
    }

    fn resolve_one(&self, target: Target) -> Result<AgentId, BridgeError> {
        match target {
            Target::Id(agent_id) => Ok(agent_id),
            Target::Query { selector, .. } => self
                .engine
                .resolve_targets(&TargetQuery::new(selector.clone()))
                .into_iter()
                .next()
                .map(|m| m.agent_id)
                .ok_or_else(|| BridgeError::NotFound(format!("no agent matches '{selector}'"))),
        }
    }

    fn resolve_many(&self, target: Target) -> Result<Vec<AgentId>, BridgeError> {
        match target {
            Target::Id(agent_id) => Ok(vec![agent_id]),
            Target::Query {
                selector,
                match_all,
            } => {
                let ids: Vec<AgentId> = self
                    .engine
                    .resolve_targets(&TargetQuery {
                        selector: selector.clone(),
                        match_all,
                    })
                    .into_iter()
                    .map(|m| m.agent_id)
                    .collect();
                if ids.is_empty() {
                    return Err(BridgeError::NotFound(format!("no agent matches '{selector}'")));
                }
                Ok(ids)
            }
        }
    }
}

fn into_bridge_error(error: Error) -> BridgeError {
    match error {
        Error::Bridge(e) => e,
        other => BridgeError::Failed(other.to_string()),
    }
}
