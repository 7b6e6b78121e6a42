//! Dispatch controller — delivers actions to agents with bounded recovery.
//!
//! The host reports three kinds of failure (see [`FailureKind`]):
//!
//! - **No receiver**: nothing listens inside the page. Re-inject the
//!   bootstrap program and try again straight away.
//! - **Recoverable timing**: the page is mid-load. Poll readiness, then retry.
//! - **Non-recoverable**: stop and report.
//!
//! Attempts are bounded per action. Liveness is re-checked before every
//! send, since the agent can be removed while the controller is suspended.

use std::sync::Arc;
use std::time::Duration;

use tabhive_config::DispatchConfig;
use tabhive_core::agent::AgentId;
use tabhive_core::envelope::Envelope;
use tabhive_core::error::{FailureKind, TransportError};
use tabhive_core::transport::{ActionMessage, DispatchTransport};
use tracing::{debug, info, warn};

/// Answers whether an agent still exists.
pub trait AgentLiveness: Send + Sync {
    fn is_live(&self, agent_id: &AgentId) -> bool;
}

/// Attempt bounds and recovery settings.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub generic_max_attempts: u32,
    pub page_state_max_attempts: u32,
    pub page_state_actions: Vec<String>,
    pub readiness_poll_attempts: u32,
    pub readiness_poll_delay: Duration,
    pub bootstrap_files: Vec<String>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from(&DispatchConfig::default())
    }
}

impl From<&DispatchConfig> for RetryPolicy {
    fn from(config: &DispatchConfig) -> Self {
        Self {
            generic_max_attempts: config.generic_max_attempts,
            page_state_max_attempts: config.page_state_max_attempts,
            page_state_actions: config.page_state_actions.clone(),
            readiness_poll_attempts: config.readiness_poll_attempts,
            readiness_poll_delay: Duration::from_millis(config.readiness_poll_delay_ms),
            bootstrap_files: config.bootstrap_files.clone(),
        }
    }
}

impl RetryPolicy {
    /// Total sends allowed for `action`, never less than one.
    pub fn max_attempts_for(&self, action: &str) -> u32 {
        let attempts = if self.page_state_actions.iter().any(|a| a == action) {
            self.page_state_max_attempts
        } else {
            self.generic_max_attempts
        };
        attempts.max(1)
    }
}

/// How a readiness wait ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Readiness {
    Ready,
    NotFound,
    TimedOut,
}

/// Sends actions through a [`DispatchTransport`] and recovers from
/// transient failures.
pub struct DispatchController {
    transport: Arc<dyn DispatchTransport>,
    policy: RetryPolicy,
}

impl std::fmt::Debug for DispatchController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DispatchController")
            .field("policy", &self.policy)
            .finish()
    }
}

impl DispatchController {
    pub fn new(transport: Arc<dyn DispatchTransport>, policy: RetryPolicy) -> Self {
        Self { transport, policy }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Deliver `action` to an agent.
    ///
    /// Returns the agent's own envelope once it answers, even when that
    /// envelope is `ok=false`. Transport failures that survive recovery come
    /// back as an `ok=false` envelope carrying the last observed error.
    pub async fn dispatch(
        &self,
        agent_id: &AgentId,
        action: &str,
        payload: serde_json::Value,
        liveness: &dyn AgentLiveness,
    ) -> Envelope {
        let message = ActionMessage::new(action, payload);
        let max_attempts = self.policy.max_attempts_for(action);
        let mut last_error: Option<TransportError> = None;

        for attempt in 1..=max_attempts {
            if !liveness.is_live(agent_id) {
                debug!(agent_id = %agent_id, action, attempt, "Agent gone before send");
                return Envelope::failure(
                    TransportError::Gone(format!("agent {agent_id} was removed")).to_string(),
                );
            }

            let error = match self.transport.send(agent_id, &message).await {
                Ok(response) => {
                    if attempt > 1 {
                        info!(agent_id = %agent_id, action, attempt, "Dispatch recovered");
                    }
                    return response;
                }
                Err(error) => error,
            };

            let kind = error.kind();
            warn!(
                agent_id = %agent_id,
                action,
                attempt,
                max_attempts,
                kind = ?kind,
                error = %error,
                "Dispatch attempt failed"
            );
            last_error = Some(error);

            if attempt == max_attempts {
                break;
            }

            match kind {
                FailureKind::NonRecoverable => break,
                FailureKind::NoReceiver => {
                    if let Err(inject_error) = self
                        .transport
                        .inject(agent_id, &self.policy.bootstrap_files)
                        .await
                    {
                        warn!(
                            agent_id = %agent_id,
                            error = %inject_error,
                            "Bootstrap re-injection failed"
                        );
                        if inject_error.kind() == FailureKind::NonRecoverable {
                            last_error = Some(inject_error);
                            break;
                        }
                    }
                }
                FailureKind::RecoverableTiming => match self.wait_until_ready(agent_id).await {
                    Readiness::Ready => {}
                    Readiness::TimedOut => {
                        debug!(
                            agent_id = %agent_id,
                            "Readiness polling exhausted, retrying anyway"
                        );
                    }
                    Readiness::NotFound => {
                        last_error = Some(TransportError::Gone(format!(
                            "page for agent {agent_id} disappeared while loading"
                        )));
                        break;
                    }
                },
            }
        }

        let message = last_error
            .map(|e| e.to_string())
            .unwrap_or_else(|| format!("dispatch of '{action}' failed"));
        Envelope::failure(message)
    }

    async fn wait_until_ready(&self, agent_id: &AgentId) -> Readiness {
        for poll in 0..self.policy.readiness_poll_attempts {
            let probe = self.transport.probe_readiness(agent_id).await;
            if !probe.found {
                return Readiness::NotFound;
            }
            if probe.is_ready() {
                debug!(agent_id = %agent_id, polls = poll + 1, "Agent page ready");
                return Readiness::Ready;
            }
            tokio::time::sleep(self.policy.readiness_poll_delay).await;
        }
        Readiness::TimedOut
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use tabhive_core::agent::AgentStatus;
    use tabhive_core::transport::ReadinessProbe;

    /// Transport that replays scripted send results and counts calls.
    #[derive(Default)]
    struct ScriptedTransport {
        sends: Mutex<VecDeque<Result<Envelope, TransportError>>>,
        fallback: Mutex<Option<TransportError>>,
        probes: Mutex<VecDeque<ReadinessProbe>>,
        send_count: AtomicUsize,
        inject_count: AtomicUsize,
        probe_count: AtomicUsize,
        /// Flipped to not-live when the transport is asked to inject.
        removed_on_inject: Mutex<Option<Arc<Live>>>,
    }

    impl ScriptedTransport {
        fn always_failing(error: TransportError) -> Arc<Self> {
            let transport = Self::default();
            *transport.fallback.lock() = Some(error);
            Arc::new(transport)
        }

        fn scripted(results: Vec<Result<Envelope, TransportError>>) -> Arc<Self> {
            let transport = Self::default();
            *transport.sends.lock() = results.into();
            Arc::new(transport)
        }

        fn sends(&self) -> usize {
            self.send_count.load(Ordering::SeqCst)
        }

        fn injections(&self) -> usize {
            self.inject_count.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl DispatchTransport for ScriptedTransport {
        async fn send(
            &self,
            _agent_id: &AgentId,
            _message: &ActionMessage,
        ) -> Result<Envelope, TransportError> {
            self.send_count.fetch_add(1, Ordering::SeqCst);
            if let Some(next) = self.sends.lock().pop_front() {
                return next;
            }
            match self.fallback.lock().clone() {
                Some(error) => Err(error),
                None => Ok(Envelope::empty_success()),
            }
        }

        async fn inject(
            &self,
            _agent_id: &AgentId,
            _bootstrap_files: &[String],
        ) -> Result<(), TransportError> {
            self.inject_count.fetch_add(1, Ordering::SeqCst);
            if let Some(live) = self.removed_on_inject.lock().as_ref() {
                live.0.store(false, Ordering::SeqCst);
            }
            Ok(())
        }

        async fn probe_readiness(&self, _agent_id: &AgentId) -> ReadinessProbe {
            self.probe_count.fetch_add(1, Ordering::SeqCst);
            self.probes.lock().pop_front().unwrap_or(ReadinessProbe {
                found: true,
                status: Some(AgentStatus::Complete),
                url: None,
            })
        }
    }

    struct Live(AtomicBool);

    impl Live {
        fn yes() -> Self {
            Self(AtomicBool::new(true))
        }
    }

    impl AgentLiveness for Live {
        fn is_live(&self, _agent_id: &AgentId) -> bool {
            self.0.load(Ordering::SeqCst)
        }
    }

    fn controller(transport: Arc<ScriptedTransport>) -> DispatchController {
        DispatchController::new(transport, RetryPolicy::default())
    }

    fn id() -> AgentId {
        AgentId::from("a1")
    }

    #[tokio::test]
    async fn success_on_first_attempt() {
        let transport = ScriptedTransport::scripted(vec![Ok(Envelope::success(
            serde_json::json!({"clicked": true}),
        ))]);
        let result = controller(transport.clone())
            .dispatch(&id(), "click", serde_json::Value::Null, &Live::yes())
            .await;
        assert!(result.ok);
        assert_eq!(transport.sends(), 1);
        assert_eq!(transport.injections(), 0);
    }

    #[tokio::test]
    async fn permanent_no_receiver_respects_generic_bound() {
        let transport = ScriptedTransport::always_failing(TransportError::Other(
            "Could not establish connection. Receiving end does not exist.".into(),
        ));
        let result = controller(transport.clone())
            .dispatch(&id(), "click", serde_json::Value::Null, &Live::yes())
            .await;
        assert!(!result.ok);
        assert!(result.error_message().contains("Receiving end does not exist"));
        assert_eq!(transport.sends(), 2);
        assert_eq!(transport.injections(), 1);
    }

    #[tokio::test]
    async fn page_state_actions_get_three_attempts() {
        let transport = ScriptedTransport::always_failing(TransportError::NoReceiver(
            "content script missing".into(),
        ));
        let result = controller(transport.clone())
            .dispatch(&id(), "navigate", serde_json::json!({"url": "https://a.test"}), &Live::yes())
            .await;
        assert!(!result.ok);
        assert_eq!(transport.sends(), 3);
        assert_eq!(transport.injections(), 2);
    }

    #[tokio::test]
    async fn no_receiver_then_success_after_injection() {
        let transport = ScriptedTransport::scripted(vec![
            Err(TransportError::NoReceiver("not injected".into())),
            Ok(Envelope::success(serde_json::json!("done"))),
        ]);
        let result = controller(transport.clone())
            .dispatch(&id(), "click", serde_json::Value::Null, &Live::yes())
            .await;
        assert!(result.ok);
        assert_eq!(transport.sends(), 2);
        assert_eq!(transport.injections(), 1);
    }

    #[tokio::test]
    async fn non_recoverable_stops_immediately() {
        let transport = ScriptedTransport::always_failing(TransportError::AccessDenied(
            "Cannot access a chrome:// URL".into(),
        ));
        let result = controller(transport.clone())
            .dispatch(&id(), "navigate", serde_json::Value::Null, &Live::yes())
            .await;
        assert!(!result.ok);
        assert_eq!(transport.sends(), 1);
        assert_eq!(transport.injections(), 0);
    }

    #[tokio::test]
    async fn agent_level_failure_is_returned_as_is() {
        let transport = ScriptedTransport::scripted(vec![Ok(Envelope::failure(
            "selector not found",
        ))]);
        let result = controller(transport.clone())
            .dispatch(&id(), "click", serde_json::Value::Null, &Live::yes())
            .await;
        assert_eq!(result, Envelope::failure("selector not found"));
        assert_eq!(transport.sends(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn timing_failure_polls_readiness_then_retries() {
        let transport = ScriptedTransport::scripted(vec![
            Err(TransportError::Other("No frame with id 0 in tab 7".into())),
            Ok(Envelope::empty_success()),
        ]);
        *transport.probes.lock() = vec![
            ReadinessProbe {
                found: true,
                status: Some(AgentStatus::Loading),
                url: None,
            },
            ReadinessProbe {
                found: true,
                status: Some(AgentStatus::Loading),
                url: None,
            },
        ]
        .into();

        let result = controller(transport.clone())
            .dispatch(&id(), "click", serde_json::Value::Null, &Live::yes())
            .await;
        assert!(result.ok);
        assert_eq!(transport.sends(), 2);
        // two loading probes, then the default complete probe
        assert_eq!(transport.probe_count.load(Ordering::SeqCst), 3);
        assert_eq!(transport.injections(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn page_vanishing_during_load_stops() {
        let transport =
            ScriptedTransport::always_failing(TransportError::NotReady("loading".into()));
        *transport.probes.lock() = vec![ReadinessProbe::default()].into();

        let result = controller(transport.clone())
            .dispatch(&id(), "navigate", serde_json::Value::Null, &Live::yes())
            .await;
        assert!(!result.ok);
        assert!(result.error_message().contains("disappeared"));
        assert_eq!(transport.sends(), 1);
    }

    #[tokio::test]
    async fn removed_agent_is_not_sent_to() {
        let transport = ScriptedTransport::scripted(vec![]);
        let gone = Live(AtomicBool::new(false));
        let result = controller(transport.clone())
            .dispatch(&id(), "click", serde_json::Value::Null, &gone)
            .await;
        assert!(!result.ok);
        assert_eq!(transport.sends(), 0);
    }

    #[tokio::test]
    async fn agent_removed_during_recovery_is_not_sent_to_again() {
        let transport = ScriptedTransport::scripted(vec![
            Err(TransportError::NoReceiver("not injected".into())),
            Ok(Envelope::success(serde_json::json!("stale"))),
        ]);
        let live = Arc::new(Live::yes());
        *transport.removed_on_inject.lock() = Some(live.clone());

        let result = controller(transport.clone())
            .dispatch(&id(), "click", serde_json::Value::Null, live.as_ref())
            .await;
        assert!(!result.ok);
        assert!(result.error_message().contains("was removed"));
        assert_eq!(transport.injections(), 1);
        assert_eq!(transport.sends(), 1);
    }

    #[test]
    fn policy_bounds_follow_config() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_attempts_for("click"), 2);
        assert_eq!(policy.max_attempts_for("compose_message"), 3);

        let zero = RetryPolicy {
            generic_max_attempts: 0,
            ..RetryPolicy::default()
        };
        assert_eq!(zero.max_attempts_for("click"), 1);
    }
}
