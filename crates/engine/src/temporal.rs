//! Foreground time and dwell time per agent.
//!
//! Exactly one agent can be "armed" (accumulating active time) at any
//! moment: the foreground agent, and only while the host has focus. Every
//! transition folds the running interval of the previously armed agent
//! before arming the next, so the invariant holds after each call.

use std::collections::HashMap;

use tabhive_core::agent::{AgentId, TemporalSnapshot};

/// Active time at which the active component of the score saturates.
pub const ACTIVE_SATURATION_MS: f64 = 180_000.0;
/// Dwell time at which the dwell component of the score saturates.
pub const DWELL_SATURATION_MS: f64 = 300_000.0;

const ACTIVE_WEIGHT: f64 = 0.7;
const DWELL_WEIGHT: f64 = 0.3;

/// Raw temporal accounting for one agent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TemporalState {
    pub visit_started_at: i64,
    pub last_seen_at: i64,
    /// Set only while this agent is the armed foreground agent.
    pub active_since: Option<i64>,
    pub accumulated_active_ms: i64,
    pub last_foregrounded_at: Option<i64>,
}

impl TemporalState {
    fn new(now: i64) -> Self {
        Self {
            visit_started_at: now,
            last_seen_at: now,
            active_since: None,
            accumulated_active_ms: 0,
            last_foregrounded_at: None,
        }
    }

    fn pause(&mut self, now: i64) {
        if let Some(since) = self.active_since.take() {
            self.accumulated_active_ms += (now - since).max(0);
            self.last_seen_at = now;
        }
    }

    fn arm(&mut self, now: i64) {
        self.active_since = Some(now);
        self.last_foregrounded_at = Some(now);
        self.last_seen_at = now;
    }
}

/// Per-agent foreground and dwell accounting.
#[derive(Debug)]
pub struct TemporalTracker {
    states: HashMap<AgentId, TemporalState>,
    foreground: Option<AgentId>,
    host_focused: bool,
}

impl Default for TemporalTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl TemporalTracker {
    pub fn new() -> Self {
        Self {
            states: HashMap::new(),
            foreground: None,
            host_focused: true,
        }
    }

    /// Start tracking an agent. Returns `false` if it was already tracked.
    pub fn track(&mut self, agent_id: &AgentId, now: i64) -> bool {
        if self.states.contains_key(agent_id) {
            return false;
        }
        let mut state = TemporalState::new(now);
        if self.is_armable(agent_id) {
            state.arm(now);
        } else if self.foreground.as_ref() == Some(agent_id) {
            state.last_foregrounded_at = Some(now);
        }
        self.states.insert(agent_id.clone(), state);
        true
    }

    pub fn touch(&mut self, agent_id: &AgentId, now: i64) {
        if let Some(state) = self.states.get_mut(agent_id) {
            state.last_seen_at = now;
        }
    }

    /// The host moved the foreground to `agent_id` (or to nothing).
    ///
    /// An id the tracker has not seen yet is remembered as the foreground so
    /// it is armed as soon as it is tracked.
    pub fn set_foreground(&mut self, agent_id: Option<&AgentId>, now: i64) {
        self.pause_all(now);
        self.foreground = agent_id.cloned();
        // Recorded even while the host is blurred; resolution ties use it
        if let Some(state) = agent_id.and_then(|id| self.states.get_mut(id)) {
            state.last_foregrounded_at = Some(now);
        }
        self.arm_foreground(now);
    }

    /// The host window gained or lost focus.
    pub fn host_focus_changed(&mut self, focused: bool, now: i64) {
        self.host_focused = focused;
        if focused {
            if self.active_agent().is_none() {
                self.arm_foreground(now);
            }
        } else {
            self.pause_all(now);
        }
    }

    /// The agent navigated to a new url: its visit starts over.
    pub fn navigated(&mut self, agent_id: &AgentId, now: i64) {
        let armable = self.is_armable(agent_id);
        if let Some(state) = self.states.get_mut(agent_id) {
            state.visit_started_at = now;
            state.last_seen_at = now;
            state.accumulated_active_ms = 0;
            state.active_since = None;
            if armable {
                state.arm(now);
            }
        }
    }

    /// Stop tracking an agent.
    pub fn remove(&mut self, agent_id: &AgentId) -> Option<TemporalState> {
        if self.foreground.as_ref() == Some(agent_id) {
            self.foreground = None;
        }
        self.states.remove(agent_id)
    }

    /// Derived timings for an agent as of `now`.
    pub fn snapshot(&self, agent_id: &AgentId, now: i64) -> Option<TemporalSnapshot> {
        self.states.get(agent_id).map(|state| {
            let running = state.active_since.map_or(0, |since| (now - since).max(0));
            TemporalSnapshot {
                visit_started_at: state.visit_started_at,
                last_seen_at: state.last_seen_at,
                active_duration_ms: state.accumulated_active_ms + running,
                dwell_time_ms: (now - state.visit_started_at).max(0),
            }
        })
    }

    pub fn state(&self, agent_id: &AgentId) -> Option<&TemporalState> {
        self.states.get(agent_id)
    }

    /// The agent the host considers foreground, focused or not.
    pub fn foreground(&self) -> Option<&AgentId> {
        self.foreground.as_ref()
    }

    /// The agent currently accumulating active time.
    pub fn active_agent(&self) -> Option<&AgentId> {
        self.states
            .iter()
            .find(|(_, state)| state.active_since.is_some())
            .map(|(id, _)| id)
    }

    pub fn last_foregrounded_at(&self, agent_id: &AgentId) -> Option<i64> {
        self.states
            .get(agent_id)
            .and_then(|state| state.last_foregrounded_at)
    }

    /// Number of agents with `active_since` set. Never more than one.
    pub fn active_count(&self) -> usize {
        self.states
            .values()
            .filter(|state| state.active_since.is_some())
            .count()
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    fn is_armable(&self, agent_id: &AgentId) -> bool {
        self.host_focused && self.foreground.as_ref() == Some(agent_id)
    }

    fn pause_all(&mut self, now: i64) {
        for state in self.states.values_mut() {
            state.pause(now);
        }
    }

    fn arm_foreground(&mut self, now: i64) {
        if !self.host_focused {
            return;
        }
        let Some(id) = self.foreground.as_ref() else {
            return;
        };
        if let Some(state) = self.states.get_mut(id) {
            state.arm(now);
        }
    }
}

/// Relevance score in `0..=1`, rounded to three decimals.
pub fn importance_score(snapshot: &TemporalSnapshot) -> f64 {
    let active = (snapshot.active_duration_ms as f64 / ACTIVE_SATURATION_MS).clamp(0.0, 1.0);
    let dwell = (snapshot.dwell_time_ms as f64 / DWELL_SATURATION_MS).clamp(0.0, 1.0);
    round3(active * ACTIVE_WEIGHT + dwell * DWELL_WEIGHT)
}

fn round3(value: f64) -> f64 {
    (value * 1000.0).round() / 1000.0
}
