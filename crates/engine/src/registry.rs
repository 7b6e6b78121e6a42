//! Agent registry: one canonical [`AgentContext`] per live agent.

use std::collections::BTreeMap;

use tabhive_core::agent::{AgentContext, AgentId};

use crate::history::HistoryCache;
use crate::temporal::{TemporalTracker, importance_score};

/// Owns every live agent's context together with its temporal state.
///
/// Contexts are keyed by id in a `BTreeMap` so listings come out in a
/// stable order. Removing an agent drops its temporal state too.
#[derive(Debug, Default)]
pub struct AgentRegistry {
    agents: BTreeMap<AgentId, AgentContext>,
    temporal: TemporalTracker,
}

impl AgentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace or create a record, stamping `updated_at`.
    pub fn upsert(&mut self, mut context: AgentContext, now: i64) {
        context.updated_at = now;
        self.temporal.track(&context.agent_id, now);
        self.agents.insert(context.agent_id.clone(), context);
    }

    pub fn get(&self, agent_id: &AgentId) -> Option<&AgentContext> {
        self.agents.get(agent_id)
    }

    pub fn contains(&self, agent_id: &AgentId) -> bool {
        self.agents.contains_key(agent_id)
    }

    pub fn remove(&mut self, agent_id: &AgentId) -> Option<AgentContext> {
        self.temporal.remove(agent_id);
        self.agents.remove(agent_id)
    }

    /// All records, ordered by id.
    pub fn list(&self) -> Vec<AgentContext> {
        self.agents.values().cloned().collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &AgentContext> {
        self.agents.values()
    }

    pub fn len(&self) -> usize {
        self.agents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.agents.is_empty()
    }

    /// The foreground agent, if it is one this registry knows about.
    pub fn active_agent_id(&self) -> Option<&AgentId> {
        self.temporal
            .foreground()
            .filter(|agent_id| self.agents.contains_key(*agent_id))
    }

    pub fn temporal(&self) -> &TemporalTracker {
        &self.temporal
    }

    pub fn temporal_mut(&mut self) -> &mut TemporalTracker {
        &mut self.temporal
    }

    /// Recompute the derived fields of one record: temporal snapshot,
    /// importance and the joined history entry.
    ///
    /// Returns `false` for unknown ids.
    pub fn refresh_derived(
        &mut self,
        agent_id: &AgentId,
        now: i64,
        history: &HistoryCache,
    ) -> bool {
        let Some(context) = self.agents.get_mut(agent_id) else {
            return false;
        };
        if let Some(snapshot) = self.temporal.snapshot(agent_id, now) {
            context.temporal = snapshot;
            context.importance_score = importance_score(&snapshot);
        }
        context.history = history.get(&context.url).cloned();
        true
    }

    /// Re-join every record with the history cache, leaving temporal
    /// fields alone. Returns how many records changed.
    pub fn rejoin_history(&mut self, history: &HistoryCache) -> usize {
        let mut changed = 0;
        for context in self.agents.values_mut() {
            let joined = history.get(&context.url).cloned();
            if context.history != joined {
                context.history = joined;
                changed += 1;
            }
        }
        changed
    }
}
