//! Audit logging: a structured record of command-boundary decisions.
//!
//! Every external command that is rejected (and every one that runs) leaves an
//! entry, so a misbehaving sender can be traced after the fact.

use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

/// Entries kept in memory before the oldest are dropped.
const MAX_ENTRIES: usize = 1_000;

/// A single audit log entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEntry {
    pub timestamp: DateTime<Utc>,
    pub event: AuditEvent,
    pub actor: String,
    pub target: String,
    pub outcome: AuditOutcome,
    pub details: Option<String>,
}

/// Types of auditable bridge events.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AuditEvent {
    /// A command reached the router
    CommandExecuted { command: String },
    /// The sender's origin failed the allowlist
    OriginDenied,
    /// An external caller asked for an internal-only command
    InternalOnlyDenied { command: String },
    /// Arguments failed validation
    ValidationFailed { command: String },
}

/// Outcome of an audited operation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AuditOutcome {
    Success,
    Failure,
    Denied,
}

/// Trait for audit log sinks (where events are written).
pub trait AuditSink: Send + Sync {
    fn record(&self, entry: &AuditEntry);
}

/// In-memory audit logger with optional forwarding sinks.
pub struct AuditLogger {
    entries: Mutex<VecDeque<AuditEntry>>,
    sinks: Vec<Box<dyn AuditSink>>,
}

impl std::fmt::Debug for AuditLogger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuditLogger")
            .field("entry_count", &self.entries.lock().len())
            .field("sink_count", &self.sinks.len())
            .finish()
    }
}

impl Default for AuditLogger {
    fn default() -> Self {
        Self::new()
    }
}

impl AuditLogger {
    /// Create a new audit logger with no sinks.
    pub fn new() -> Self {
        Self::with_sinks(Vec::new())
    }

    /// Create a new audit logger with the given sinks.
    pub fn with_sinks(sinks: Vec<Box<dyn AuditSink>>) -> Self {
        Self {
            entries: Mutex::new(VecDeque::with_capacity(MAX_ENTRIES)),
            sinks,
        }
    }

    /// Record an audit event.
    pub fn log(
        &self,
        event: AuditEvent,
        actor: &str,
        target: &str,
        outcome: AuditOutcome,
        details: Option<String>,
    ) {
        let entry = AuditEntry {
            timestamp: Utc::now(),
            event,
            actor: actor.into(),
            target: target.into(),
            outcome,
            details,
        };

        for sink in &self.sinks {
            sink.record(&entry);
        }

        let mut entries = self.entries.lock();
        if entries.len() >= MAX_ENTRIES {
            entries.pop_front();
        }
        entries.push_back(entry);
    }

    /// Get all recorded entries.
    pub fn entries(&self) -> Vec<AuditEntry> {
        self.entries.lock().iter().cloned().collect()
    }

    /// Get entries with the given outcome.
    pub fn entries_by_outcome(&self, outcome: &AuditOutcome) -> Vec<AuditEntry> {
        self.entries
            .lock()
            .iter()
            .filter(|e| &e.outcome == outcome)
            .cloned()
            .collect()
    }

    /// Count of stored entries.
    pub fn count(&self) -> usize {
        self.entries.lock().len()
    }
}

/// A tracing-based audit sink that logs entries via `tracing::info!`.
pub struct TracingSink;

impl AuditSink for TracingSink {
    fn record(&self, entry: &AuditEntry) {
        tracing::info!(
            event = ?entry.event,
            actor = %entry.actor,
            target = %entry.target,
            outcome = ?entry.outcome,
            details = ?entry.details,
            "AUDIT"
        );
    }
}
