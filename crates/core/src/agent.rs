//! The canonical per-page context the engine keeps for each agent.

use serde::{Deserialize, Serialize};
use url::Url;

use crate::history::HistoryRecord;

/// Opaque identifier of a live agent.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AgentId(pub String);

impl AgentId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for AgentId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for AgentId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for AgentId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Load status of the page hosting an agent.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentStatus {
    #[default]
    Loading,
    Complete,
}

/// Coarse category derived from an agent's url.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Classification {
    Search,
    Email,
    Video,
    Social,
    Docs,
    Maps,
    Shopping,
    News,
    Code,
    /// Non-web pages (settings, new tab, extension pages).
    Internal,
    #[default]
    Other,
}

impl Classification {
    pub fn as_str(&self) -> &'static str {
        match self {
            Classification::Search => "search",
            Classification::Email => "email",
            Classification::Video => "video",
            Classification::Social => "social",
            Classification::Docs => "docs",
            Classification::Maps => "maps",
            Classification::Shopping => "shopping",
            Classification::News => "news",
            Classification::Code => "code",
            Classification::Internal => "internal",
            Classification::Other => "other",
        }
    }
}

/// Point-in-time view of an agent's temporal accounting.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TemporalSnapshot {
    pub visit_started_at: i64,
    pub last_seen_at: i64,
    pub active_duration_ms: i64,
    pub dwell_time_ms: i64,
}

/// The canonical record for one live agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentContext {
    pub agent_id: AgentId,

    pub url: String,

    #[serde(default)]
    pub title: String,

    #[serde(default)]
    pub classification: Classification,

    #[serde(default)]
    pub description: String,

    #[serde(default)]
    pub text_excerpt: String,

    /// Collaborator-owned payload; the engine never looks inside.
    #[serde(default, skip_serializing_if = "serde_json::Value::is_null")]
    pub details: serde_json::Value,

    #[serde(default)]
    pub status: AgentStatus,

    #[serde(default)]
    pub temporal: TemporalSnapshot,

    /// History entry for `url`, joined from the history cache.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub history: Option<HistoryRecord>,

    #[serde(default)]
    pub importance_score: f64,

    #[serde(default)]
    pub updated_at: i64,
}

impl AgentContext {
    pub fn new(agent_id: impl Into<AgentId>, url: impl Into<String>) -> Self {
        Self {
            agent_id: agent_id.into(),
            url: url.into(),
            title: String::new(),
            classification: Classification::Other,
            description: String::new(),
            text_excerpt: String::new(),
            details: serde_json::Value::Null,
            status: AgentStatus::Loading,
            temporal: TemporalSnapshot::default(),
            history: None,
            importance_score: 0.0,
            updated_at: 0,
        }
    }

    /// Host part of the url without a leading `www.`. Empty for urls that
    /// do not parse or have no host (`about:blank`, `data:`).
    pub fn host(&self) -> String {
        Url::parse(&self.url)
            .ok()
            .and_then(|url| {
                url.host_str()
                    .map(|host| host.strip_prefix("www.").unwrap_or(host).to_string())
            })
            .unwrap_or_default()
    }
}
