//! Browsing history records, queries, and the read-through provider trait.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::HistoryError;

/// One url in the platform's history log.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryRecord {
    pub url: String,

    #[serde(default)]
    pub title: String,

    /// Epoch milliseconds of the most recent visit.
    #[serde(default)]
    pub last_visit_time: i64,

    #[serde(default)]
    pub visit_count: u32,

    /// Visits that came from typing the url.
    #[serde(default)]
    pub typed_count: u32,
}

impl HistoryRecord {
    pub fn new(url: impl Into<String>, last_visit_time: i64) -> Self {
        Self {
            url: url.into(),
            last_visit_time,
            ..Self::default()
        }
    }
}

/// A search against the history log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryQuery {
    /// Free text matched against url and title. Empty matches everything.
    #[serde(default)]
    pub text: String,

    #[serde(default = "default_max_results")]
    pub max_results: usize,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_time: Option<i64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_time: Option<i64>,
}

fn default_max_results() -> usize {
    100
}

impl HistoryQuery {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            max_results: default_max_results(),
            start_time: None,
            end_time: None,
        }
    }

    /// Whether a record satisfies this query's text and time window.
    pub fn matches(&self, record: &HistoryRecord) -> bool {
        if let Some(start) = self.start_time {
            if record.last_visit_time < start {
                return false;
            }
        }
        if let Some(end) = self.end_time {
            if record.last_visit_time > end {
                return false;
            }
        }
        if self.text.is_empty() {
            return true;
        }
        let needle = self.text.to_lowercase();
        record.url.to_lowercase().contains(&needle) || record.title.to_lowercase().contains(&needle)
    }
}

/// Push notifications from the history log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum HistoryEvent {
    Visited(HistoryRecord),
    VisitsRemoved { urls: Vec<String> },
    AllVisitsRemoved,
}

/// The platform's history log, accessed strictly read-through.
#[async_trait]
pub trait HistoryProvider: Send + Sync {
    fn name(&self) -> &str;

    async fn search(&self, query: HistoryQuery) -> Result<Vec<HistoryRecord>, HistoryError>;
}
