//! Recorded event streams.
//!
//! A replay file holds one JSON [`EngineEvent`] per line. Blank lines and
//! lines starting with `#` are skipped.

use async_trait::async_trait;
use tokio::sync::mpsc;

use tabhive_core::error::Error;
use tabhive_core::event::{EngineEvent, EventSource};

/// An [`EventSource`] that yields a fixed list of events, then closes.
#[derive(Debug, Clone, Default)]
pub struct ReplaySource {
    events: Vec<EngineEvent>,
}

impl ReplaySource {
    pub fn new(events: Vec<EngineEvent>) -> Self {
        Self { events }
    }

    /// Parse newline-delimited JSON events.
    pub fn from_jsonl(text: &str) -> Result<Self, Error> {
        let mut events = Vec::new();
        for (index, line) in text.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let event = serde_json::from_str::<EngineEvent>(line).map_err(|e| {
                tracing::warn!(line = index + 1, error = %e, "Unparseable replay line");
                Error::Serialization(e)
            })?;
            events.push(event);
        }
        Ok(Self { events })
    }

    pub fn into_events(self) -> Vec<EngineEvent> {
        self.events
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}

#[async_trait]
impl EventSource for ReplaySource {
    fn name(&self) -> &str {
        "replay"
    }

    async fn start(&self) -> Result<mpsc::Receiver<EngineEvent>, Error> {
        let (tx, rx) = mpsc::channel(self.events.len().max(1));
        for event in &self.events {
            tx.send(event.clone())
                .await
                .map_err(|e| Error::Internal(format!("replay stream closed: {e}")))?;
        }
        // Dropping the sender ends the stream after the last event
        Ok(rx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tabhive_core::event::LifecycleEvent;

    const SAMPLE: &str = r#"
# two tabs, then a switch
{"kind":"lifecycle","type":"agent_created","agent_id":"t1","url":"https://mail.google.com/"}
{"kind":"lifecycle","type":"agent_created","agent_id":"t2","url":"https://youtube.com/"}

{"kind":"lifecycle","type":"agent_activated","agent_id":"t2"}
{"kind":"history","type":"all_visits_removed"}
"#;

    #[test]
    fn parses_jsonl_and_skips_comments() {
        let source = ReplaySource::from_jsonl(SAMPLE).unwrap();
        assert_eq!(source.len(), 4);
    }

    #[test]
    fn bad_line_is_an_error() {
        let result = ReplaySource::from_jsonl("{\"kind\":\"lifecycle\",\"type\":\"bogus\"}");
        assert!(matches!(result, Err(Error::Serialization(_))));
    }

    #[tokio::test]
    async fn stream_ends_after_last_event() {
        let source = ReplaySource::from_jsonl(SAMPLE).unwrap();
        let mut rx = source.start().await.unwrap();
        let first = rx.recv().await.unwrap();
        assert!(matches!(
            first,
            EngineEvent::Lifecycle(LifecycleEvent::AgentCreated { .. })
        ));
        let mut rest = 0;
        while rx.recv().await.is_some() {
            rest += 1;
        }
        assert_eq!(rest, 3);
    }
}
