//! End-to-end behaviour of the engine over the in-memory host.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use parking_lot::Mutex;
use tabhive_config::AppConfig;
use tabhive_core::agent::{AgentContext, AgentId};
use tabhive_core::clock::ManualClock;
use tabhive_core::error::{SubscriberError, TransportError};
use tabhive_core::event::LifecycleEvent;
use tabhive_core::history::{HistoryEvent, HistoryRecord};
use tabhive_core::snapshot::{Snapshot, SnapshotSubscriber};
use tabhive_engine::{
    AgentRegistry, Engine, HistoryCache, InMemoryHost, TargetQuery, TemporalTracker,
};

const T0: i64 = 1_700_000_000_000;

struct Harness {
    engine: Engine,
    host: Arc<InMemoryHost>,
    clock: Arc<ManualClock>,
}

impl Harness {
    fn new() -> Self {
        let host = Arc::new(InMemoryHost::new());
        let clock = Arc::new(ManualClock::new(T0));
        let engine =
            Engine::from_host(&AppConfig::default(), host.clone()).with_clock(clock.clone());
        Self {
            engine,
            host,
            clock,
        }
    }

    /// Open a page on the host and tell the engine about it.
    async fn open(&self, agent: &str, url: &str, title: &str) -> AgentId {
        let agent_id = self.host.open_page(agent, url, title);
        self.engine
            .handle(LifecycleEvent::AgentCreated {
                agent_id: agent_id.clone(),
                url: url.into(),
            })
            .await;
        self.engine
            .handle(LifecycleEvent::AgentUpdated {
                agent_id: agent_id.clone(),
                url: None,
                title: Some(title.into()),
                status: None,
            })
            .await;
        agent_id
    }

    async fn activate(&self, agent_id: &AgentId) {
        self.engine
            .handle(LifecycleEvent::AgentActivated {
                agent_id: agent_id.clone(),
            })
            .await;
    }
}

// --- Temporal scenarios ---

#[tokio::test]
async fn foreground_agent_accrues_active_and_dwell_time() {
    let h = Harness::new();
    let a1 = h.open("a1", "https://example.com/x", "X").await;
    h.activate(&a1).await;

    h.clock.advance(5_000);
    let temporal = h.engine.temporal_snapshot(&a1).unwrap();
    assert_eq!(temporal.active_duration_ms, 5_000);
    assert_eq!(temporal.dwell_time_ms, 5_000);
}

#[tokio::test]
async fn navigation_restarts_the_visit() {
    let h = Harness::new();
    let a1 = h.open("a1", "https://example.com/x", "X").await;
    h.activate(&a1).await;
    h.clock.advance(5_000);

    h.engine
        .handle(LifecycleEvent::AgentUpdated {
            agent_id: a1.clone(),
            url: Some("https://example.com/y".into()),
            title: None,
            status: None,
        })
        .await;

    let temporal = h.engine.temporal_snapshot(&a1).unwrap();
    assert_eq!(temporal.dwell_time_ms, 0);
    assert_eq!(temporal.active_duration_ms, 0);
    assert_eq!(temporal.visit_started_at, T0 + 5_000);

    // still foregrounded, so active time resumes from the navigation instant
    h.clock.advance(2_000);
    let temporal = h.engine.temporal_snapshot(&a1).unwrap();
    assert_eq!(temporal.active_duration_ms, 2_000);
}

#[tokio::test]
async fn background_navigation_does_not_arm() {
    let h = Harness::new();
    let a = h.open("a", "https://a.test", "A").await;
    let b = h.open("b", "https://b.test", "B").await;
    h.activate(&a).await;
    h.clock.advance(1_000);

    h.engine
        .handle(LifecycleEvent::AgentUpdated {
            agent_id: b.clone(),
            url: Some("https://b.test/next".into()),
            title: None,
            status: None,
        })
        .await;
    h.clock.advance(3_000);
    assert_eq!(h.engine.temporal_snapshot(&b).unwrap().active_duration_ms, 0);
    assert_eq!(h.engine.temporal_snapshot(&a).unwrap().active_duration_ms, 4_000);
}

#[tokio::test]
async fn host_blur_pauses_active_time() {
    let h = Harness::new();
    let a = h.open("a", "https://a.test", "A").await;
    h.activate(&a).await;
    h.clock.advance(1_000);
    h.engine
        .handle(LifecycleEvent::HostFocusChanged { host_id: None })
        .await;
    h.clock.advance(10_000);
    assert_eq!(h.engine.temporal_snapshot(&a).unwrap().active_duration_ms, 1_000);

    h.engine
        .handle(LifecycleEvent::HostFocusChanged {
            host_id: Some("window-1".into()),
        })
        .await;
    h.clock.advance(500);
    assert_eq!(h.engine.temporal_snapshot(&a).unwrap().active_duration_ms, 1_500);
}

#[test]
fn single_active_agent_under_random_walk() {
    let mut tracker = TemporalTracker::new();
    let ids: Vec<AgentId> = (0..4).map(|i| AgentId::from(format!("t{i}"))).collect();
    // deterministic pseudo-random walk
    let mut seed: u64 = 0x2545_f491_4f6c_dd1d;
    let mut now = T0;
    for agent in &ids {
        tracker.track(agent, now);
    }
    for _ in 0..500 {
        seed ^= seed << 13;
        seed ^= seed >> 7;
        seed ^= seed << 17;
        now += (seed % 5_000) as i64;
        let agent = &ids[(seed % ids.len() as u64) as usize];
        match seed % 6 {
            0 => tracker.navigated(agent, now),
            1 => tracker.host_focus_changed(seed % 2 == 0, now),
            2 => {
                tracker.remove(agent);
                tracker.track(agent, now);
            }
            _ => tracker.set_foreground(Some(agent), now),
        }
        assert!(tracker.active_count() <= 1);
    }
}

// --- Snapshot properties ---

#[tokio::test]
async fn repeated_builds_differ_only_in_timestamp() {
    let h = Harness::new();
    let a = h.open("a", "https://a.test", "A").await;
    h.activate(&a).await;

    let first = h.engine.request_snapshot();
    h.clock.advance(60_000);
    let second = h.engine.request_snapshot();

    assert!(first.same_state_as(&second));
    assert_eq!(second.updated_at - first.updated_at, 60_000);
}

#[tokio::test]
async fn snapshot_never_names_an_unknown_active_agent() {
    let h = Harness::new();
    let a = h.open("a", "https://a.test", "A").await;
    h.activate(&a).await;
    let ghost = AgentId::from("ghost");
    h.activate(&ghost).await;

    let snapshot = h.engine.request_snapshot();
    assert_eq!(snapshot.active_agent_id, None);
    assert!(snapshot.agent(&a).is_some());
    assert_eq!(h.engine.active_agent_id(), None);

    // the page shows up after its activation
    h.engine
        .handle(LifecycleEvent::AgentCreated {
            agent_id: ghost.clone(),
            url: "https://ghost.test".into(),
        })
        .await;
    assert_eq!(h.engine.request_snapshot().active_agent_id, Some(ghost));
}

#[test]
fn reupserting_unchanged_context_only_touches_updated_at() {
    let mut registry = AgentRegistry::new();
    let mut context = AgentContext::new("a1", "https://a.test");
    context.title = "A".into();
    registry.upsert(context.clone(), T0);
    let before = registry.get(&AgentId::from("a1")).cloned().unwrap();

    registry.upsert(context, T0 + 1_000);
    let mut after = registry.get(&AgentId::from("a1")).cloned().unwrap();
    assert_eq!(after.updated_at, T0 + 1_000);
    after.updated_at = before.updated_at;
    assert_eq!(after, before);
}

#[test]
fn history_cache_keeps_top_capacity_by_recency() {
    let mut cache = HistoryCache::default();
    let mut seed: u64 = 88_172_645_463_325_252;
    let mut all = Vec::new();
    for i in 0..600 {
        seed ^= seed << 13;
        seed ^= seed >> 7;
        seed ^= seed << 17;
        let t = (seed % 1_000_000) as i64;
        let url = format!("https://site{}.test", i % 400);
        all.push((url.clone(), t));
        cache.upsert(HistoryRecord::new(url, t));
        assert!(cache.len() <= cache.capacity());
    }
    assert_eq!(cache.len(), cache.capacity());

    // each url keeps its latest visit; the cache holds the newest `capacity` of them
    let mut latest: BTreeMap<String, i64> = BTreeMap::new();
    for (url, t) in all {
        let entry = latest.entry(url).or_insert(t);
        *entry = (*entry).max(t);
    }
    let mut ranked: Vec<(String, i64)> = latest.into_iter().collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    let expected: BTreeSet<String> = ranked
        .into_iter()
        .take(cache.capacity())
        .map(|(url, _)| url)
        .collect();

    let kept: BTreeSet<String> = cache
        .recent(cache.capacity())
        .into_iter()
        .map(|r| r.url.clone())
        .collect();
    assert_eq!(kept, expected);
}

struct Flaky {
    delivered: Mutex<Vec<Arc<Snapshot>>>,
}

impl SnapshotSubscriber for Flaky {
    fn name(&self) -> &str {
        "flaky"
    }

    fn on_snapshot(&self, snapshot: Arc<Snapshot>) -> Result<(), SubscriberError> {
        let mut delivered = self.delivered.lock();
        delivered.push(snapshot);
        if delivered.len() % 2 == 0 {
            return Err(SubscriberError::Rejected("busy".into()));
        }
        Ok(())
    }
}

#[tokio::test]
async fn subscriber_errors_never_reach_the_caller() {
    let h = Harness::new();
    let flaky = Arc::new(Flaky {
        delivered: Mutex::new(Vec::new()),
    });
    h.engine.subscribe(flaky.clone());

    let first = h
        .engine
        .handle(LifecycleEvent::AgentCreated {
            agent_id: AgentId::from("a"),
            url: "https://a.test".into(),
        })
        .await
        .unwrap();
    assert_eq!((first.delivered, first.failed), (1, 0));

    let second = h
        .engine
        .handle(LifecycleEvent::AgentRemoved {
            agent_id: AgentId::from("a"),
        })
        .await
        .unwrap();
    assert_eq!((second.delivered, second.failed), (0, 1));

    let reasons: Vec<String> = flaky
        .delivered
        .lock()
        .iter()
        .map(|s| s.reason.clone())
        .collect();
    assert_eq!(reasons, vec!["agent_created", "agent_removed"]);
}

#[tokio::test]
async fn history_push_events_flow_into_snapshots() {
    let h = Harness::new();
    let a = h.open("a", "https://a.test", "A").await;
    let mut record = HistoryRecord::new("https://a.test", T0);
    record.visit_count = 7;
    h.engine.handle_history(HistoryEvent::Visited(record));

    let snapshot = h.engine.request_snapshot();
    assert_eq!(snapshot.history.len(), 1);
    assert_eq!(snapshot.agent(&a).unwrap().history.as_ref().unwrap().visit_count, 7);
}

// --- Dispatch ---

#[tokio::test]
async fn reinjection_recovers_a_dropped_receiver() {
    let h = Harness::new();
    let a = h.open("a", "https://a.test", "A").await;
    h.host.drop_receiver(&a);

    let result = h.engine.dispatch(&a, "click", serde_json::Value::Null).await;
    assert!(result.ok);
    assert_eq!(h.host.injections(), vec![a.clone()]);
    assert_eq!(h.host.sent_to(&a).len(), 2);
}

#[tokio::test]
async fn permanent_no_receiver_exhausts_attempts() {
    let h = Harness::new();
    let a = h.open("a", "https://a.test", "A").await;
    for _ in 0..3 {
        h.host.script(
            &a,
            Err(TransportError::Other(
                "Could not establish connection. Receiving end does not exist.".into(),
            )),
        );
    }

    let result = h.engine.dispatch(&a, "click", serde_json::Value::Null).await;
    assert!(!result.ok);
    assert_eq!(h.host.sent_to(&a).len(), 2);

    let result = h
        .engine
        .dispatch(&a, "navigate", serde_json::json!({"url": "https://b.test"}))
        .await;
    // one scripted failure left, then the page answers
    assert!(result.ok);
}

#[tokio::test(start_paused = true)]
async fn loading_page_is_waited_for() {
    let h = Harness::new();
    let a = h.open("a", "https://a.test", "A").await;
    h.host.begin_loading(&a, 3);

    let result = h
        .engine
        .dispatch(&a, "fill_form", serde_json::json!({"name": "Ada"}))
        .await;
    assert!(result.ok);
    assert_eq!(h.host.sent_to(&a).len(), 2);
    assert!(h.host.injections().is_empty());
}

#[tokio::test]
async fn dispatch_result_folds_page_content() {
    let h = Harness::new();
    let a = h.open("a", "https://a.test", "A").await;
    let mut rx = h.engine.snapshot_channel();
    h.host.script(
        &a,
        Ok(tabhive_core::envelope::Envelope::success(serde_json::json!({
            "title": "A - Dashboard",
            "textExcerpt": "3 unread alerts",
            "details": {"alerts": 3},
        }))),
    );

    let result = h.engine.dispatch(&a, "read_page", serde_json::Value::Null).await;
    assert!(result.ok);

    let agent = h.engine.get_agent(&a).unwrap();
    assert_eq!(agent.title, "A - Dashboard");
    assert_eq!(agent.text_excerpt, "3 unread alerts");
    assert_eq!(agent.details["alerts"], 3);
    assert_eq!(rx.recv().await.unwrap().reason, "dispatch_completed");
}

// --- Target resolution ---

#[tokio::test]
async fn close_by_query_picks_the_gmail_tab() {
    let h = Harness::new();
    let gmail = h
        .open("g", "https://mail.google.com/mail/u/0/#inbox", "Bandeja de entrada - GMAIL")
        .await;
    let other = h.open("o", "https://www.elpais.com/", "EL PAÍS: el periódico global").await;

    let targets = h.engine.resolve_targets(&TargetQuery::new("Cierra Gmail"));
    assert_eq!(targets.len(), 1);
    assert_eq!(targets[0].agent_id, gmail);

    let ids: Vec<AgentId> = targets.into_iter().map(|t| t.agent_id).collect();
    let closed = h.engine.close_agents(&ids).await.unwrap();
    assert_eq!(closed, vec![gmail.clone()]);
    assert!(h.engine.get_agent(&gmail).is_none());
    assert!(h.engine.get_agent(&other).is_some());

    // accents in the query do not matter either
    let targets = h.engine.resolve_targets(&TargetQuery::new("periodico"));
    assert_eq!(targets[0].agent_id, other);
}

#[tokio::test]
async fn ties_prefer_the_most_recently_focused() {
    let h = Harness::new();
    let first = h.open("y1", "https://www.youtube.com/watch?v=1", "Song - YouTube").await;
    let second = h.open("y2", "https://www.youtube.com/watch?v=2", "Song - YouTube").await;
    h.activate(&second).await;
    h.clock.advance(1_000);
    h.activate(&first).await;

    let targets = h.engine.resolve_targets(&TargetQuery::new("youtube"));
    assert_eq!(targets[0].agent_id, first);

    let all = h
        .engine
        .resolve_targets(&TargetQuery::new("close all youtube tabs"));
    assert_eq!(all.len(), 2);
}

#[tokio::test]
async fn activation_while_blurred_still_counts_for_ties() {
    let h = Harness::new();
    let first = h.open("y1", "https://www.youtube.com/watch?v=1", "Song - YouTube").await;
    let second = h.open("y2", "https://www.youtube.com/watch?v=2", "Song - YouTube").await;
    h.activate(&first).await;
    h.clock.advance(1_000);
    h.engine
        .handle(LifecycleEvent::HostFocusChanged { host_id: None })
        .await;
    h.clock.advance(1_000);
    h.activate(&second).await;

    let targets = h.engine.resolve_targets(&TargetQuery::new("youtube"));
    assert_eq!(targets[0].agent_id, second);
    // blurred, so nothing accrues active time
    h.clock.advance(5_000);
    assert_eq!(h.engine.temporal_snapshot(&second).unwrap().active_duration_ms, 0);
}
