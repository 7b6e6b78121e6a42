//! # TabHive Engine
//!
//! Keeps one canonical context per live agent and turns host events into
//! full-state snapshots:
//!
//! - [`registry`]: agent records, keyed and ordered by id
//! - [`temporal`]: foreground and dwell time, importance scoring
//! - [`history`]: bounded, url-keyed cache of the history log
//! - [`snapshot`]: snapshot assembly and fan-out
//! - [`dispatch`]: action delivery with bounded recovery
//! - [`resolve`]: fuzzy "which tab did they mean" matching
//! - [`engine`]: the [`Engine`] that owns all of the above

pub mod classify;
pub mod dispatch;
pub mod engine;
pub mod history;
pub mod memory_host;
pub mod registry;
pub mod replay;
pub mod resolve;
pub mod runtime_context;
pub mod snapshot;
pub mod temporal;

pub use classify::classify_url;
pub use dispatch::{AgentLiveness, DispatchController, RetryPolicy};
pub use engine::Engine;
pub use history::HistoryCache;
pub use memory_host::{HostPage, InMemoryHost};
pub use registry::AgentRegistry;
pub use replay::ReplaySource;
pub use resolve::{Candidate, TargetMatch, TargetQuery, TargetResolver, normalize};
pub use runtime_context::RuntimeContextStore;
pub use snapshot::{BroadcastReport, SnapshotBuilder, SubscriptionBroadcaster};
pub use temporal::{TemporalState, TemporalTracker, importance_score};
