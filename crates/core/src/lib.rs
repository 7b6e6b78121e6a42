//! # TabHive Core
//!
//! Domain types, traits, and error definitions for the TabHive agent engine.
//! This crate has **no framework dependencies**: it defines the model every
//! other crate implements against.
//!
//! ## Design Philosophy
//!
//! Every collaborator the engine talks to (the host platform, the history log,
//! snapshot consumers) is a trait here. Implementations live elsewhere. This
//! enables:
//! - Driving the engine from a real host, a replay file, or a test double
//! - Unit-testing every handler without a running host
//! - A clean dependency graph (all crates depend inward on core)

pub mod agent;
pub mod clock;
pub mod envelope;
pub mod error;
pub mod event;
pub mod history;
pub mod runtime;
pub mod snapshot;
pub mod transport;

// Re-export key types at crate root for ergonomics
pub use agent::{AgentContext, AgentId, AgentStatus, Classification, TemporalSnapshot};
pub use clock::{Clock, ManualClock, SystemClock};
pub use envelope::{DispatchResult, Envelope};
pub use error::{
    BridgeError, Error, FailureKind, HistoryError, Result, SubscriberError, TransportError,
};
pub use event::{EngineEvent, EventSource, LifecycleEvent};
pub use history::{HistoryEvent, HistoryProvider, HistoryQuery, HistoryRecord};
pub use runtime::{GeoLocation, PermissionState, Permissions, RuntimeContext};
pub use snapshot::{Snapshot, SnapshotReason, SnapshotSubscriber};
pub use transport::{ActionMessage, DispatchTransport, HostControl, ReadinessProbe};
