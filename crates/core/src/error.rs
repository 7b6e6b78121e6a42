//! Error types for the TabHive domain.
//!
//! Uses `thiserror` for ergonomic error definitions.
//! Each bounded context has its own error variant.

use thiserror::Error;

/// The top-level error type for all TabHive operations.
#[derive(Debug, Error)]
pub enum Error {
    // --- Dispatch transport errors ---
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    // --- Command bridge errors ---
    #[error("Bridge error: {0}")]
    Bridge(#[from] BridgeError),

    // --- History provider errors ---
    #[error("History error: {0}")]
    History(#[from] HistoryError),

    // --- Subscriber errors ---
    #[error("Subscriber error: {0}")]
    Subscriber(#[from] SubscriberError),

    // --- Serialization ---
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    // --- Generic ---
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias using our Error.
pub type Result<T> = std::result::Result<T, Error>;

// --- Bounded context errors ---

/// Failures reported by the host when talking to an agent.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    /// Nothing is listening inside the page (bootstrap missing or torn down).
    #[error("No receiver for agent: {0}")]
    NoReceiver(String),

    /// The host page exists but has not finished loading.
    #[error("Agent page not ready: {0}")]
    NotReady(String),

    /// The frame the agent lives in is missing or was swapped.
    #[error("Agent frame missing: {0}")]
    FrameMissing(String),

    /// The agent is gone for good (page closed, id recycled).
    #[error("Agent gone: {0}")]
    Gone(String),

    /// The host refuses access to this page.
    #[error("Access denied: {0}")]
    AccessDenied(String),

    /// Anything else; classified by its message.
    #[error("{0}")]
    Other(String),
}

/// How the dispatch controller reacts to a transport failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// Re-inject the bootstrap program, then retry.
    NoReceiver,
    /// Wait for the page to become ready, then retry.
    RecoverableTiming,
    /// Give up immediately.
    NonRecoverable,
}

impl FailureKind {
    /// Classify a raw host error message.
    ///
    /// Hosts usually report failures as free text; these are the phrasings
    /// browsers use for the two recoverable cases.
    pub fn classify_message(message: &str) -> Self {
        let lower = message.to_lowercase();
        if lower.contains("receiving end does not exist")
            || lower.contains("could not establish connection")
            || lower.contains("no receiver")
        {
            FailureKind::NoReceiver
        } else if lower.contains("no frame with id")
            || lower.contains("frame with id")
            || lower.contains("not ready")
            || lower.contains("is loading")
            || lower.contains("frame was removed")
        {
            FailureKind::RecoverableTiming
        } else {
            FailureKind::NonRecoverable
        }
    }
}

impl TransportError {
    /// The recovery strategy for this failure.
    pub fn kind(&self) -> FailureKind {
        match self {
            TransportError::NoReceiver(_) => FailureKind::NoReceiver,
            TransportError::NotReady(_) | TransportError::FrameMissing(_) => {
                FailureKind::RecoverableTiming
            }
            TransportError::Gone(_) | TransportError::AccessDenied(_) => {
                FailureKind::NonRecoverable
            }
            TransportError::Other(message) => FailureKind::classify_message(message),
        }
    }
}

/// Errors raised at the command boundary. Never retried.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BridgeError {
    #[error("Unauthorized sender {origin}: {reason}")]
    Unauthorized { origin: String, reason: String },

    #[error("Invalid arguments: {0}")]
    Validation(String),

    #[error("Unsupported command: {0}")]
    Unsupported(String),

    #[error("Command '{0}' is only available to internal callers")]
    InternalOnly(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Command failed: {0}")]
    Failed(String),
}

#[derive(Debug, Clone, Error)]
pub enum HistoryError {
    #[error("History provider unavailable: {0}")]
    Unavailable(String),
}

#[derive(Debug, Clone, Error)]
pub enum SubscriberError {
    #[error("Subscriber disconnected: {0}")]
    Disconnected(String),

    #[error("Subscriber rejected snapshot: {0}")]
    Rejected(String),
}
