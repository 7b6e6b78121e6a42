//! The response envelope shared by dispatch and every bridge command.

use serde::{Deserialize, Serialize};

/// `{ok, result?, error?}`: every public call resolves to one of these.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub ok: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// What an agent returns for a dispatched action.
pub type DispatchResult = Envelope;

impl Envelope {
    pub fn success(result: serde_json::Value) -> Self {
        Self {
            ok: true,
            result: Some(result),
            error: None,
        }
    }

    pub fn empty_success() -> Self {
        Self {
            ok: true,
            result: None,
            error: None,
        }
    }

    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            ok: false,
            result: None,
            error: Some(error.into()),
        }
    }

    /// A failure that still carries structured data (e.g. the command catalog).
    pub fn failure_with(error: impl Into<String>, result: serde_json::Value) -> Self {
        Self {
            ok: false,
            result: Some(result),
            error: Some(error.into()),
        }
    }

    pub fn error_message(&self) -> &str {
        self.error.as_deref().unwrap_or("")
    }
}
