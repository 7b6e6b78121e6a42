//! The public command catalog and its routing table.
//!
//! Each route maps a public command name to a typed [`Command`] through an
//! argument adapter. Adding a command means adding a route here and an arm
//! in the bridge's executor.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use tabhive_core::agent::AgentId;
use tabhive_core::error::BridgeError;
use tabhive_core::history::HistoryQuery;

/// Catalog revision reported by `help`.
pub const CATALOG_VERSION: u32 = 1;

/// Default and maximum `limit` for `recentHistory`.
pub const DEFAULT_RECENT_LIMIT: usize = 20;
pub const MAX_RECENT_LIMIT: usize = 240;

/// One argument of a command, as documented by `help`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ArgSpec {
    pub name: &'static str,
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub required: bool,
}

const fn arg(name: &'static str, kind: &'static str, required: bool) -> ArgSpec {
    ArgSpec {
        name,
        kind,
        required,
    }
}

/// Public description of a command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandSpec {
    pub name: &'static str,
    pub summary: &'static str,
    pub args: &'static [ArgSpec],
    /// Refused for external callers.
    pub internal_only: bool,
}

/// Selects agents either by id or by a free-text query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    Id(AgentId),
    Query { selector: String, match_all: bool },
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TargetArgs {
    #[serde(default)]
    agent_id: Option<AgentId>,
    #[serde(default)]
    query: Option<String>,
    #[serde(default)]
    match_all: bool,
}

impl TargetArgs {
    fn into_target(self) -> Result<Target, BridgeError> {
        match (self.agent_id, self.query) {
            (Some(agent_id), None) => Ok(Target::Id(agent_id)),
            (None, Some(query)) if !query.trim().is_empty() => Ok(Target::Query {
                selector: query,
                match_all: self.match_all,
            }),
            (Some(_), Some(_)) => Err(BridgeError::Validation(
                "pass either agentId or query, not both".into(),
            )),
            _ => Err(BridgeError::Validation("agentId or query is required".into())),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GetAgentArgs {
    agent_id: AgentId,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FindArgs {
    query: String,
    #[serde(default)]
    match_all: bool,
}

#[derive(Debug, Deserialize)]
struct RecentArgs {
    #[serde(default)]
    limit: Option<usize>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DispatchArgs {
    #[serde(flatten)]
    target: TargetArgs,
    action: String,
    #[serde(default)]
    payload: serde_json::Value,
}

/// A validated command ready to execute.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Help,
    ListAgents,
    GetAgent(AgentId),
    FindAgents {
        query: String,
        match_all: bool,
    },
    FocusAgent(Target),
    CloseAgents(Target),
    GetSnapshot,
    RecentHistory {
        limit: usize,
    },
    SearchHistory(HistoryQuery),
    DispatchAction {
        target: Target,
        action: String,
        payload: serde_json::Value,
    },
}

type Adapter = fn(serde_json::Value) -> Result<Command, BridgeError>;

/// Routing table entry: public spec plus argument adapter.
pub struct Route {
    pub spec: CommandSpec,
    adapter: Adapter,
}

impl Route {
    /// Validate raw arguments into a [`Command`].
    pub fn parse(&self, args: serde_json::Value) -> Result<Command, BridgeError> {
        (self.adapter)(args)
    }
}

impl std::fmt::Debug for Route {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Route").field("spec", &self.spec).finish()
    }
}

fn args<T: DeserializeOwned>(value: serde_json::Value) -> Result<T, BridgeError> {
    // Commands without arguments may be sent with `args` omitted
    let value = if value.is_null() {
        serde_json::Value::Object(Default::default())
    } else {
        value
    };
    serde_json::from_value(value).map_err(|e| BridgeError::Validation(e.to_string()))
}

static ROUTES: &[Route] = &[
    Route {
        spec: CommandSpec {
            name: "help",
            summary: "List every supported command and its arguments",
            args: &[],
            internal_only: false,
        },
        adapter: |_| Ok(Command::Help),
    },
    Route {
        spec: CommandSpec {
            name: "listAgents",
            summary: "All live agents with their context",
            args: &[],
            internal_only: false,
        },
        adapter: |_| Ok(Command::ListAgents),
    },
    Route {
        spec: CommandSpec {
            name: "getAgent",
            summary: "One agent's context by id",
            args: &[arg("agentId", "string", true)],
            internal_only: false,
        },
        adapter: |value| args::<GetAgentArgs>(value).map(|a| Command::GetAgent(a.agent_id)),
    },
    Route {
        spec: CommandSpec {
            name: "findAgents",
            summary: "Score agents against a free-text query",
            args: &[arg("query", "string", true), arg("matchAll", "boolean", false)],
            internal_only: false,
        },
        adapter: |value| {
            args::<FindArgs>(value).map(|a| Command::FindAgents {
                query: a.query,
                match_all: a.match_all,
            })
        },
    },
    Route {
        spec: CommandSpec {
            name: "focusAgent",
            summary: "Bring an agent to the foreground",
            args: &[arg("agentId", "string", false), arg("query", "string", false)],
            internal_only: false,
        },
        adapter: |value| {
            args::<TargetArgs>(value)
                .and_then(TargetArgs::into_target)
                .map(Command::FocusAgent)
        },
    },
    Route {
        spec: CommandSpec {
            name: "closeAgents",
            summary: "Close one agent, or every agent matching a query",
            args: &[
                arg("agentId", "string", false),
                arg("query", "string", false),
                arg("matchAll", "boolean", false),
            ],
            internal_only: false,
        },
        adapter: |value| {
            args::<TargetArgs>(value)
                .and_then(TargetArgs::into_target)
                .map(Command::CloseAgents)
        },
    },
    Route {
        spec: CommandSpec {
            name: "getSnapshot",
            summary: "The current full-state snapshot",
            args: &[],
            internal_only: false,
        },
        adapter: |_| Ok(Command::GetSnapshot),
    },
    Route {
        spec: CommandSpec {
            name: "recentHistory",
            summary: "Most recent cached history records",
            args: &[arg("limit", "number", false)],
            internal_only: false,
        },
        adapter: |value| {
            args::<RecentArgs>(value).map(|a| Command::RecentHistory {
                limit: a
                    .limit
                    .unwrap_or(DEFAULT_RECENT_LIMIT)
                    .min(MAX_RECENT_LIMIT),
            })
        },
    },
    Route {
        spec: CommandSpec {
            name: "searchHistory",
            summary: "Search the history log by text and time window",
            args: &[
                arg("text", "string", true),
                arg("maxResults", "number", false),
                arg("startTime", "number", false),
                arg("endTime", "number", false),
            ],
            internal_only: false,
        },
        adapter: |value| args::<HistoryQuery>(value).map(Command::SearchHistory),
    },
    Route {
        spec: CommandSpec {
            name: "dispatchAction",
            summary: "Send a raw action to an agent",
            args: &[
                arg("agentId", "string", false),
                arg("query", "string", false),
                arg("action", "string", true),
                arg("payload", "object", false),
            ],
            internal_only: true,
        },
        adapter: |value| {
            let a = args::<DispatchArgs>(value)?;
            if a.action.trim().is_empty() {
                return Err(BridgeError::Validation("action must not be empty".into()));
            }
            Ok(Command::DispatchAction {
                target: a.target.into_target()?,
                action: a.action,
                payload: a.payload,
            })
        },
    },
];

/// Look up a route by its public name.
pub fn route(name: &str) -> Option<&'static Route> {
    ROUTES.iter().find(|r| r.spec.name == name)
}

/// Every command, in catalog order.
pub fn catalog() -> impl Iterator<Item = &'static CommandSpec> {
    ROUTES.iter().map(|r| &r.spec)
}

/// Names of every command, in catalog order.
pub fn command_names() -> Vec<&'static str> {
    catalog().map(|spec| spec.name).collect()
}
