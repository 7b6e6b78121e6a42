//! Configuration loading, validation, and management for TabHive.
//!
//! Loads configuration from `~/.tabhive/config.toml` with environment
//! variable overrides. Validates all settings at startup.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// The root configuration structure.
///
/// Maps directly to `~/.tabhive/config.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Registry, history cache, and snapshot settings
    #[serde(default)]
    pub engine: EngineConfig,

    /// Dispatch retry and recovery settings
    #[serde(default)]
    pub dispatch: DispatchConfig,

    /// Fuzzy target resolution tuning
    #[serde(default)]
    pub resolver: ResolverConfig,

    /// External command bridge settings
    #[serde(default)]
    pub bridge: BridgeConfig,

    /// HTTP gateway configuration
    #[serde(default)]
    pub gateway: GatewayConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Maximum number of history records kept in memory.
    #[serde(default = "default_history_capacity")]
    pub history_capacity: usize,

    /// How many recent history records each snapshot carries.
    #[serde(default = "default_snapshot_history_limit")]
    pub snapshot_history_limit: usize,

    /// Capacity of the snapshot broadcast channel.
    #[serde(default = "default_broadcast_capacity")]
    pub broadcast_capacity: usize,
}

fn default_history_capacity() -> usize {
    240
}
fn default_snapshot_history_limit() -> usize {
    60
}
fn default_broadcast_capacity() -> usize {
    64
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            history_capacity: default_history_capacity(),
            snapshot_history_limit: default_snapshot_history_limit(),
            broadcast_capacity: default_broadcast_capacity(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatchConfig {
    /// Send attempts for ordinary actions.
    #[serde(default = "default_generic_max_attempts")]
    pub generic_max_attempts: u32,

    /// Send attempts for actions that need a specific page state; the first
    /// navigation can race with bootstrap injection.
    #[serde(default = "default_page_state_max_attempts")]
    pub page_state_max_attempts: u32,

    /// Actions that use `page_state_max_attempts`.
    #[serde(default = "default_page_state_actions")]
    pub page_state_actions: Vec<String>,

    /// Readiness probes per recoverable-timing failure.
    #[serde(default = "default_readiness_poll_attempts")]
    pub readiness_poll_attempts: u32,

    /// Fixed delay between readiness probes.
    #[serde(default = "default_readiness_poll_delay_ms")]
    pub readiness_poll_delay_ms: u64,

    /// Files re-injected into a page whose agent stopped answering.
    #[serde(default = "default_bootstrap_files")]
    pub bootstrap_files: Vec<String>,
}

fn default_generic_max_attempts() -> u32 {
    2
}
fn default_page_state_max_attempts() -> u32 {
    3
}
fn default_page_state_actions() -> Vec<String> {
    vec![
        "navigate".into(),
        "open_conversation".into(),
        "compose_message".into(),
        "fill_form".into(),
    ]
}
fn default_readiness_poll_attempts() -> u32 {
    10
}
fn default_readiness_poll_delay_ms() -> u64 {
    250
}
fn default_bootstrap_files() -> Vec<String> {
    vec!["agent/bootstrap.js".into()]
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            generic_max_attempts: default_generic_max_attempts(),
            page_state_max_attempts: default_page_state_max_attempts(),
            page_state_actions: default_page_state_actions(),
            readiness_poll_attempts: default_readiness_poll_attempts(),
            readiness_poll_delay_ms: default_readiness_poll_delay_ms(),
            bootstrap_files: default_bootstrap_files(),
        }
    }
}

/// Weights for fuzzy target resolution. Empirically tuned.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolverConfig {
    /// Whole selector found verbatim in title or host.
    #[serde(default = "default_exact_weight")]
    pub exact_weight: f64,

    /// Selector found once whitespace is removed on both sides.
    #[serde(default = "default_compact_weight")]
    pub compact_weight: f64,

    /// Per matching token.
    #[serde(default = "default_token_weight")]
    pub token_weight: f64,

    /// Added when every token of a multi-token selector matches.
    #[serde(default = "default_all_tokens_bonus")]
    pub all_tokens_bonus: f64,

    /// Minimum score for an agent to count as a match in multi-target mode.
    #[serde(default = "default_floor")]
    pub floor: f64,

    /// Command verbs and articles dropped from selectors before scoring.
    #[serde(default = "default_filler_words")]
    pub filler_words: Vec<String>,

    /// Words that switch resolution into multi-target mode.
    #[serde(default = "default_group_hints")]
    pub group_hints: Vec<String>,
}

fn default_exact_weight() -> f64 {
    10.0
}
fn default_compact_weight() -> f64 {
    6.0
}
fn default_token_weight() -> f64 {
    2.0
}
fn default_all_tokens_bonus() -> f64 {
    3.0
}
fn default_floor() -> f64 {
    2.0
}
fn default_filler_words() -> Vec<String> {
    [
        "close", "cierra", "cerrar", "cierre", "focus", "open", "abre", "abrir", "go", "ve",
        "switch", "show", "muestra", "the", "el", "la", "los", "las", "a", "to", "de", "del",
        "tab", "pestana", "pagina", "page", "please", "por", "favor",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}
fn default_group_hints() -> Vec<String> {
    [
        "all", "every", "todas", "todos", "tabs", "pestanas", "paginas", "pages",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            exact_weight: default_exact_weight(),
            compact_weight: default_compact_weight(),
            token_weight: default_token_weight(),
            all_tokens_bonus: default_all_tokens_bonus(),
            floor: default_floor(),
            filler_words: default_filler_words(),
            group_hints: default_group_hints(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BridgeConfig {
    /// Hosts allowed to send external commands. Entries are exact hosts or
    /// `*.suffix` wildcards. Empty = reject every external sender.
    #[serde(default)]
    pub allowed_origins: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default = "default_host")]
    pub host: String,
}

fn default_port() -> u16 {
    42618
}
fn default_host() -> String {
    "127.0.0.1".into()
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            host: default_host(),
        }
    }
}

impl AppConfig {
    /// Load configuration from the default path (~/.tabhive/config.toml).
    ///
    /// Environment overrides:
    /// - `TABHIVE_ALLOWED_ORIGINS` (comma-separated hosts, replaces the list)
    /// - `TABHIVE_PORT`
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::config_dir().join("config.toml");
        let mut config = Self::load_from(&config_path)?;

        if let Ok(origins) = std::env::var("TABHIVE_ALLOWED_ORIGINS") {
            config.bridge.allowed_origins = parse_origin_list(&origins);
        }

        if let Ok(port) = std::env::var("TABHIVE_PORT") {
            config.gateway.port = port.parse().map_err(|_| {
                ConfigError::ValidationError(format!("TABHIVE_PORT is not a port: {port}"))
            })?;
        }

        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific file path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::info!("No config file found at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".tabhive")
    }

    /// Validate the configuration.
    fn validate(&self) -> Result<(), ConfigError> {
        if self.engine.history_capacity == 0 {
            return Err(ConfigError::ValidationError(
                "engine.history_capacity must be > 0".into(),
            ));
        }

        if self.dispatch.generic_max_attempts == 0 || self.dispatch.page_state_max_attempts == 0
        {
            return Err(ConfigError::ValidationError(
                "dispatch attempt budgets must be >= 1".into(),
            ));
        }

        if self.resolver.floor < 0.0 {
            return Err(ConfigError::ValidationError(
                "resolver.floor must be >= 0".into(),
            ));
        }

        if let Some(bad) = self
            .bridge
            .allowed_origins
            .iter()
            .find(|o| o.contains("://") || o.contains('/'))
        {
            return Err(ConfigError::ValidationError(format!(
                "bridge.allowed_origins takes hosts, not urls: {bad}"
            )));
        }

        Ok(())
    }

    /// Generate a default config TOML string (for `onboard` command).
    pub fn default_toml() -> String {
        let config = Self::default();
        toml::to_string_pretty(&config).unwrap_or_default()
    }
}

fn parse_origin_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim().to_lowercase())
        .filter(|s| !s.is_empty())
        .collect()
}

/// Get the user's home directory.
fn dirs_home() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        std::env::var("USERPROFILE")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("C:\\Users\\Default"))
    }
    #[cfg(not(target_os = "windows"))]
    {
        std::env::var("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("/tmp"))
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file at {path}: {reason}")]
    ReadError { path: PathBuf, reason: String },

    #[error("Failed to parse config file at {path}: {reason}")]
    ParseError { path: PathBuf, reason: String },

    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}
