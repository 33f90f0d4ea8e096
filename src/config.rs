//! Configuration System
//!
//! Provides hierarchical configuration loading from:
//! - ruleflow.toml (default configuration)
//! - ruleflow.local.toml (git-ignored local overrides)
//! - Environment variables (RULEFLOW_* prefix)
//!
//! ## Example
//!
//! ```toml
//! # ruleflow.toml
//! [engine]
//! stage = "prod"
//! service = "connect"
//! utc_offset_minutes = 600
//! rules_path = "/etc/ruleflow/rules.json"
//!
//! [store]
//! backend = "file"
//! data_dir = "/var/lib/ruleflow/sessions"
//!
//! [actions.mocks.prod-connect-balance]
//! delay_ms = 250
//! output = { Balance = "1200" }
//! ```
//!
//! Environment variable overrides:
//! ```bash
//! RULEFLOW_STORE__BACKEND=memory
//! RULEFLOW_CACHE__RULE_SET_TTL_SECS=5
//! ```

use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Main configuration struct
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub actions: ActionsConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub http: HttpConfig,
}

/// Inference engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Deployment stage, first part of qualified function names
    #[serde(default = "default_stage")]
    pub stage: String,

    /// Service name, second part of qualified function names
    #[serde(default = "default_service")]
    pub service: String,

    /// Offset of local time from UTC, in minutes
    #[serde(default)]
    pub utc_offset_minutes: i32,

    /// Address prefixes that identify a mobile caller
    #[serde(default = "default_mobile_prefixes")]
    pub mobile_prefixes: Vec<String>,

    /// JSON document holding the rule sets
    #[serde(default = "default_rules_path")]
    pub rules_path: PathBuf,

    /// JSON document holding queues, flows, functions and prompts
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub catalog_path: Option<PathBuf>,

    /// JSON document holding customer accounts
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub directory_path: Option<PathBuf>,
}

/// Which state store backend to open
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    /// Process-local, lost on restart
    #[default]
    Memory,
    /// One JSON file per session under `data_dir`
    File,
}

/// Session state store configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    #[serde(default)]
    pub backend: StoreBackend,

    /// Directory for the file backend
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// Attribute retention after last write in seconds (default: 24 hours)
    #[serde(default = "default_retention_secs")]
    pub retention_secs: u64,

    /// Maximum write requests per batch
    #[serde(default = "default_max_batch_size")]
    pub max_batch_size: usize,

    /// How often the server purges expired attributes. 0 = never.
    #[serde(default = "default_reap_interval_secs")]
    pub reap_interval_secs: u64,
}

/// Rule set cache configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// How long loaded rule sets stay fresh. 0 = reload every turn.
    #[serde(default = "default_rule_set_ttl_secs")]
    pub rule_set_ttl_secs: u64,
}

/// Action handler configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ActionsConfig {
    /// Canned handlers keyed by qualified function name. A dispatched action
    /// reference matches by full text or by its last `:`/`/` segment.
    #[serde(default)]
    pub mocks: BTreeMap<String, MockActionConfig>,
}

/// A canned action: wait, then succeed with `output` or fail with `error`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MockActionConfig {
    #[serde(default)]
    pub delay_ms: u64,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<serde_json::Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format (text, json)
    #[serde(default = "default_log_format")]
    pub format: String,

    /// Append logs to this file instead of stderr
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<PathBuf>,
}

/// HTTP server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    /// HTTP server bind address
    #[serde(default = "default_http_host")]
    pub host: String,

    /// HTTP server port
    #[serde(default = "default_http_port")]
    pub port: u16,

    /// Allowed CORS origins (empty = same-origin only, unless cors_allow_all is true)
    #[serde(default)]
    pub cors_origins: Vec<String>,

    /// Explicitly allow all CORS origins (dev mode opt-in)
    #[serde(default)]
    pub cors_allow_all: bool,

    /// Maximum request body size in bytes
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,
}

// Default value functions
fn default_stage() -> String {
    "dev".to_string()
}
fn default_service() -> String {
    "ruleflow".to_string()
}
fn default_mobile_prefixes() -> Vec<String> {
    vec!["+614".to_string()]
}
fn default_rules_path() -> PathBuf {
    PathBuf::from("./rules.json")
}
fn default_data_dir() -> PathBuf {
    PathBuf::from("./data/sessions")
}
fn default_retention_secs() -> u64 {
    86_400
} // 24 hours
fn default_max_batch_size() -> usize {
    25
}
fn default_reap_interval_secs() -> u64 {
    60
}
fn default_rule_set_ttl_secs() -> u64 {
    60
}
fn default_log_level() -> String {
    "info".to_string()
}
fn default_log_format() -> String {
    "text".to_string()
}
fn default_http_host() -> String {
    "127.0.0.1".to_string()
}
fn default_http_port() -> u16 {
    8080
}
fn default_max_body_bytes() -> usize {
    1_048_576 // 1 MB
}

impl Config {
    /// Load configuration from default locations
    ///
    /// Merges in order:
    /// 1. ruleflow.toml (base configuration)
    /// 2. ruleflow.local.toml (local overrides, git-ignored)
    /// 3. Environment variables (RULEFLOW_* prefix)
    pub fn load() -> Result<Self, figment::Error> {
        Figment::new()
            .merge(Toml::file("ruleflow.toml"))
            .merge(Toml::file("ruleflow.local.toml"))
            .merge(Env::prefixed("RULEFLOW_").split("__"))
            .extract()
    }

    /// Load configuration from specific file path
    pub fn from_file(path: &str) -> Result<Self, figment::Error> {
        Figment::new()
            .merge(Toml::file(path))
            .merge(Env::prefixed("RULEFLOW_").split("__"))
            .extract()
    }

    /// Create default configuration
    pub fn default() -> Self {
        Config {
            engine: EngineConfig::default(),
            store: StoreConfig::default(),
            cache: CacheConfig::default(),
            actions: ActionsConfig::default(),
            logging: LoggingConfig::default(),
            http: HttpConfig::default(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::default()
    }
}

impl EngineConfig {
    /// Fully qualified function name: `{stage}-{service}-{name}`
    pub fn qualify_function(&self, name: &str) -> String {
        format!("{}-{}-{}", self.stage, self.service, name)
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            stage: default_stage(),
            service: default_service(),
            utc_offset_minutes: 0,
            mobile_prefixes: default_mobile_prefixes(),
            rules_path: default_rules_path(),
            catalog_path: None,
            directory_path: None,
        }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        StoreConfig {
            backend: StoreBackend::Memory,
            data_dir: default_data_dir(),
            retention_secs: default_retention_secs(),
            max_batch_size: default_max_batch_size(),
            reap_interval_secs: default_reap_interval_secs(),
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        CacheConfig {
            rule_set_ttl_secs: default_rule_set_ttl_secs(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        LoggingConfig {
            level: default_log_level(),
            format: default_log_format(),
            file: None,
        }
    }
}

impl Default for HttpConfig {
    fn default() -> Self {
        HttpConfig {
            host: default_http_host(),
            port: default_http_port(),
            cors_origins: Vec::new(),
            cors_allow_all: false,
            max_body_bytes: default_max_body_bytes(),
        }
    }
}
