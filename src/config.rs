//! Configuration system (SPEC_FULL §10.2), grounded on the teacher's
//! three-tier `Figment` layering: `config.toml` → `config.local.toml` →
//! `ENGINE_`-prefixed environment variables.

use crate::operators::topk::TopKBackend;
use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

/// Top-level engine configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub execution: ExecutionConfig,
}

/// Log level/format, same shape the teacher uses.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default = "default_log_format")]
    pub format: String,
}

/// Execution-tuning knobs specific to this engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionConfig {
    /// Backend for windowed top-K / order-by ([`TopKBackend`]).
    #[serde(default = "default_topk_backend")]
    pub topk_backend: String,

    /// Locale used when an `order-by`'s `stringSort` is `"locale"`. No
    /// locale-collation crate is in the dependency stack, so this is
    /// currently informational only — string comparisons fall back to
    /// lexical ordering regardless of locale (see DESIGN.md).
    #[serde(default = "default_locale")]
    pub default_locale: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "text".to_string()
}

fn default_topk_backend() -> String {
    "array".to_string()
}

fn default_locale() -> String {
    "en-US".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        LoggingConfig {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        ExecutionConfig {
            topk_backend: default_topk_backend(),
            default_locale: default_locale(),
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            logging: LoggingConfig::default(),
            execution: ExecutionConfig::default(),
        }
    }
}

impl ExecutionConfig {
    /// Parses `topk_backend` into the enum the top-K operators expect.
    /// Unrecognized values fall back to `Array`.
    #[must_use]
    pub fn topk_backend(&self) -> TopKBackend {
        match self.topk_backend.as_str() {
            "btree" => TopKBackend::BTree,
            _ => TopKBackend::Array,
        }
    }
}

impl EngineConfig {
    /// Loads configuration from the default three-tier location set.
    ///
    /// Merges in order:
    /// 1. `config.toml` (base configuration)
    /// 2. `config.local.toml` (local overrides, git-ignored)
    /// 3. Environment variables (`ENGINE_` prefix, `__` nesting separator)
    pub fn load() -> Result<Self, figment::Error> {
        Figment::new()
            .merge(Toml::file("config.toml"))
            .merge(Toml::file("config.local.toml"))
            .merge(Env::prefixed("ENGINE_").split("__"))
            .extract()
    }

    /// Loads configuration from a specific file path, still layering env
    /// var overrides on top.
    pub fn from_file(path: &str) -> Result<Self, figment::Error> {
        Figment::new()
            .merge(Toml::file(path))
            .merge(Env::prefixed("ENGINE_").split("__"))
            .extract()
    }
}
