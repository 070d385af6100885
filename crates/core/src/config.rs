//! TOML-based configuration for mergemend.
//!
//! Secrets are never stored in the file itself: the `[completion]` section
//! names an environment variable via `api_key_env`, resolved at runtime by
//! [`AppConfig::resolve_env_vars`].

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::conflict::selector::{StrategySelector, DEFAULT_SOURCE_EXTENSIONS};
use crate::errors::ConfigError;

/// Log levels accepted by `engine.log_level`.
const LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

// ---------------------------------------------------------------------------
// Top-level config
// ---------------------------------------------------------------------------

/// Top-level application configuration loaded from a TOML file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Resolution engine settings.
    #[serde(default)]
    pub engine: EngineConfig,

    /// Text-completion service used for semantic merges.
    #[serde(default)]
    pub completion: CompletionConfig,

    /// Repository location.
    #[serde(default)]
    pub repository: RepositoryConfig,
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Minimum tracing level: trace, debug, info, warn, error.
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Extensions (no dot) that the strategy selector treats as source code.
    #[serde(default = "default_source_extensions")]
    pub source_extensions: Vec<String>,
}

fn default_log_level() -> String {
    "warn".into()
}
fn default_source_extensions() -> Vec<String> {
    DEFAULT_SOURCE_EXTENSIONS.iter().map(|e| e.to_string()).collect()
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            source_extensions: default_source_extensions(),
        }
    }
}

impl EngineConfig {
    /// Build the strategy selector described by this section.
    pub fn selector(&self) -> StrategySelector {
        StrategySelector::new(&self.source_extensions)
    }
}

// ---------------------------------------------------------------------------
// Completion
// ---------------------------------------------------------------------------

/// OpenAI-compatible completion endpoint settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionConfig {
    /// When false, semantic merges always use the structural fallback.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Base URL; `/chat/completions` is appended.
    #[serde(default = "default_api_url")]
    pub api_url: String,

    #[serde(default = "default_model")]
    pub model: String,

    /// Environment variable holding the API key.
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,

    /// Per-request timeout in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    #[serde(default)]
    pub temperature: f32,

    /// Resolved API key (populated by `resolve_env_vars`).
    #[serde(skip)]
    pub api_key: Option<String>,
}

fn default_true() -> bool {
    true
}
fn default_api_url() -> String {
    "https://api.openai.com/v1".into()
}
fn default_model() -> String {
    "gpt-4o-mini".into()
}
fn default_api_key_env() -> String {
    "MERGEMEND_API_KEY".into()
}
fn default_timeout_secs() -> u64 {
    60
}
fn default_max_tokens() -> u32 {
    4096
}

impl Default for CompletionConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            api_url: default_api_url(),
            model: default_model(),
            api_key_env: default_api_key_env(),
            timeout_secs: default_timeout_secs(),
            max_tokens: default_max_tokens(),
            temperature: 0.0,
            api_key: None,
        }
    }
}

// ---------------------------------------------------------------------------
// Repository
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RepositoryConfig {
    /// Any path inside the repository; parents are searched.
    #[serde(default = "default_repo_path")]
    pub path: PathBuf,
}

fn default_repo_path() -> PathBuf {
    PathBuf::from(".")
}

impl Default for RepositoryConfig {
    fn default() -> Self {
        Self {
            path: default_repo_path(),
        }
    }
}

// ---------------------------------------------------------------------------
// Loading & resolving
// ---------------------------------------------------------------------------

impl AppConfig {
    /// Load an [`AppConfig`] from a TOML file at the given path.
    ///
    /// This does **not** resolve environment variables -- call
    /// [`resolve_env_vars`](Self::resolve_env_vars) afterwards.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        info!(path = %path.display(), "loading configuration");

        if !path.exists() {
            return Err(ConfigError::FileNotFound(path.display().to_string()));
        }

        let contents = std::fs::read_to_string(path)?;
        let config: AppConfig =
            toml::from_str(&contents).map_err(|e| ConfigError::ParseError(e.to_string()))?;

        debug!("configuration parsed successfully");
        Ok(config)
    }

    /// Resolve `*_env` fields from the environment.
    ///
    /// A missing variable only logs a warning; the completion client decides
    /// whether it can run without a key.
    pub fn resolve_env_vars(&mut self) -> Result<(), ConfigError> {
        if self.completion.enabled {
            self.completion.api_key =
                resolve_optional_env(&self.completion.api_key_env, "completion.api_key_env");
        }
        Ok(())
    }

    /// Validate that all values are sane.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !LOG_LEVELS.contains(&self.engine.log_level.to_ascii_lowercase().as_str()) {
            return Err(ConfigError::InvalidValue {
                field: "engine.log_level".into(),
                detail: format!("expected one of {}", LOG_LEVELS.join(", ")),
            });
        }
        for ext in &self.engine.source_extensions {
            if ext.trim().is_empty() || ext.contains('.') {
                return Err(ConfigError::InvalidValue {
                    field: "engine.source_extensions".into(),
                    detail: format!("'{ext}' must be a bare extension such as 'rs'"),
                });
            }
        }

        let completion = &self.completion;
        if completion.timeout_secs == 0 {
            return Err(ConfigError::InvalidValue {
                field: "completion.timeout_secs".into(),
                detail: "timeout must be > 0".into(),
            });
        }
        if !(0.0..=2.0).contains(&completion.temperature) {
            return Err(ConfigError::InvalidValue {
                field: "completion.temperature".into(),
                detail: "temperature must be between 0.0 and 2.0".into(),
            });
        }
        if completion.enabled {
            if completion.api_url.trim().is_empty() {
                return Err(ConfigError::InvalidValue {
                    field: "completion.api_url".into(),
                    detail: "API URL must not be empty".into(),
                });
            }
            if completion.model.trim().is_empty() {
                return Err(ConfigError::InvalidValue {
                    field: "completion.model".into(),
                    detail: "model must not be empty".into(),
                });
            }
        }

        Ok(())
    }

    /// Convenience: load, resolve, and validate in one call.
    pub fn load_and_resolve<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let mut config = Self::load_from_file(path)?;
        config.resolve_env_vars()?;
        config.validate()?;
        Ok(config)
    }

    /// Serialize to TOML (used by `mergemend init`).
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(|e| ConfigError::ParseError(e.to_string()))
    }
}

/// Try to read an environment variable by name. Returns `Some(value)` on
/// success; logs a warning and returns `None` if the variable is unset.
fn resolve_optional_env(env_name: &str, field: &str) -> Option<String> {
    match std::env::var(env_name) {
        Ok(val) if !val.is_empty() => {
            debug!(field, env_name, "resolved env var");
            Some(val)
        }
        Ok(_) => {
            warn!(field, env_name, "env var is set but empty");
            None
        }
        Err(_) => {
            warn!(field, env_name, "env var not set");
            None
        }
    }
}
