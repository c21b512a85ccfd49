//! Configuration for the Tandem service.
//!
//! [`TandemConfig`] loads from a TOML file, `TANDEM_*` environment
//! variables, and defaults using the `confyg` crate.
//!
//! # Loading Priority
//!
//! 1. Explicit `--config <path>` flag
//! 2. `TANDEM_CONFIG` environment variable
//! 3. XDG default: `~/.config/tandem/config.toml`
//! 4. Built-in defaults

use confyg::{Confygery, env};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tandem_core::{Error, Result};
use tandem_llm::GenerationConfig;
use tandem_rag::{AnswerConfig, CacheConfig};
use tandem_sync::SyncConfig;
use tandem_vector::VectorConfig;

/// Environment variable naming the config file.
pub const CONFIG_ENV: &str = "TANDEM_CONFIG";

const ENV_PREFIX: &str = "TANDEM";

// ============================================================================
// Configuration structs
// ============================================================================

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TandemConfig {
    /// HTTP server.
    pub server: ServerConfig,

    /// Primary store.
    pub store: StoreConfig,

    /// Change-feed watcher and debounce.
    pub sync: SyncConfig,

    /// Embedding provider and vector index.
    pub vector: VectorConfig,

    /// Generation provider.
    pub generation: GenerationConfig,

    /// Retrieval cache.
    pub cache: CacheConfig,

    /// Answer retrieval.
    pub answer: AnswerConfig,
}

/// HTTP server configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Host address to bind to.
    pub host: String,

    /// Port to listen on.
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 3000,
        }
    }
}

impl ServerConfig {
    /// `host:port` for binding.
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Primary store configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// JSON array of records loaded when the store opens.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seed_path: Option<String>,
}

// ============================================================================
// Config loading
// ============================================================================

impl TandemConfig {
    /// Load configuration from file, environment, and defaults.
    ///
    /// A config path that does not exist is skipped, so a fresh install
    /// runs on defaults.
    pub fn load(config_path: Option<&str>) -> Result<Self> {
        let mut builder =
            Confygery::new().map_err(|e| Error::config(format!("config init: {e}")))?;

        if let Some(path) = Self::resolve_config_path(config_path)
            && path.exists()
        {
            builder
                .add_file(&path.to_string_lossy())
                .map_err(|e| Error::config(format!("config file: {e}")))?;
        }

        let mut env_opts = env::Options::with_top_level(ENV_PREFIX);
        for section in [
            "server",
            "store",
            "sync",
            "vector",
            "generation",
            "cache",
            "answer",
        ] {
            env_opts.add_section(section);
        }
        builder
            .add_env(env_opts)
            .map_err(|e| Error::config(format!("config env: {e}")))?;

        builder
            .build()
            .map_err(|e| Error::config(format!("config build: {e}")))
    }

    /// Resolve the config file path from explicit flag, env var, or XDG default.
    pub fn resolve_config_path(explicit: Option<&str>) -> Option<PathBuf> {
        if let Some(path) = explicit {
            return Some(PathBuf::from(path));
        }
        if let Ok(path) = std::env::var(CONFIG_ENV) {
            return Some(PathBuf::from(path));
        }
        Self::default_config_path()
    }

    /// Return the XDG default config path.
    pub fn default_config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join("tandem").join("config.toml"))
    }

    /// Serialize this config to a pretty-printed TOML string.
    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| Error::config(e.to_string()))
    }

    /// Look up a value by dotted key, e.g. `server.port`.
    pub fn get(&self, key: &str) -> Result<toml::Value> {
        let root = toml::Value::try_from(self).map_err(|e| Error::config(e.to_string()))?;
        let mut current = &root;
        for part in key.split('.') {
            current = current
                .as_table()
                .and_then(|table| table.get(part))
                .ok_or_else(|| Error::config(format!("Key '{key}' not found in configuration")))?;
        }
        Ok(current.clone())
    }
}

// ============================================================================
// Tests
// ============================================================================
