//! Configuration management for Zen Agent
//!
//! Configuration lives in a TOML file (by default
//! `~/.config/zen-agent/config.toml`). Every section and field has a default,
//! so a missing file or a partial file is fine.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{Error, Result};
use crate::provider::catalog;

/// Main application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub model: ModelConfig,
    #[serde(default)]
    pub agent: AgentConfig,
    #[serde(default)]
    pub tools: ToolsConfig,
    #[serde(default)]
    pub storage: StorageConfig,
}

/// Model provider settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    /// `zen` or `openai_compatible` for the built-in streaming client,
    /// anything else is handed to genai
    pub provider: String,
    pub model: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    /// Environment variable holding the API key
    pub api_key_env: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<String>,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            provider: catalog::ZEN_PROVIDER.to_string(),
            model: catalog::DEFAULT_MODEL.to_string(),
            base_url: None,
            api_key_env: catalog::ZEN_API_KEY_ENV.to_string(),
            system_prompt: None,
        }
    }
}

impl ModelConfig {
    /// Base URL, with `OPENCODE_ZEN_BASE_URL` taking precedence
    pub fn resolved_base_url(&self) -> String {
        std::env::var(catalog::ZEN_BASE_URL_ENV)
            .ok()
            .filter(|v| !v.is_empty())
            .or_else(|| self.base_url.clone())
            .unwrap_or_else(|| catalog::ZEN_BASE_URL.to_string())
    }

    /// API key read from the configured environment variable
    pub fn api_key(&self) -> Option<String> {
        std::env::var(&self.api_key_env).ok().filter(|v| !v.is_empty())
    }
}

/// Agent loop settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    pub max_iterations: usize,
    pub retry_attempts: u32,
    pub retry_backoff_ms: u64,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            max_iterations: 5,
            retry_attempts: 3,
            retry_backoff_ms: 1000,
        }
    }
}

impl AgentConfig {
    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }
}

/// Tool execution settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolsConfig {
    /// Directory filesystem tools are confined to and processes run in.
    /// Defaults to the workspace.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_dir: Option<PathBuf>,
    pub timeout_secs: u64,
    pub max_output_bytes: usize,
    pub python: String,
    pub node: String,
    /// Regexes rejected in addition to the built-in shell denylist
    pub extra_denied_patterns: Vec<String>,
    pub shell: bool,
    pub filesystem: bool,
    pub code: bool,
    pub web_search: bool,
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            base_dir: None,
            timeout_secs: 10,
            max_output_bytes: 1024 * 1024,
            python: "python3".to_string(),
            node: "node".to_string(),
            extra_denied_patterns: Vec::new(),
            shell: true,
            filesystem: true,
            code: true,
            web_search: true,
        }
    }
}

impl ToolsConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Where conversations and execution records go
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StorageBackend {
    #[default]
    Memory,
    Jsonl,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub backend: StorageBackend,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data_dir: Option<PathBuf>,
}

impl StorageConfig {
    /// Data directory, defaulting to the platform data dir
    pub fn data_dir(&self) -> PathBuf {
        self.data_dir.clone().unwrap_or_else(|| {
            dirs::data_dir()
                .map(|p| p.join("zen-agent"))
                .unwrap_or_else(|| PathBuf::from(".zen-agent"))
        })
    }
}

/// Configuration manager for loading and saving config
pub struct ConfigManager {
    config_path: PathBuf,
    config: Config,
}

impl ConfigManager {
    /// Create a new config manager with default path
    pub fn new() -> Result<Self> {
        let config_path = Self::default_config_path()?;
        Self::with_path(config_path)
    }

    /// Create a config manager with a specific path
    pub fn with_path(config_path: PathBuf) -> Result<Self> {
        let config = if config_path.exists() {
            Self::load_from_path(&config_path)?
        } else {
            Config::default()
        };

        Ok(Self { config_path, config })
    }

    /// Get the default config path
    pub fn default_config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| Error::Config("Could not find config directory".to_string()))?;

        Ok(config_dir.join("zen-agent").join("config.toml"))
    }

    /// Load configuration from a file
    fn load_from_path(path: &Path) -> Result<Config> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("Failed to read config: {}", e)))?;

        toml::from_str(&content)
            .map_err(|e| Error::Config(format!("Failed to parse config: {}", e)))
    }

    /// Get the current configuration
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Get mutable access to configuration
    pub fn config_mut(&mut self) -> &mut Config {
        &mut self.config
    }

    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    /// Save the current configuration to disk
    pub fn save(&self) -> Result<()> {
        if let Some(parent) = self.config_path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| Error::Config(format!("Failed to create config dir: {}", e)))?;
        }

        std::fs::write(&self.config_path, self.to_toml()?)
            .map_err(|e| Error::Config(format!("Failed to write config: {}", e)))
    }

    /// Render the effective configuration as TOML
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(&self.config)
            .map_err(|e| Error::Config(format!("Failed to serialize config: {}", e)))
    }
}
