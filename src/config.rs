//! Configuration management for netspy-analyst.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub llm: LlmConfig,
    #[serde(default)]
    pub tools: ToolsConfig,
    #[serde(default)]
    pub analyst: AnalystConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    pub model: String,
    #[serde(default)]
    pub api_base: Option<String>,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    #[serde(default)]
    pub max_tokens: Option<u32>,
    #[serde(default = "default_llm_timeout")]
    pub timeout_secs: u64,
}

fn default_api_key_env() -> String {
    "OPENAI_API_KEY".to_string()
}

fn default_llm_timeout() -> u64 {
    120
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolsConfig {
    /// Endpoint of the telemetry tool server.
    #[serde(default = "default_server_url")]
    pub server_url: String,
    #[serde(default = "default_tools_timeout")]
    pub timeout_secs: u64,
    /// Run the calls of one batch concurrently.
    #[serde(default)]
    pub parallel_tool_calls: bool,
}

fn default_server_url() -> String {
    "http://localhost:8080/mcp".to_string()
}

fn default_tools_timeout() -> u64 {
    30
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            server_url: default_server_url(),
            timeout_secs: default_tools_timeout(),
            parallel_tool_calls: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalystConfig {
    /// Replaces the built-in network analyst prompt when set.
    #[serde(default)]
    pub system_prompt: Option<String>,
    /// Number of tools the prompt asks the model to use per analysis.
    #[serde(default = "default_min_tool_calls")]
    pub min_tool_calls: u32,
    #[serde(default = "bool_true")]
    pub enhance_queries: bool,
    /// Cap on tool cycles per turn; unset lets the model decide.
    #[serde(default)]
    pub max_iterations: Option<u32>,
}

fn default_min_tool_calls() -> u32 {
    3
}

fn bool_true() -> bool {
    true
}

impl Default for AnalystConfig {
    fn default() -> Self {
        Self {
            system_prompt: None,
            min_tool_calls: default_min_tool_calls(),
            enhance_queries: true,
            max_iterations: None,
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            llm: LlmConfig {
                model: "gpt-4o-mini".to_string(),
                api_base: None,
                api_key: None,
                api_key_env: default_api_key_env(),
                max_tokens: None,
                timeout_secs: default_llm_timeout(),
            },
            tools: ToolsConfig::default(),
            analyst: AnalystConfig::default(),
        }
    }
}

impl LlmConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl ToolsConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl AppConfig {
    pub fn config_path() -> Result<PathBuf> {
        let home = dirs::home_dir().context("Could not determine home directory")?;
        Ok(home.join(".netspy-analyst").join("config.toml"))
    }

    /// Load from the default location, falling back to defaults.
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path()?;
        let mut config = if config_path.exists() {
            Self::read(&config_path)?
        } else {
            Self::default()
        };
        config.apply_env_overrides();
        Ok(config)
    }

    /// Load from an explicit file, which must exist.
    pub fn load_from(path: &Path) -> Result<Self> {
        let mut config = Self::read(path)?;
        config.apply_env_overrides();
        Ok(config)
    }

    fn read(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(model) = std::env::var("NETSPY_MODEL") {
            self.llm.model = model;
        }
        if let Ok(api_base) = std::env::var("NETSPY_API_BASE") {
            self.llm.api_base = Some(api_base);
        }
        if let Ok(server_url) = std::env::var("NETSPY_SERVER_URL") {
            self.tools.server_url = server_url;
        }
    }

    pub fn api_key(&self) -> Result<String> {
        if let Some(key) = &self.llm.api_key {
            if !key.is_empty() {
                return Ok(key.clone());
            }
        }
        std::env::var(&self.llm.api_key_env).with_context(|| {
            format!(
                "API key not found. Either:\n  \
                 1. Set api_key in config file: {}\n  \
                 2. Set environment variable: export {}=your-key",
                Self::config_path()
                    .map(|p| p.display().to_string())
                    .unwrap_or_default(),
                self.llm.api_key_env
            )
        })
    }

    /// Write the default config to `path`, creating parent directories.
    pub fn save_default_to(path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }
        let content =
            toml::to_string_pretty(&Self::default()).context("Failed to serialize config")?;
        std::fs::write(path, content)
            .with_context(|| format!("Failed to write config file: {}", path.display()))
    }

    pub fn save_default() -> Result<PathBuf> {
        let config_path = Self::config_path()?;
        Self::save_default_to(&config_path)?;
        Ok(config_path)
    }
}
