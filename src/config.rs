// ABOUTME: Configuration loading for the orchestration core.
// ABOUTME: Reads an XDG TOML file; the ambient concerns (paths, env) follow the teacher's layout.

use std::path::PathBuf;

use serde::Deserialize;

const APP_NAME: &str = "orchestra";

/// Top-level configuration consumed by the Runtime (§6's "Configuration surface").
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    pub llm: LlmConfig,
    pub approval: ApprovalConfig,
    pub storage: StorageConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            llm: LlmConfig::default(),
            approval: ApprovalConfig::default(),
            storage: StorageConfig::default(),
        }
    }
}

/// LLM provider selection and per-provider endpoint overrides.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    pub provider: String,
    pub model: String,
    pub max_tokens: u32,
    pub anthropic: ProviderConfig,
    pub openai: ProviderConfig,
    pub local: ProviderConfig,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: "anthropic".to_string(),
            model: "claude-sonnet-4-5-20250929".to_string(),
            max_tokens: 4096,
            anthropic: ProviderConfig::default(),
            openai: ProviderConfig::default(),
            local: ProviderConfig::default(),
        }
    }
}

/// Shared provider configuration: an optional base URL override.
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct ProviderConfig {
    pub base_url: Option<String>,
}

/// Approval defaults (§6: `approval.default_timeout_ms`, per-tool overrides).
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ApprovalConfig {
    pub default_timeout_ms: u64,
}

impl Default for ApprovalConfig {
    fn default() -> Self {
        Self {
            default_timeout_ms: 300_000,
        }
    }
}

/// Transcript store behavior (§6: `storage.enabled`, `storage.auto_save`, `storage.max_messages`).
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub enabled: bool,
    pub auto_save: bool,
    pub max_messages: usize,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            auto_save: true,
            max_messages: 200,
        }
    }
}

impl Config {
    /// Load config from the XDG config path, writing out defaults on first run.
    pub fn load() -> anyhow::Result<Self> {
        let path = Self::config_path();
        if !path.exists() {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::write(&path, default_config_toml())?;
        }
        let content = std::fs::read_to_string(&path)?;
        let config: Self = toml::from_str(&content)?;
        Ok(config)
    }

    /// XDG config directory for this app.
    pub fn config_dir() -> PathBuf {
        if let Ok(xdg_home) = std::env::var("XDG_CONFIG_HOME") {
            return PathBuf::from(xdg_home).join(APP_NAME);
        }
        if let Some(base) = dirs::config_dir() {
            return base.join(APP_NAME);
        }
        PathBuf::from(".").join(APP_NAME)
    }

    pub fn config_path() -> PathBuf {
        Self::config_dir().join("config.toml")
    }

    /// XDG data directory for this app.
    pub fn data_dir() -> PathBuf {
        if let Ok(xdg_data) = std::env::var("XDG_DATA_HOME") {
            return PathBuf::from(xdg_data).join(APP_NAME);
        }
        if let Some(base) = dirs::data_dir() {
            return base.join(APP_NAME);
        }
        PathBuf::from(".").join(APP_NAME)
    }

    /// Directory holding one `<session_id>.jsonl` file per session (§6).
    pub fn sessions_dir() -> PathBuf {
        Self::data_dir().join("sessions")
    }
}

fn default_config_toml() -> String {
    r#"[llm]
provider = "anthropic"
model = "claude-sonnet-4-5-20250929"
max_tokens = 4096

[llm.anthropic]
base_url = "https://api.anthropic.com"

[llm.openai]
base_url = "https://api.openai.com/v1"

[llm.local]
base_url = "http://localhost:11434/v1"

[approval]
default_timeout_ms = 300000

[storage]
enabled = true
auto_save = true
max_messages = 200
"#
    .to_string()
}
