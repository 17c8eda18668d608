//! Global configuration types for Parley.
//!
//! `GlobalConfig` represents the top-level `config.toml` that controls
//! session defaults, the model provider, and process-wide chat settings.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::chat::SessionConfig;

/// System prompt injected ahead of every request when enabled.
pub const DEFAULT_SYSTEM_TEMPLATE: &str = "\
You are a helpful assistant served by {{ServiceProvider}}.
Knowledge cutoff: {{cutoff}}
Current model: {{model}}
Current time: {{time}}
Reply in the user's language (default: {{lang}}). Use Markdown for formatting.";

/// Key of the fallback entry in the knowledge-cutoff table.
pub const DEFAULT_CUTOFF_KEY: &str = "default";

/// Top-level configuration for Parley.
///
/// Loaded from `~/.parley/config.toml`. All fields have sensible defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GlobalConfig {
    /// Locale substituted for `{{lang}}` in templates.
    #[serde(default = "default_locale")]
    pub locale: String,

    /// Derive a topic automatically once a conversation is long enough.
    #[serde(default = "default_true")]
    pub enable_auto_title: bool,

    /// Tool-capability preamble appended to the system prompt. Its presence
    /// turns tool augmentation on.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_preamble: Option<String>,

    #[serde(default = "default_system_template")]
    pub system_template: String,

    /// Defaults for newly created sessions.
    #[serde(default)]
    pub session: SessionConfig,

    #[serde(default)]
    pub provider: ProviderSettings,

    /// Model name -> knowledge cutoff date, with a `default` entry.
    #[serde(default = "default_knowledge_cutoff")]
    pub knowledge_cutoff: BTreeMap<String, String>,
}

fn default_locale() -> String {
    "en".to_string()
}

fn default_true() -> bool {
    true
}

fn default_system_template() -> String {
    DEFAULT_SYSTEM_TEMPLATE.to_string()
}

fn default_knowledge_cutoff() -> BTreeMap<String, String> {
    [
        (DEFAULT_CUTOFF_KEY, "2021-09"),
        ("openai/gpt-4o", "2023-10"),
        ("openai/gpt-4o-mini", "2023-10"),
        ("openai/gpt-4.1", "2024-06"),
        ("anthropic/claude-3.5-sonnet", "2024-04"),
        ("google/gemini-pro-1.5", "2023-11"),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v.to_string()))
    .collect()
}

impl Default for GlobalConfig {
    fn default() -> Self {
        Self {
            locale: default_locale(),
            enable_auto_title: true,
            tool_preamble: None,
            system_template: default_system_template(),
            session: SessionConfig::default(),
            provider: ProviderSettings::default(),
            knowledge_cutoff: default_knowledge_cutoff(),
        }
    }
}

/// Connection settings for the OpenAI-compatible model provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderSettings {
    /// Label substituted for `{{ServiceProvider}}`.
    #[serde(default = "default_provider_name")]
    pub name: String,
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Environment variable holding the API key.
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    /// Sent as `HTTP-Referer` for provider attribution.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub referer: Option<String>,
    /// Sent as `X-Title` for provider attribution.
    #[serde(default = "default_app_title")]
    pub title: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_provider_name() -> String {
    "OpenRouter".to_string()
}

fn default_base_url() -> String {
    "https://openrouter.ai/api/v1".to_string()
}

fn default_api_key_env() -> String {
    "OPENROUTER_API_KEY".to_string()
}

fn default_app_title() -> String {
    "Parley".to_string()
}

fn default_timeout_secs() -> u64 {
    120
}

impl Default for ProviderSettings {
    fn default() -> Self {
        Self {
            name: default_provider_name(),
            base_url: default_base_url(),
            api_key_env: default_api_key_env(),
            referer: None,
            title: default_app_title(),
            timeout_secs: default_timeout_secs(),
        }
    }
}
