//! Global configuration loader for Parley.
//!
//! Reads `config.toml` from the data directory (`~/.parley/` in production)
//! and deserializes it into [`GlobalConfig`]. Falls back to sensible defaults
//! when the file is missing or malformed.

use std::path::{Path, PathBuf};

use parley_types::config::GlobalConfig;

/// Environment variable that overrides the data directory.
pub const DATA_DIR_ENV: &str = "PARLEY_HOME";

const DATA_DIR_NAME: &str = ".parley";

/// Resolve the data directory.
///
/// Priority:
/// 1. `PARLEY_HOME` environment variable (if set and non-empty)
/// 2. `~/.parley`
/// 3. `./.parley` when no home directory can be determined
pub fn resolve_data_dir() -> PathBuf {
    data_dir_from(std::env::var_os(DATA_DIR_ENV).map(PathBuf::from))
}

fn data_dir_from(override_dir: Option<PathBuf>) -> PathBuf {
    match override_dir {
        Some(dir) if !dir.as_os_str().is_empty() => dir,
        _ => dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(DATA_DIR_NAME),
    }
}

/// Load global configuration from `{data_dir}/config.toml`.
///
/// - If the file does not exist, returns [`GlobalConfig::default()`].
/// - If the file exists but fails to parse, logs a warning and returns the default.
/// - If the file exists and parses successfully, returns the parsed config.
pub async fn load_global_config(data_dir: &Path) -> GlobalConfig {
    let config_path = data_dir.join("config.toml");

    let content = match tokio::fs::read_to_string(&config_path).await {
        Ok(content) => content,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            tracing::debug!("No config.toml found at {}, using defaults", config_path.display());
            return GlobalConfig::default();
        }
        Err(err) => {
            tracing::warn!("Failed to read {}: {err}, using defaults", config_path.display());
            return GlobalConfig::default();
        }
    };

    match toml::from_str::<GlobalConfig>(&content) {
        Ok(config) => config,
        Err(err) => {
            tracing::warn!(
                "Failed to parse {}: {err}, using defaults",
                config_path.display()
            );
            GlobalConfig::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn load_global_config_missing_file_returns_default() {
        let tmp = TempDir::new().unwrap();
        let config = load_global_config(tmp.path()).await;
        assert_eq!(config.locale, "en");
        assert!(config.enable_auto_title);
        assert_eq!(config.session.history_message_count, 4);
        assert_eq!(config.provider.base_url, "https://openrouter.ai/api/v1");
    }

    #[tokio::test]
    async fn load_global_config_valid_toml_returns_parsed() {
        let tmp = TempDir::new().unwrap();
        let config_path = tmp.path().join("config.toml");
        tokio::fs::write(
            &config_path,
            r#"
locale = "de"
enable_auto_title = false
tool_preamble = "You can call tools."

[session]
model = "anthropic/claude-3.5-sonnet"
max_tokens = 8000
compress_message_length_threshold = 2000

[provider]
base_url = "http://localhost:4000/v1"
api_key_env = "LOCAL_KEY"
referer = "https://parley.example"

[knowledge_cutoff]
default = "2022-01"
"#,
        )
        .await
        .unwrap();

        let config = load_global_config(tmp.path()).await;
        assert_eq!(config.locale, "de");
        assert!(!config.enable_auto_title);
        assert_eq!(config.tool_preamble.as_deref(), Some("You can call tools."));
        assert_eq!(config.session.model, "anthropic/claude-3.5-sonnet");
        assert_eq!(config.session.max_tokens, 8000);
        assert_eq!(config.session.compress_message_length_threshold, 2000);
        // Unset session fields keep their defaults.
        assert_eq!(config.session.history_message_count, 4);
        assert!(config.session.send_memory);
        assert_eq!(config.provider.base_url, "http://localhost:4000/v1");
        assert_eq!(config.provider.api_key_env, "LOCAL_KEY");
        assert_eq!(config.provider.referer.as_deref(), Some("https://parley.example"));
        assert_eq!(config.provider.title, "Parley");
        assert_eq!(config.knowledge_cutoff.len(), 1);
        assert_eq!(config.knowledge_cutoff["default"], "2022-01");
    }

    #[tokio::test]
    async fn load_global_config_invalid_toml_returns_default() {
        let tmp = TempDir::new().unwrap();
        let config_path = tmp.path().join("config.toml");
        tokio::fs::write(&config_path, "this is not { valid toml !!!")
            .await
            .unwrap();

        let config = load_global_config(tmp.path()).await;
        assert_eq!(config.locale, "en");
        assert!(config.knowledge_cutoff.contains_key("default"));
    }

    #[test]
    fn data_dir_override_wins() {
        let tmp = TempDir::new().unwrap();
        let dir = data_dir_from(Some(tmp.path().to_path_buf()));
        assert_eq!(dir, tmp.path());
    }

    #[test]
    fn data_dir_empty_override_falls_back_to_home() {
        let dir = data_dir_from(Some(PathBuf::new()));
        assert!(dir.ends_with(DATA_DIR_NAME));
    }
}
