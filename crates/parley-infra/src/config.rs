//! Global configuration loader for Parley.
//!
//! Reads `config.toml` from the data directory (`~/.parley/` in production)
//! and deserializes it into [`GlobalConfig`]. Falls back to sensible defaults
//! when the file is missing or malformed.

use std::path::{Path, PathBuf};

use parley_types::config::GlobalConfig;

/// Environment variable overriding the data directory.
pub const DATA_DIR_ENV: &str = "PARLEY_DATA_DIR";

/// Resolve the data directory.
///
/// `PARLEY_DATA_DIR` if set, else `~/.parley`, else `./.parley`.
pub fn resolve_data_dir() -> PathBuf {
    if let Ok(dir) = std::env::var(DATA_DIR_ENV) {
        return PathBuf::from(dir);
    }

    if let Some(home) = dirs::home_dir() {
        return home.join(".parley");
    }

    PathBuf::from(".parley")
}

/// SQLite URL for the chat history database inside `data_dir`.
pub fn database_url(data_dir: &Path) -> String {
    format!("sqlite://{}?mode=rwc", data_dir.join("parley.db").display())
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
    use parley_types::llm::ProviderType;
    use tempfile::TempDir;

    #[tokio::test]
    async fn load_global_config_missing_file_returns_default() {
        let tmp = TempDir::new().unwrap();
        let config = load_global_config(tmp.path()).await;
        assert_eq!(config.completion.provider, ProviderType::OpenAi);
        assert_eq!(config.completion.deadline_secs, 120);
    }

    #[tokio::test]
    async fn load_global_config_valid_toml_returns_parsed() {
        let tmp = TempDir::new().unwrap();
        tokio::fs::write(
            tmp.path().join("config.toml"),
            r#"
[completion]
provider = "relay"
base_url = "http://localhost:3000"
deadline_secs = 45
"#,
        )
        .await
        .unwrap();

        let config = load_global_config(tmp.path()).await;
        assert_eq!(config.completion.provider, ProviderType::Relay);
        assert_eq!(
            config.completion.base_url.as_deref(),
            Some("http://localhost:3000")
        );
        assert_eq!(config.completion.deadline_secs, 45);
    }

    #[tokio::test]
    async fn load_global_config_invalid_toml_returns_default() {
        let tmp = TempDir::new().unwrap();
        tokio::fs::write(tmp.path().join("config.toml"), "this is not { valid toml !!!")
            .await
            .unwrap();

        let config = load_global_config(tmp.path()).await;
        assert_eq!(config.completion.provider, ProviderType::OpenAi);
    }

    #[test]
    fn database_url_points_into_data_dir() {
        let url = database_url(Path::new("/tmp/parley-test"));
        assert_eq!(url, "sqlite:///tmp/parley-test/parley.db?mode=rwc");
    }

    #[test]
    fn resolve_data_dir_from_env() {
        // SAFETY: This test is the only one touching PARLEY_DATA_DIR and restores it immediately.
        unsafe {
            std::env::set_var(DATA_DIR_ENV, "/tmp/test-parley");
        }
        let dir = resolve_data_dir();
        unsafe {
            std::env::remove_var(DATA_DIR_ENV);
        }
        assert_eq!(dir, PathBuf::from("/tmp/test-parley"));
    }
}
