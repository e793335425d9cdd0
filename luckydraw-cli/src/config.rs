use anyhow::{Context, Result};
use luckydraw_core::{ClientConfig, ReconnectPolicy, DEFAULT_EVENT_ID};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

const CONFIG_FILE: &str = "config.json";
const DATABASE_FILE: &str = "luckydraw.db";

/// Settings read from `<data dir>/config.json`. Every field is optional in
/// the file; command-line flags override what it holds.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CliConfig {
    #[serde(skip)]
    pub data_dir: PathBuf,
    pub server_url: String,
    pub event_id: String,
    pub heartbeat_secs: u64,
    pub reconnect_attempts: u32,
    pub reconnect_delay_secs: u64,
}

impl Default for CliConfig {
    fn default() -> Self {
        Self {
            data_dir: dirs::data_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("luckydraw"),
            server_url: "http://localhost:8000".to_string(),
            event_id: DEFAULT_EVENT_ID.to_string(),
            heartbeat_secs: 30,
            reconnect_attempts: 5,
            reconnect_delay_secs: 3,
        }
    }
}

impl CliConfig {
    pub async fn load(data_dir: &Path) -> Result<Self> {
        let path = data_dir.join(CONFIG_FILE);
        let mut config = if tokio::fs::try_exists(&path).await.unwrap_or(false) {
            let raw = tokio::fs::read_to_string(&path)
                .await
                .with_context(|| format!("Failed to read {}", path.display()))?;
            serde_json::from_str::<CliConfig>(&raw)
                .with_context(|| format!("Invalid config file {}", path.display()))?
        } else {
            CliConfig::default()
        };
        config.data_dir = data_dir.to_path_buf();
        Ok(config)
    }

    pub fn database_path(&self) -> PathBuf {
        self.data_dir.join(DATABASE_FILE)
    }

    pub fn client_config(&self) -> ClientConfig {
        let mut client = ClientConfig::new(&self.server_url, &self.event_id).with_reconnect(
            ReconnectPolicy {
                max_attempts: self.reconnect_attempts,
                delay: Duration::from_secs(self.reconnect_delay_secs),
            },
        );
        client.heartbeat_interval = Duration::from_secs(self.heartbeat_secs);
        client
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_missing_file_uses_defaults() {
        let dir = TempDir::new().unwrap();
        let config = CliConfig::load(dir.path()).await.unwrap();

        assert_eq!(config.event_id, DEFAULT_EVENT_ID);
        assert_eq!(config.database_path(), dir.path().join("luckydraw.db"));
    }

    #[tokio::test]
    async fn test_partial_file_overrides_fields() {
        let dir = TempDir::new().unwrap();
        tokio::fs::write(
            dir.path().join("config.json"),
            r#"{ "server_url": "https://draw.example.org", "reconnect_attempts": 0 }"#,
        )
        .await
        .unwrap();

        let config = CliConfig::load(dir.path()).await.unwrap();
        let client = config.client_config();
        assert_eq!(client.server_url, "https://draw.example.org");
        assert_eq!(client.reconnect.max_attempts, 0);
        assert_eq!(client.heartbeat_interval, Duration::from_secs(30));
        assert!(client.validate().is_ok());
    }

    #[tokio::test]
    async fn test_malformed_file_is_an_error() {
        let dir = TempDir::new().unwrap();
        tokio::fs::write(dir.path().join("config.json"), "{ not json")
            .await
            .unwrap();

        assert!(CliConfig::load(dir.path()).await.is_err());
    }
}
