use crate::error::{LuckyDrawError, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

pub const DEFAULT_EVENT_ID: &str = "sfs-2025";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    /// HTTP base of the draw service, e.g. `http://localhost:8000`.
    pub server_url: String,
    pub event_id: String,
    pub heartbeat_interval: Duration,
    pub reconnect: ReconnectPolicy,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconnectPolicy {
    pub max_attempts: u32,
    pub delay: Duration,
}

impl ReconnectPolicy {
    pub fn disabled() -> Self {
        Self {
            max_attempts: 0,
            delay: Duration::ZERO,
        }
    }
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            delay: Duration::from_secs(3),
        }
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            server_url: "http://localhost:8000".to_string(),
            event_id: DEFAULT_EVENT_ID.to_string(),
            heartbeat_interval: Duration::from_secs(30),
            reconnect: ReconnectPolicy::default(),
        }
    }
}

impl ClientConfig {
    pub fn new(server_url: impl Into<String>, event_id: impl Into<String>) -> Self {
        Self {
            server_url: server_url.into(),
            event_id: event_id.into(),
            ..Self::default()
        }
    }

    pub fn with_reconnect(mut self, reconnect: ReconnectPolicy) -> Self {
        self.reconnect = reconnect;
        self
    }

    /// REST prefix of the draw service.
    pub fn api_base(&self) -> String {
        format!("{}/api/luckydraw", self.server_url.trim_end_matches('/'))
    }

    /// Broadcast endpoint for `event_id`, with the scheme switched to ws/wss.
    pub fn ws_url(&self, event_id: &str) -> Result<String> {
        let mut url = url::Url::parse(&self.server_url)
            .map_err(|e| LuckyDrawError::config(format!("Invalid server URL: {}", e)))?;

        let scheme = match url.scheme() {
            "https" => "wss",
            "http" => "ws",
            other => {
                return Err(LuckyDrawError::config(format!(
                    "Unsupported server URL scheme: {}",
                    other
                )))
            }
        };
        url.set_scheme(scheme)
            .map_err(|_| LuckyDrawError::config("Cannot switch server URL to websocket scheme"))?;

        url.path_segments_mut()
            .map_err(|_| LuckyDrawError::config("Server URL cannot be a base"))?
            .pop_if_empty()
            .extend(["api", "luckydraw", "ws", event_id]);

        Ok(url.to_string())
    }

    pub fn validate(&self) -> Result<()> {
        if self.server_url.is_empty() {
            return Err(LuckyDrawError::config("Server URL cannot be empty"));
        }

        if self.event_id.is_empty() {
            return Err(LuckyDrawError::config("Event ID cannot be empty"));
        }

        if self.heartbeat_interval.is_zero() {
            return Err(LuckyDrawError::config(
                "Heartbeat interval must be greater than 0",
            ));
        }

        self.ws_url(&self.event_id)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ws_url_follows_scheme() {
        let config = ClientConfig::new("https://draw.example.com/", "sfs-2025");
        assert_eq!(
            config.ws_url("sfs-2025").unwrap(),
            "wss://draw.example.com/api/luckydraw/ws/sfs-2025"
        );

        let config = ClientConfig::default();
        assert_eq!(
            config.ws_url("a b").unwrap(),
            "ws://localhost:8000/api/luckydraw/ws/a%20b"
        );
        assert_eq!(config.api_base(), "http://localhost:8000/api/luckydraw");
    }

    #[test]
    fn test_validate() {
        assert!(ClientConfig::default().validate().is_ok());
        assert!(ClientConfig::new("ftp://x", "e").validate().is_err());
        assert!(ClientConfig::new("http://x", "").validate().is_err());

        let mut config = ClientConfig::default();
        config.heartbeat_interval = Duration::ZERO;
        assert!(config.validate().is_err());
    }
}
