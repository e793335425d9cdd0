//! Command and query surface of the external draw service.

use crate::config::ClientConfig;
use crate::error::{LuckyDrawError, Result};
use crate::types::{DrawMode, DrawNumber, DrawRecord, Participant, WinnerSet};
use async_trait::async_trait;
use reqwest::{Client, Method, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PrizeAnnouncement {
    pub prize_name: String,
    pub prize_rank: u32,
    pub prize_image: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StartDrawRequest {
    pub prize_name: String,
    pub prize_rank: u32,
    pub prize_image: Option<String>,
    pub draw_mode: DrawMode,
    pub winner_count: u32,
}

impl StartDrawRequest {
    pub fn new(prize_name: impl Into<String>, prize_rank: u32) -> Self {
        Self {
            prize_name: prize_name.into(),
            prize_rank,
            prize_image: None,
            draw_mode: DrawMode::default(),
            winner_count: 1,
        }
    }

    pub fn with_mode(mut self, draw_mode: DrawMode, winner_count: u32) -> Self {
        self.draw_mode = draw_mode;
        self.winner_count = winner_count;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.prize_name.trim().is_empty() {
            return Err(LuckyDrawError::config("Prize name cannot be empty"));
        }
        self.draw_mode.validate_winner_count(self.winner_count)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ResetRequest {
    pub reset_participants: bool,
    pub reset_draws: bool,
}

impl Default for ResetRequest {
    fn default() -> Self {
        Self {
            reset_participants: false,
            reset_draws: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Registration {
    pub draw_number: DrawNumber,
    pub session_token: String,
    #[serde(default)]
    pub is_existing: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RevealOutcome {
    pub prize_name: String,
    pub prize_rank: u32,
    #[serde(deserialize_with = "crate::protocol::payloads::wire_winners")]
    pub winners: WinnerSet,
    #[serde(default)]
    pub drawn_at: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Roster {
    pub total_count: u32,
    pub participants: Vec<Participant>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct DrawHistory {
    #[serde(default)]
    pub total_count: u32,
    pub draws: Vec<DrawRecord>,
}

impl DrawHistory {
    /// Prizes won by `number`, most recent first.
    pub fn wins_for(&self, number: DrawNumber) -> Vec<DrawRecord> {
        let mut wins: Vec<DrawRecord> = self
            .draws
            .iter()
            .filter(|d| d.draw_number == number)
            .cloned()
            .collect();
        wins.sort_by(|a, b| b.drawn_at.cmp(&a.drawn_at));
        wins
    }
}

#[async_trait]
pub trait DrawService: Send + Sync {
    async fn register(&self, event_id: &str, session_token: Option<&str>) -> Result<Registration>;
    async fn standby(&self, event_id: &str, prize: &PrizeAnnouncement) -> Result<()>;
    async fn start_animation(&self, event_id: &str, request: &StartDrawRequest) -> Result<()>;
    async fn reveal(&self, event_id: &str) -> Result<RevealOutcome>;
    async fn reset(&self, event_id: &str, request: ResetRequest) -> Result<String>;
    async fn participants(&self, event_id: &str) -> Result<Roster>;
    async fn draw_history(&self, event_id: &str) -> Result<DrawHistory>;
}

#[derive(Deserialize)]
struct Envelope<T> {
    #[serde(default)]
    success: bool,
    data: Option<T>,
    #[serde(default)]
    message: Option<String>,
}

#[derive(Deserialize)]
struct ErrorBody {
    detail: ErrorDetail,
}

#[derive(Deserialize)]
struct ErrorDetail {
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

/// [`DrawService`] over the service's REST API.
#[derive(Debug, Clone)]
pub struct HttpDrawService {
    client: Client,
    api_base: String,
}

impl HttpDrawService {
    pub fn new(config: &ClientConfig) -> Self {
        Self {
            client: Client::new(),
            api_base: config.api_base(),
        }
    }

    fn admin_path(event_id: &str, tail: &str) -> Result<String> {
        let mut url = url::Url::parse("http://placeholder/admin/")
            .map_err(|e| LuckyDrawError::internal(e.to_string()))?;
        url.path_segments_mut()
            .map_err(|_| LuckyDrawError::internal("Cannot build admin path"))?
            .pop_if_empty()
            .push(event_id)
            .extend(tail.split('/').filter(|s| !s.is_empty()));
        Ok(url.path().to_string())
    }

    async fn call<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        body: Option<Value>,
    ) -> Result<Envelope<T>> {
        let url = format!("{}{}", self.api_base, path);
        debug!("{} {}", method, url);

        let mut request = self.client.request(method, &url);
        if let Some(body) = body {
            request = request.json(&body);
        }
        let response = request.send().await?;
        let status = response.status();
        let text = response.text().await?;

        if !status.is_success() {
            return Err(service_error(status, &text));
        }
        let envelope: Envelope<T> = serde_json::from_str(&text)?;
        if !envelope.success {
            return Err(LuckyDrawError::service(
                envelope
                    .message
                    .unwrap_or_else(|| "Request was not successful".to_string()),
            ));
        }
        Ok(envelope)
    }

    async fn data<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        body: Option<Value>,
    ) -> Result<T> {
        self.call(method, path, body)
            .await?
            .data
            .ok_or_else(|| LuckyDrawError::service("Response had no data"))
    }
}

fn service_error(status: StatusCode, body: &str) -> LuckyDrawError {
    match serde_json::from_str::<ErrorBody>(body) {
        Ok(ErrorBody { detail }) => LuckyDrawError::service(format!(
            "{} ({}): {}",
            detail.code.as_deref().unwrap_or("UNKNOWN_ERROR"),
            status.as_u16(),
            detail.message.as_deref().unwrap_or("no message"),
        )),
        Err(_) => LuckyDrawError::service(format!("HTTP {}", status.as_u16())),
    }
}

#[async_trait]
impl DrawService for HttpDrawService {
    async fn register(&self, event_id: &str, session_token: Option<&str>) -> Result<Registration> {
        let body = serde_json::json!({ "event_id": event_id, "session_token": session_token });
        let registration: Registration = self.data(Method::POST, "/register", Some(body)).await?;
        info!("Registered ticket {}", registration.draw_number);
        Ok(registration)
    }

    async fn standby(&self, event_id: &str, prize: &PrizeAnnouncement) -> Result<()> {
        let path = Self::admin_path(event_id, "draw/standby")?;
        self.call::<Value>(Method::POST, &path, Some(serde_json::to_value(prize)?))
            .await?;
        Ok(())
    }

    async fn start_animation(&self, event_id: &str, request: &StartDrawRequest) -> Result<()> {
        let path = Self::admin_path(event_id, "draw/start-animation")?;
        self.call::<Value>(Method::POST, &path, Some(serde_json::to_value(request)?))
            .await?;
        Ok(())
    }

    async fn reveal(&self, event_id: &str) -> Result<RevealOutcome> {
        let path = Self::admin_path(event_id, "draw/reveal")?;
        self.data(Method::POST, &path, None).await
    }

    async fn reset(&self, event_id: &str, request: ResetRequest) -> Result<String> {
        let path = Self::admin_path(event_id, "reset")?;
        let envelope = self
            .call::<Value>(Method::POST, &path, Some(serde_json::to_value(request)?))
            .await?;
        Ok(envelope.message.unwrap_or_default())
    }

    async fn participants(&self, event_id: &str) -> Result<Roster> {
        let path = Self::admin_path(event_id, "participants")?;
        self.data(Method::GET, &path, None).await
    }

    async fn draw_history(&self, event_id: &str) -> Result<DrawHistory> {
        let path = Self::admin_path(event_id, "draws")?;
        self.data(Method::GET, &path, None).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_admin_path_escapes_event_id() {
        assert_eq!(
            HttpDrawService::admin_path("sfs-2025", "draw/standby").unwrap(),
            "/admin/sfs-2025/draw/standby"
        );
        assert_eq!(
            HttpDrawService::admin_path("a b", "reset").unwrap(),
            "/admin/a%20b/reset"
        );
    }

    #[test]
    fn test_error_body_maps_to_service_error() {
        let err = service_error(
            StatusCode::NOT_FOUND,
            r#"{"detail":{"code":"PARTICIPANT_NOT_FOUND","message":"no such ticket"}}"#,
        );
        assert!(matches!(&err, LuckyDrawError::Service(m) if m.contains("PARTICIPANT_NOT_FOUND")));
        assert!(matches!(service_error(StatusCode::BAD_GATEWAY, "<html>"), LuckyDrawError::Service(_)));
    }

    #[test]
    fn test_start_request_validation() {
        let request = StartDrawRequest::new("TV", 1).with_mode(DrawMode::DigitRoll, 5);
        assert!(matches!(
            request.validate(),
            Err(LuckyDrawError::InvalidWinnerCount { .. })
        ));
        assert!(StartDrawRequest::new("TV", 1)
            .with_mode(DrawMode::CardReveal, 5)
            .validate()
            .is_ok());
    }

    #[test]
    fn test_wins_for_ticket() {
        let history: DrawHistory = serde_json::from_value(serde_json::json!({
            "total_count": 3,
            "draws": [
                { "prize_name": "Mug", "prize_rank": 3, "draw_number": 7, "drawn_at": "2025-01-01T10:00:00" },
                { "prize_name": "TV", "prize_rank": 1, "draw_number": 42, "drawn_at": "2025-01-01T11:00:00" },
                { "prize_name": "Bike", "prize_rank": 2, "draw_number": 7, "drawn_at": "2025-01-01T12:00:00" }
            ]
        }))
        .unwrap();

        let wins = history.wins_for(DrawNumber::new(7).unwrap());
        let names: Vec<_> = wins.iter().map(|w| w.prize_name.as_str()).collect();
        assert_eq!(names, vec!["Bike", "Mug"]);
    }
}
