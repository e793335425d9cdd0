use crate::types::DrawMode;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, LuckyDrawError>;

#[derive(Error, Debug)]
pub enum LuckyDrawError {
    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("{mode} mode supports at most {max} winner(s), requested {requested}")]
    InvalidWinnerCount {
        mode: DrawMode,
        requested: u32,
        max: u32,
    },

    #[error("Network connection error: {0}")]
    NetworkConnection(String),

    #[error("Not connected")]
    NotConnected,

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Draw service error: {0}")]
    Service(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl LuckyDrawError {
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    pub fn network_connection(msg: impl Into<String>) -> Self {
        Self::NetworkConnection(msg.into())
    }

    pub fn protocol(msg: impl Into<String>) -> Self {
        Self::Protocol(msg.into())
    }

    pub fn service(msg: impl Into<String>) -> Self {
        Self::Service(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for LuckyDrawError {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        LuckyDrawError::NetworkConnection(err.to_string())
    }
}
