//! LuckyDraw core - draw lifecycle synchronization for live prize draws
//!
//! This library keeps independently connected client roles (controller,
//! presentation surfaces, audience devices) in step with one
//! server-authoritative draw lifecycle, and applies each revealed result to
//! the local animation exactly once.

pub mod config;
pub mod connection;
pub mod engine;
pub mod error;
pub mod overlay;
pub mod protocol;
pub mod reconciler;
pub mod roles;
pub mod service;
pub mod storage;
pub mod types;

pub use config::{ClientConfig, ReconnectPolicy, DEFAULT_EVENT_ID};
pub use connection::{ConnectionManager, InboundFrame, Subscription};
pub use engine::{AnimationEngine, DrawCompletion};
pub use error::{LuckyDrawError, Result};
pub use overlay::{OverlayState, StandbyPresenter};
pub use protocol::{EventKind, LifecycleEvent, OutboundMessage};
pub use reconciler::{Reconciler, Submission};
pub use roles::{Audience, Controller, Presentation};
pub use service::{DrawService, HttpDrawService, StartDrawRequest};
pub use types::{
    ConnectionStatus, DrawMode, DrawNumber, DrawSession, EngineState, Screen, WinnerSet,
};

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::loopback::LoopbackServer;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_presentation_connects() {
        let server = LoopbackServer::new();
        let connection =
            ConnectionManager::with_connector(ClientConfig::default(), Arc::new(server.connector()));
        let mut presentation = Presentation::new(connection);

        presentation.connect().await.unwrap();
        assert_eq!(presentation.connection_status(), ConnectionStatus::Connected);
        assert_eq!(presentation.screen(), Screen::Lobby);
        presentation.teardown().await;
        assert_eq!(presentation.connection_status(), ConnectionStatus::Disconnected);
    }
}
