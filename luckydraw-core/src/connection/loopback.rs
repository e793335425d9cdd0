//! In-process stand-in for the draw service's broadcast channel.
//!
//! A [`LoopbackServer`] hands out connectors whose transports are plain
//! channels, so role logic can be driven frame by frame without a network.

use crate::connection::{encode_frame, Connector, InboundFrame, Transport};
use crate::error::{LuckyDrawError, Result};
use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, warn};

struct ServerState {
    healthy: bool,
    opened: usize,
    clients: Vec<mpsc::UnboundedSender<String>>,
}

#[derive(Clone)]
pub struct LoopbackServer {
    state: Arc<Mutex<ServerState>>,
    from_clients_tx: mpsc::UnboundedSender<String>,
    from_clients_rx: Arc<tokio::sync::Mutex<mpsc::UnboundedReceiver<String>>>,
}

impl Default for LoopbackServer {
    fn default() -> Self {
        Self::new()
    }
}

impl LoopbackServer {
    pub fn new() -> Self {
        let (from_clients_tx, from_clients_rx) = mpsc::unbounded_channel();
        Self {
            state: Arc::new(Mutex::new(ServerState {
                healthy: true,
                opened: 0,
                clients: Vec::new(),
            })),
            from_clients_tx,
            from_clients_rx: Arc::new(tokio::sync::Mutex::new(from_clients_rx)),
        }
    }

    pub fn connector(&self) -> LoopbackConnector {
        LoopbackConnector {
            server: self.clone(),
        }
    }

    /// While unhealthy, every `open` fails.
    pub fn set_healthy(&self, healthy: bool) {
        self.state.lock().healthy = healthy;
    }

    /// Number of transports opened so far, including reconnects.
    pub fn open_count(&self) -> usize {
        self.state.lock().opened
    }

    pub fn client_count(&self) -> usize {
        let mut state = self.state.lock();
        state.clients.retain(|c| !c.is_closed());
        state.clients.len()
    }

    /// Sends one frame to every connected client.
    pub fn broadcast(&self, kind: &str, payload: Value) {
        match encode_frame(kind, payload) {
            Ok(text) => self.broadcast_raw(&text),
            Err(e) => warn!("Loopback could not encode {}: {}", kind, e),
        }
    }

    pub fn broadcast_raw(&self, text: &str) {
        let mut state = self.state.lock();
        state.clients.retain(|c| c.send(text.to_string()).is_ok());
        debug!("Loopback broadcast to {} client(s)", state.clients.len());
    }

    /// Closes every open transport from the server side.
    pub fn drop_clients(&self) {
        self.state.lock().clients.clear();
    }

    /// Next frame any client sent, heartbeats included.
    pub async fn next_client_frame(&self) -> Option<InboundFrame> {
        let text = self.from_clients_rx.lock().await.recv().await?;
        InboundFrame::parse(&text).ok()
    }

    /// Next client frame of type `kind`, skipping everything else.
    pub async fn next_client_frame_of(&self, kind: &str) -> Option<InboundFrame> {
        loop {
            let frame = self.next_client_frame().await?;
            if frame.kind == kind {
                return Some(frame);
            }
        }
    }

    /// Client frames already delivered, without waiting.
    pub fn drain_client_frames(&self) -> Vec<InboundFrame> {
        let Ok(mut rx) = self.from_clients_rx.try_lock() else {
            return Vec::new();
        };
        let mut frames = Vec::new();
        while let Ok(text) = rx.try_recv() {
            if let Ok(frame) = InboundFrame::parse(&text) {
                frames.push(frame);
            }
        }
        frames
    }
}

#[derive(Clone)]
pub struct LoopbackConnector {
    server: LoopbackServer,
}

#[async_trait]
impl Connector for LoopbackConnector {
    async fn open(&self, event_id: &str) -> Result<Box<dyn Transport>> {
        let (to_client_tx, to_client_rx) = mpsc::unbounded_channel();
        {
            let mut state = self.server.state.lock();
            if !state.healthy {
                return Err(LuckyDrawError::network_connection(format!(
                    "Loopback refused connection for event {}",
                    event_id
                )));
            }
            state.opened += 1;
            state.clients.push(to_client_tx);
        }

        Ok(Box::new(LoopbackTransport {
            to_server: self.server.from_clients_tx.clone(),
            from_server: to_client_rx,
        }))
    }
}

pub struct LoopbackTransport {
    to_server: mpsc::UnboundedSender<String>,
    from_server: mpsc::UnboundedReceiver<String>,
}

#[async_trait]
impl Transport for LoopbackTransport {
    async fn send(&mut self, text: String) -> Result<()> {
        self.to_server
            .send(text)
            .map_err(|_| LuckyDrawError::network_connection("Loopback server is gone"))
    }

    async fn recv(&mut self) -> Option<Result<String>> {
        self.from_server.recv().await.map(Ok)
    }

    async fn close(&mut self) -> Result<()> {
        self.from_server.close();
        Ok(())
    }
}
