//! Persistent broadcast connection owned by a single role instance.
//!
//! [`ConnectionManager`] keeps one live link to the draw service, dispatches
//! every inbound frame to handlers registered by frame type, and reports
//! liveness as a [`ConnectionStatus`]. Handlers live in a registry that is
//! independent of the link, so anything registered before `connect` resolves
//! still sees every frame afterwards.

pub mod loopback;
pub mod websocket;

pub use websocket::WebSocketConnector;

use crate::config::{ClientConfig, ReconnectPolicy};
use crate::error::{LuckyDrawError, Result};
use crate::types::ConnectionStatus;
use async_trait::async_trait;
use parking_lot::RwLock;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant};
use tracing::{debug, error, info, warn};

/// Handlers registered under this name receive every frame.
pub const ANY_MESSAGE: &str = "message";

const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(1);

/// One decoded broadcast frame: its `type` plus the whole JSON object.
#[derive(Debug, Clone, PartialEq)]
pub struct InboundFrame {
    pub kind: String,
    pub payload: Value,
}

impl InboundFrame {
    pub fn parse(text: &str) -> Result<Self> {
        let payload: Value = serde_json::from_str(text)?;
        let kind = payload
            .get("type")
            .and_then(Value::as_str)
            .ok_or_else(|| LuckyDrawError::protocol("Frame has no string `type` field"))?
            .to_string();
        Ok(Self { kind, payload })
    }
}

/// Builds the wire text for an outbound frame. Object payloads are flattened
/// next to `type`; anything else is carried under `data`.
pub fn encode_frame(kind: &str, payload: Value) -> Result<String> {
    let mut object = match payload {
        Value::Object(map) => map,
        Value::Null => Map::new(),
        other => {
            let mut map = Map::new();
            map.insert("data".to_string(), other);
            map
        }
    };
    object.insert("type".to_string(), Value::String(kind.to_string()));
    Ok(serde_json::to_string(&Value::Object(object))?)
}

/// Bidirectional text channel to the draw service.
#[async_trait]
pub trait Transport: Send + 'static {
    async fn send(&mut self, text: String) -> Result<()>;

    /// `None` once the peer has closed the link.
    async fn recv(&mut self) -> Option<Result<String>>;

    async fn close(&mut self) -> Result<()>;
}

/// Opens transports for an event's broadcast channel.
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    async fn open(&self, event_id: &str) -> Result<Box<dyn Transport>>;
}

type FrameHandler = Arc<dyn Fn(&InboundFrame) + Send + Sync>;
type StatusHandler = Arc<dyn Fn(ConnectionStatus) + Send + Sync>;

struct Registry {
    next_id: AtomicU64,
    handlers: RwLock<HashMap<String, Vec<(u64, FrameHandler)>>>,
    status_listeners: RwLock<Vec<(u64, StatusHandler)>>,
    status: watch::Sender<ConnectionStatus>,
}

impl Registry {
    fn new() -> Self {
        let (status, _) = watch::channel(ConnectionStatus::Disconnected);
        Self {
            next_id: AtomicU64::new(1),
            handlers: RwLock::new(HashMap::new()),
            status_listeners: RwLock::new(Vec::new()),
            status,
        }
    }

    fn next_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    fn set_status(&self, status: ConnectionStatus) {
        let previous = self.status.send_replace(status);
        if previous == status {
            return;
        }
        debug!("Connection status {} -> {}", previous, status);

        // Snapshot so listeners may unsubscribe from inside the callback.
        let listeners: Vec<StatusHandler> = self
            .status_listeners
            .read()
            .iter()
            .map(|(_, h)| h.clone())
            .collect();
        for listener in listeners {
            listener(status);
        }
    }

    fn dispatch(&self, frame: &InboundFrame) {
        let targets: Vec<FrameHandler> = {
            let handlers = self.handlers.read();
            handlers
                .get(&frame.kind)
                .into_iter()
                .chain(handlers.get(ANY_MESSAGE))
                .flatten()
                .map(|(_, h)| h.clone())
                .collect()
        };
        debug!("Dispatching {} to {} handler(s)", frame.kind, targets.len());
        for handler in targets {
            handler(frame);
        }
    }

    fn clear(&self) {
        self.handlers.write().clear();
        self.status_listeners.write().clear();
    }
}

enum SubscriptionTarget {
    Frame(String),
    Status,
}

/// Handle returned by [`ConnectionManager::on`]; call `unsubscribe` to remove
/// the handler.
#[must_use = "dropping a Subscription keeps the handler registered"]
pub struct Subscription {
    registry: Weak<Registry>,
    id: u64,
    target: SubscriptionTarget,
}

impl Subscription {
    pub fn unsubscribe(self) {
        let Some(registry) = self.registry.upgrade() else {
            return;
        };
        match &self.target {
            SubscriptionTarget::Frame(kind) => {
                let mut handlers = registry.handlers.write();
                if let Some(list) = handlers.get_mut(kind) {
                    list.retain(|(id, _)| *id != self.id);
                    if list.is_empty() {
                        handlers.remove(kind);
                    }
                }
            }
            SubscriptionTarget::Status => {
                registry
                    .status_listeners
                    .write()
                    .retain(|(id, _)| *id != self.id);
            }
        }
    }
}

struct Link {
    event_id: String,
    outbound: mpsc::UnboundedSender<String>,
    shutdown: Option<oneshot::Sender<()>>,
    task: JoinHandle<()>,
}

pub struct ConnectionManager {
    config: ClientConfig,
    connector: Arc<dyn Connector>,
    registry: Arc<Registry>,
    link: Option<Link>,
}

impl ConnectionManager {
    /// Manager that talks to the configured server over WebSocket.
    pub fn new(config: ClientConfig) -> Self {
        let connector = Arc::new(WebSocketConnector::new(config.clone()));
        Self::with_connector(config, connector)
    }

    pub fn with_connector(config: ClientConfig, connector: Arc<dyn Connector>) -> Self {
        Self {
            config,
            connector,
            registry: Arc::new(Registry::new()),
            link: None,
        }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn status(&self) -> ConnectionStatus {
        *self.registry.status.borrow()
    }

    pub fn is_connected(&self) -> bool {
        self.status() == ConnectionStatus::Connected
    }

    pub fn event_id(&self) -> Option<&str> {
        self.link.as_ref().map(|l| l.event_id.as_str())
    }

    /// Watch channel that tracks every status transition.
    pub fn watch_status(&self) -> watch::Receiver<ConnectionStatus> {
        self.registry.status.subscribe()
    }

    /// Opens the link for `event_id`. A no-op when already connected to the
    /// same event; a different event replaces the current link.
    pub async fn connect(&mut self, event_id: &str) -> Result<()> {
        if let Some(link) = &self.link {
            if link.event_id == event_id && self.is_connected() && !link.task.is_finished() {
                debug!("Already connected to event {}", event_id);
                return Ok(());
            }
        }
        self.stop_link().await;

        self.registry.set_status(ConnectionStatus::Connecting);
        let transport = match self.connector.open(event_id).await {
            Ok(transport) => transport,
            Err(e) => {
                error!("Failed to connect to event {}: {}", event_id, e);
                self.registry.set_status(ConnectionStatus::Error);
                return Err(e);
            }
        };

        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let (shutdown_tx, shutdown_rx) = oneshot::channel();

        self.registry.set_status(ConnectionStatus::Connected);
        info!("Connected to event {}", event_id);

        let task = tokio::spawn(run_link(LinkLoop {
            transport,
            event_id: event_id.to_string(),
            connector: self.connector.clone(),
            registry: self.registry.clone(),
            outbound: outbound_rx,
            shutdown: shutdown_rx,
            heartbeat: self.config.heartbeat_interval,
            reconnect: self.config.reconnect.clone(),
        }));

        self.link = Some(Link {
            event_id: event_id.to_string(),
            outbound: outbound_tx,
            shutdown: Some(shutdown_tx),
            task,
        });
        Ok(())
    }

    /// Registers `handler` for frames of type `kind` (or [`ANY_MESSAGE`]).
    pub fn on<F>(&self, kind: &str, handler: F) -> Subscription
    where
        F: Fn(&InboundFrame) + Send + Sync + 'static,
    {
        let id = self.registry.next_id();
        self.registry
            .handlers
            .write()
            .entry(kind.to_string())
            .or_default()
            .push((id, Arc::new(handler)));
        Subscription {
            registry: Arc::downgrade(&self.registry),
            id,
            target: SubscriptionTarget::Frame(kind.to_string()),
        }
    }

    pub fn on_status<F>(&self, handler: F) -> Subscription
    where
        F: Fn(ConnectionStatus) + Send + Sync + 'static,
    {
        let id = self.registry.next_id();
        self.registry
            .status_listeners
            .write()
            .push((id, Arc::new(handler)));
        Subscription {
            registry: Arc::downgrade(&self.registry),
            id,
            target: SubscriptionTarget::Status,
        }
    }

    /// Forwards every frame, in arrival order, into a channel for a role's
    /// event loop.
    pub fn subscribe_all(&self) -> (mpsc::UnboundedReceiver<InboundFrame>, Subscription) {
        let (tx, rx) = mpsc::unbounded_channel();
        let subscription = self.on(ANY_MESSAGE, move |frame| {
            let _ = tx.send(frame.clone());
        });
        (rx, subscription)
    }

    pub fn send(&self, kind: &str, payload: Value) -> Result<()> {
        if !self.is_connected() {
            return Err(LuckyDrawError::NotConnected);
        }
        let link = self.link.as_ref().ok_or(LuckyDrawError::NotConnected)?;
        let text = encode_frame(kind, payload)?;
        debug!("Queueing outbound {}", kind);
        link.outbound
            .send(text)
            .map_err(|_| LuckyDrawError::NotConnected)
    }

    /// Closes the link and releases every handler registration. Safe to call
    /// repeatedly.
    pub async fn disconnect(&mut self) {
        self.stop_link().await;
        self.registry.set_status(ConnectionStatus::Disconnected);
        self.registry.clear();
    }

    async fn stop_link(&mut self) {
        let Some(mut link) = self.link.take() else {
            return;
        };
        if let Some(shutdown) = link.shutdown.take() {
            let _ = shutdown.send(());
        }
        match tokio::time::timeout(SHUTDOWN_TIMEOUT, &mut link.task).await {
            Ok(Ok(())) => {}
            Ok(Err(join_err)) => warn!("Link task ended with join error: {}", join_err),
            Err(_) => {
                warn!("Link task did not stop in time; aborting");
                link.task.abort();
            }
        }
        info!("Disconnected from event {}", link.event_id);
    }
}

impl Drop for ConnectionManager {
    fn drop(&mut self) {
        if let Some(link) = self.link.take() {
            link.task.abort();
        }
    }
}

impl std::fmt::Debug for ConnectionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionManager")
            .field("status", &self.status())
            .field("event_id", &self.event_id())
            .finish()
    }
}

struct LinkLoop {
    transport: Box<dyn Transport>,
    event_id: String,
    connector: Arc<dyn Connector>,
    registry: Arc<Registry>,
    outbound: mpsc::UnboundedReceiver<String>,
    shutdown: oneshot::Receiver<()>,
    heartbeat: Duration,
    reconnect: ReconnectPolicy,
}

enum LinkEnd {
    Shutdown,
    Dropped,
    Failed,
}

async fn run_link(mut link: LinkLoop) {
    loop {
        let end = pump(&mut link).await;
        match end {
            LinkEnd::Shutdown => {
                let _ = link.transport.close().await;
                return;
            }
            LinkEnd::Dropped => link.registry.set_status(ConnectionStatus::Disconnected),
            LinkEnd::Failed => link.registry.set_status(ConnectionStatus::Error),
        }

        match reopen(&mut link).await {
            Some(transport) => {
                link.transport = transport;
                link.registry.set_status(ConnectionStatus::Connected);
                info!("Reconnected to event {}", link.event_id);
            }
            None => {
                link.registry.set_status(ConnectionStatus::Disconnected);
                return;
            }
        }
    }
}

async fn pump(link: &mut LinkLoop) -> LinkEnd {
    let mut heartbeat = interval_at(Instant::now() + link.heartbeat, link.heartbeat);

    loop {
        tokio::select! {
            _ = &mut link.shutdown => {
                debug!("Link shutdown requested");
                return LinkEnd::Shutdown;
            }

            outgoing = link.outbound.recv() => {
                let Some(text) = outgoing else {
                    return LinkEnd::Shutdown;
                };
                if let Err(e) = link.transport.send(text).await {
                    error!("Transport send error: {}", e);
                    return LinkEnd::Failed;
                }
            }

            _ = heartbeat.tick() => {
                let ping = r#"{"type":"ping"}"#.to_string();
                if let Err(e) = link.transport.send(ping).await {
                    error!("Heartbeat send failed: {}", e);
                    return LinkEnd::Failed;
                }
            }

            incoming = link.transport.recv() => {
                match incoming {
                    Some(Ok(text)) => match InboundFrame::parse(&text) {
                        Ok(frame) if frame.kind == "pong" => {}
                        Ok(frame) => link.registry.dispatch(&frame),
                        Err(e) => warn!("Dropping undecodable frame: {}", e),
                    },
                    Some(Err(e)) => {
                        error!("Transport receive error: {}", e);
                        return LinkEnd::Failed;
                    }
                    None => {
                        info!("Link to event {} closed by peer", link.event_id);
                        return LinkEnd::Dropped;
                    }
                }
            }
        }
    }
}

async fn reopen(link: &mut LinkLoop) -> Option<Box<dyn Transport>> {
    for attempt in 1..=link.reconnect.max_attempts {
        tokio::select! {
            _ = &mut link.shutdown => return None,
            _ = tokio::time::sleep(link.reconnect.delay) => {}
        }

        info!(
            "Reconnect attempt {}/{} for event {}",
            attempt, link.reconnect.max_attempts, link.event_id
        );
        link.registry.set_status(ConnectionStatus::Connecting);
        match link.connector.open(&link.event_id).await {
            Ok(transport) => return Some(transport),
            Err(e) => warn!("Reconnect attempt {} failed: {}", attempt, e),
        }
    }

    if link.reconnect.max_attempts > 0 {
        warn!("Giving up on event {} after {} attempts", link.event_id, link.reconnect.max_attempts);
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::loopback::LoopbackServer;
    use parking_lot::Mutex;
    use serde_json::json;

    fn manager(server: &LoopbackServer) -> ConnectionManager {
        let config = ClientConfig::default().with_reconnect(ReconnectPolicy::disabled());
        ConnectionManager::with_connector(config, Arc::new(server.connector()))
    }

    #[test]
    fn test_frame_encoding_flattens_objects() {
        let text = encode_frame("identify", json!({ "draw_number": 7 })).unwrap();
        let frame = InboundFrame::parse(&text).unwrap();
        assert_eq!(frame.kind, "identify");
        assert_eq!(frame.payload["draw_number"], 7);

        let text = encode_frame("note", json!([1, 2])).unwrap();
        assert_eq!(InboundFrame::parse(&text).unwrap().payload["data"], json!([1, 2]));

        assert!(InboundFrame::parse(r#"{"no_type":1}"#).is_err());
    }

    #[tokio::test]
    async fn test_handlers_registered_before_connect_receive_frames() {
        let server = LoopbackServer::new();
        let mut manager = manager(&server);

        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let _sub = manager.on("draw_started", move |frame| {
            sink.lock().push(frame.payload["prize_name"].clone());
        });
        let (mut all, _all_sub) = manager.subscribe_all();

        manager.connect("sfs-2025").await.unwrap();
        assert_eq!(manager.status(), ConnectionStatus::Connected);

        server.broadcast("draw_started", json!({ "prize_name": "TV" }));
        let frame = all.recv().await.unwrap();
        assert_eq!(frame.kind, "draw_started");
        assert_eq!(seen.lock().as_slice(), &[json!("TV")]);
    }

    #[tokio::test]
    async fn test_unsubscribe_stops_delivery() {
        let server = LoopbackServer::new();
        let mut manager = manager(&server);

        let count = Arc::new(AtomicU64::new(0));
        let counter = count.clone();
        let sub = manager.on("participant_joined", move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        let (mut all, _all_sub) = manager.subscribe_all();
        manager.connect("sfs-2025").await.unwrap();

        server.broadcast("participant_joined", json!({ "draw_number": 1 }));
        all.recv().await.unwrap();
        sub.unsubscribe();
        server.broadcast("participant_joined", json!({ "draw_number": 2 }));
        all.recv().await.unwrap();

        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_failed_connect_reports_error_then_recovers() {
        let server = LoopbackServer::new();
        let mut manager = manager(&server);

        let statuses = Arc::new(Mutex::new(Vec::new()));
        let sink = statuses.clone();
        let _sub = manager.on_status(move |s| sink.lock().push(s));

        server.set_healthy(false);
        assert!(manager.connect("sfs-2025").await.is_err());
        assert_eq!(manager.status(), ConnectionStatus::Error);

        server.set_healthy(true);
        manager.connect("sfs-2025").await.unwrap();
        assert_eq!(
            statuses.lock().as_slice(),
            &[
                ConnectionStatus::Connecting,
                ConnectionStatus::Error,
                ConnectionStatus::Connecting,
                ConnectionStatus::Connected,
            ]
        );
    }

    #[tokio::test]
    async fn test_connect_twice_keeps_one_link() {
        let server = LoopbackServer::new();
        let mut manager = manager(&server);

        manager.connect("sfs-2025").await.unwrap();
        manager.connect("sfs-2025").await.unwrap();
        assert_eq!(server.open_count(), 1);

        manager.connect("other-event").await.unwrap();
        assert_eq!(server.open_count(), 2);
        assert_eq!(manager.event_id(), Some("other-event"));
    }

    #[tokio::test]
    async fn test_send_reaches_server() {
        let server = LoopbackServer::new();
        let mut manager = manager(&server);
        assert!(matches!(
            manager.send("identify", json!({})),
            Err(LuckyDrawError::NotConnected)
        ));

        manager.connect("sfs-2025").await.unwrap();
        manager
            .send("identify", json!({ "draw_number": 42 }))
            .unwrap();
        let frame = server.next_client_frame().await.unwrap();
        assert_eq!(frame.kind, "identify");
        assert_eq!(frame.payload["draw_number"], 42);
    }

    #[tokio::test]
    async fn test_disconnect_is_idempotent_and_releases_handlers() {
        let server = LoopbackServer::new();
        let mut manager = manager(&server);
        let _sub = manager.on("draw_started", |_| {});
        manager.connect("sfs-2025").await.unwrap();

        manager.disconnect().await;
        manager.disconnect().await;
        assert_eq!(manager.status(), ConnectionStatus::Disconnected);
        assert!(manager.registry.handlers.read().is_empty());
        assert!(manager.send("ping", Value::Null).is_err());
    }

    #[tokio::test]
    async fn test_peer_drop_surfaces_disconnected() {
        let server = LoopbackServer::new();
        let mut manager = manager(&server);
        let mut status = manager.watch_status();
        manager.connect("sfs-2025").await.unwrap();

        server.drop_clients();
        while *status.borrow_and_update() != ConnectionStatus::Disconnected {
            status.changed().await.unwrap();
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_reconnects_after_drop() {
        let server = LoopbackServer::new();
        let config = ClientConfig::default();
        let mut manager = ConnectionManager::with_connector(config, Arc::new(server.connector()));
        let (mut frames, _sub) = manager.subscribe_all();
        manager.connect("sfs-2025").await.unwrap();
        let mut status = manager.watch_status();

        server.drop_clients();
        loop {
            status.changed().await.unwrap();
            if *status.borrow() == ConnectionStatus::Connected {
                break;
            }
        }
        assert_eq!(server.open_count(), 2);

        server.broadcast("draw_standby", json!({ "prize_name": "Bike" }));
        assert_eq!(frames.recv().await.unwrap().kind, "draw_standby");
    }
}
