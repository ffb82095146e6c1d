//! WebSocket connection manager
//!
//! Owns the single socket to the media server and provides:
//! - Automatic reconnection with capped exponential backoff
//! - Demultiplexing of inbound frames into per-channel subscribers
//! - Encoding of outbound control messages and audio
//!
//! All socket I/O, timers and event dispatch happen on one driver task, so
//! dispatched callbacks run one at a time in arrival order. The one
//! exception is the immediate `on_connect` catch-up, which runs on the
//! registering thread and may overlap a dispatch in progress.

use std::fmt;
use std::sync::{Arc, Weak};
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures_util::{Sink, SinkExt, Stream, StreamExt};
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use serde_json::Value;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_tungstenite::{
    connect_async,
    tungstenite::{Error as WsError, Message as WsMessage},
};
use tracing::{debug, error, info, trace, warn};
use url::Url;

use crate::connection::backoff::{ReconnectBackoff, ReconnectPolicy, ReconnectStatus};
use crate::connection::registry::{
    Channel, EventHandler, FrameHandler, MessageHandler, ObserverRegistry, SubscriptionId,
};
use crate::error::{Error, Result};
use crate::protocol::{decode_binary, decode_text, InboundFrame, OutboundFrame};

/// How long teardown waits for the close frame to be written
const CLOSE_TIMEOUT: Duration = Duration::from_secs(1);

// ─────────────────────────────────────────────────────────────────
// Configuration
// ─────────────────────────────────────────────────────────────────

/// Configuration for the connection manager
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    /// WebSocket URL of the media server, reused for every reattempt
    pub url: String,

    /// Reconnection backoff
    pub reconnect: ReconnectPolicy,

    /// Upper bound for a single connect attempt
    pub connect_timeout: Duration,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            url: "ws://localhost:8000/ws".to_string(),
            reconnect: ReconnectPolicy::default(),
            connect_timeout: Duration::from_secs(10),
        }
    }
}

impl ConnectionConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Default::default()
        }
    }
}

// ─────────────────────────────────────────────────────────────────
// Connection State
// ─────────────────────────────────────────────────────────────────

/// Connection state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    /// No socket open
    #[default]
    Disconnected,
    /// Handshake in progress
    Connecting,
    /// Socket open, frames flowing
    Connected,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
        };
        f.write_str(name)
    }
}

/// Traffic counters for one manager
#[derive(Debug, Clone, Default, Serialize)]
pub struct ConnectionStats {
    /// Successful connects, including reconnects
    pub connections: u64,
    pub messages_received: u64,
    pub video_frames_received: u64,
    pub audio_frames_received: u64,
    /// Malformed text, empty or unknown-tag binary frames
    pub frames_dropped: u64,
    pub messages_sent: u64,
    pub audio_frames_sent: u64,
    /// Start of the current connection
    pub connected_since: Option<DateTime<Utc>>,
}

// ─────────────────────────────────────────────────────────────────
// Shared State
// ─────────────────────────────────────────────────────────────────

/// State touched by both the public handle and the driver task
struct Shared {
    state: ConnectionState,
    registry: ObserverRegistry,
    reconnect: ReconnectStatus,
    stats: ConnectionStats,
    /// Set by teardown; nothing is delivered afterwards
    closed: bool,
}

impl Shared {
    fn new(reconnect: ReconnectStatus) -> Self {
        Self {
            state: ConnectionState::Disconnected,
            registry: ObserverRegistry::new(),
            reconnect,
            stats: ConnectionStats::default(),
            closed: false,
        }
    }

    fn is_live(&self, channel: Channel, id: SubscriptionId) -> bool {
        !self.closed && self.registry.contains(channel, id)
    }
}

// Handlers are snapshotted under the lock and invoked without it, so a
// handler may subscribe, unsubscribe, send or tear down. Membership is
// re-checked before each call so an unsubscribe takes effect immediately.

fn dispatch_message(shared: &RwLock<Shared>, message: &Value) {
    let handlers = {
        let s = shared.read();
        if s.closed {
            return;
        }
        s.registry.message_handlers()
    };

    for (id, handler) in handlers {
        if !shared.read().is_live(Channel::Message, id) {
            continue;
        }
        handler(message);
    }
}

fn dispatch_frame(shared: &RwLock<Shared>, channel: Channel, payload: &[u8]) {
    let handlers = {
        let s = shared.read();
        if s.closed {
            return;
        }
        s.registry.frame_handlers(channel)
    };

    for (id, handler) in handlers {
        if !shared.read().is_live(channel, id) {
            continue;
        }
        handler(payload);
    }
}

fn dispatch_events(shared: &RwLock<Shared>, channel: Channel, handlers: Vec<(SubscriptionId, EventHandler)>) {
    for (id, handler) in handlers {
        if !shared.read().is_live(channel, id) {
            continue;
        }
        handler();
    }
}

// ─────────────────────────────────────────────────────────────────
// Subscription
// ─────────────────────────────────────────────────────────────────

/// Token returned by every `on_*` registration.
///
/// Dropping the token leaves the handler registered; call
/// [`Subscription::unsubscribe`] to remove it.
pub struct Subscription {
    channel: Channel,
    id: SubscriptionId,
    shared: Weak<RwLock<Shared>>,
}

impl Subscription {
    pub fn channel(&self) -> Channel {
        self.channel
    }

    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    /// Remove exactly this handler. Returns false if it was already removed
    /// (including by teardown).
    pub fn unsubscribe(self) -> bool {
        match self.shared.upgrade() {
            Some(shared) => shared.write().registry.remove(self.channel, self.id),
            None => false,
        }
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("channel", &self.channel)
            .field("id", &self.id)
            .finish()
    }
}

// ─────────────────────────────────────────────────────────────────
// Connection Manager
// ─────────────────────────────────────────────────────────────────

/// Handle to one multiplexed WebSocket connection
pub struct ConnectionManager {
    endpoint: Url,
    shared: Arc<RwLock<Shared>>,
    outbound_tx: mpsc::UnboundedSender<OutboundFrame>,
    shutdown_tx: watch::Sender<bool>,
    driver: Mutex<Option<JoinHandle<()>>>,
}

impl ConnectionManager {
    /// Create the manager and start connecting in the background.
    ///
    /// Must be called from within a tokio runtime. Returns immediately;
    /// observe the connection through [`ConnectionManager::on_connect`].
    pub fn new(config: ConnectionConfig) -> Result<Self> {
        let endpoint = parse_endpoint(&config.url)?;
        config.reconnect.validate()?;
        if config.connect_timeout.is_zero() {
            return Err(Error::Config(
                "connect timeout must be greater than 0".to_string(),
            ));
        }
        let runtime = tokio::runtime::Handle::try_current().map_err(|e| {
            Error::Internal(format!("Connection manager requires a tokio runtime: {}", e))
        })?;

        let backoff = ReconnectBackoff::new(config.reconnect);
        let shared = Arc::new(RwLock::new(Shared::new(backoff.status())));
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let driver = Driver {
            endpoint: endpoint.clone(),
            connect_timeout: config.connect_timeout,
            shared: shared.clone(),
            outbound_rx,
            shutdown_rx,
            backoff,
        };
        let handle = runtime.spawn(driver.run());

        debug!(url = %endpoint, "Connection manager started");

        Ok(Self {
            endpoint,
            shared,
            outbound_tx,
            shutdown_tx,
            driver: Mutex::new(Some(handle)),
        })
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    pub fn state(&self) -> ConnectionState {
        self.shared.read().state
    }

    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    pub fn reconnect_status(&self) -> ReconnectStatus {
        self.shared.read().reconnect
    }

    pub fn stats(&self) -> ConnectionStats {
        self.shared.read().stats.clone()
    }

    pub fn subscriber_count(&self, channel: Channel) -> usize {
        self.shared.read().registry.len(channel)
    }

    // ─────────────────────────────────────────────────────────────
    // Outbound
    // ─────────────────────────────────────────────────────────────

    /// Send a JSON control message.
    ///
    /// Returns `Ok(false)` and logs a warning when not connected; the message
    /// is dropped, not queued. Errors only if the message cannot be serialized.
    pub fn send_message<T: Serialize + ?Sized>(&self, message: &T) -> Result<bool> {
        if !self.is_connected() {
            warn!(url = %self.endpoint, "Cannot send message: not connected");
            return Ok(false);
        }

        let frame = OutboundFrame::control(message)?;
        Ok(self.outbound_tx.send(frame).is_ok())
    }

    /// Send mono `f32` samples as one audio frame.
    ///
    /// Silently dropped when not connected; returns whether it was queued.
    pub fn send_audio(&self, samples: &[f32]) -> bool {
        if !self.is_connected() {
            return false;
        }

        self.outbound_tx.send(OutboundFrame::audio(samples)).is_ok()
    }

    // ─────────────────────────────────────────────────────────────
    // Subscriptions
    // ─────────────────────────────────────────────────────────────

    /// Receive every parsed JSON control message
    pub fn on_message<F>(&self, handler: F) -> Subscription
    where
        F: Fn(&Value) + Send + Sync + 'static,
    {
        let handler: MessageHandler = Arc::new(handler);
        let id = self.shared.write().registry.add_message(handler);
        self.subscription(Channel::Message, id)
    }

    /// Receive video frame payloads (image bytes, tag stripped)
    pub fn on_video_frame<F>(&self, handler: F) -> Subscription
    where
        F: Fn(&[u8]) + Send + Sync + 'static,
    {
        let handler: FrameHandler = Arc::new(handler);
        let id = self.shared.write().registry.add_video_frame(handler);
        self.subscription(Channel::VideoFrame, id)
    }

    /// Receive audio payloads (little-endian i16 PCM, tag stripped)
    pub fn on_audio<F>(&self, handler: F) -> Subscription
    where
        F: Fn(&[u8]) + Send + Sync + 'static,
    {
        let handler: FrameHandler = Arc::new(handler);
        let id = self.shared.write().registry.add_audio(handler);
        self.subscription(Channel::Audio, id)
    }

    /// Be notified on every successful connect.
    ///
    /// If already connected, the handler also runs once right away, before
    /// this method returns.
    pub fn on_connect<F>(&self, handler: F) -> Subscription
    where
        F: Fn() + Send + Sync + 'static,
    {
        let handler: EventHandler = Arc::new(handler);
        let (id, connected) = {
            let mut shared = self.shared.write();
            let id = shared.registry.add_connect(handler.clone());
            let connected = !shared.closed && shared.state == ConnectionState::Connected;
            (id, connected)
        };

        if connected {
            handler();
        }

        self.subscription(Channel::Connect, id)
    }

    /// Be notified whenever a connection closes or a connect attempt fails
    pub fn on_disconnect<F>(&self, handler: F) -> Subscription
    where
        F: Fn() + Send + Sync + 'static,
    {
        let handler: EventHandler = Arc::new(handler);
        let id = self.shared.write().registry.add_disconnect(handler);
        self.subscription(Channel::Disconnect, id)
    }

    fn subscription(&self, channel: Channel, id: SubscriptionId) -> Subscription {
        trace!(channel = %channel, id = id.as_u64(), "Subscribed");
        Subscription {
            channel,
            id,
            shared: Arc::downgrade(&self.shared),
        }
    }

    // ─────────────────────────────────────────────────────────────
    // Teardown
    // ─────────────────────────────────────────────────────────────

    /// Close the socket, clear every subscriber and stop reconnecting.
    ///
    /// No callback fires after this returns, even for frames already in
    /// flight. Calling it again is a no-op.
    pub fn disconnect(&self) {
        let was_open = {
            let mut shared = self.shared.write();
            let was_open = !shared.closed;
            shared.closed = true;
            shared.state = ConnectionState::Disconnected;
            shared.stats.connected_since = None;
            shared.registry.clear();
            was_open
        };

        // Fails only when the driver has already exited
        let _ = self.shutdown_tx.send(true);

        if was_open {
            info!(url = %self.endpoint, "Connection manager shut down");
        }
    }

    /// Wait until the driver task has exited, after teardown or once
    /// reconnection gives up.
    pub async fn wait_stopped(&self) {
        let handle = self.driver.lock().take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                warn!(error = %e, "Connection driver task failed");
            }
        }
    }

    /// Whether the driver is still connecting, connected or waiting to retry
    pub fn is_running(&self) -> bool {
        self.driver
            .lock()
            .as_ref()
            .map(|handle| !handle.is_finished())
            .unwrap_or(false)
    }
}

impl Drop for ConnectionManager {
    fn drop(&mut self) {
        self.disconnect();
    }
}

impl fmt::Debug for ConnectionManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionManager")
            .field("endpoint", &self.endpoint.as_str())
            .field("state", &self.state())
            .finish()
    }
}

/// Accept only ws:// and wss:// URLs
fn parse_endpoint(url: &str) -> Result<Url> {
    let endpoint = Url::parse(url).map_err(|e| Error::invalid_endpoint(url, e.to_string()))?;
    match endpoint.scheme() {
        "ws" | "wss" => Ok(endpoint),
        other => Err(Error::invalid_endpoint(
            url,
            format!("unsupported scheme '{}'", other),
        )),
    }
}

// ─────────────────────────────────────────────────────────────────
// Driver Task
// ─────────────────────────────────────────────────────────────────

/// How a connected session ended
enum SessionEnd {
    /// Peer closed or transport failed; reconnect
    Closed,
    /// Teardown requested; stop for good
    Shutdown,
}

/// Owns the socket and the reconnect timer
struct Driver {
    endpoint: Url,
    connect_timeout: Duration,
    shared: Arc<RwLock<Shared>>,
    outbound_rx: mpsc::UnboundedReceiver<OutboundFrame>,
    shutdown_rx: watch::Receiver<bool>,
    backoff: ReconnectBackoff,
}

impl Driver {
    /// Connect, serve, and reconnect until teardown or exhaustion
    async fn run(mut self) {
        loop {
            if *self.shutdown_rx.borrow() {
                break;
            }

            self.set_state(ConnectionState::Connecting);
            info!(url = %self.endpoint, "Connecting to server");

            let attempt = tokio::select! {
                biased;
                _ = self.shutdown_rx.changed() => break,
                result = tokio::time::timeout(
                    self.connect_timeout,
                    connect_async(self.endpoint.as_str()),
                ) => result,
            };

            match attempt {
                Ok(Ok((ws_stream, _response))) => {
                    if let SessionEnd::Shutdown = self.run_session(ws_stream).await {
                        break;
                    }
                }
                Ok(Err(e)) => {
                    warn!(url = %self.endpoint, error = %e, "Failed to connect");
                    if !self.report_disconnect() {
                        break;
                    }
                }
                Err(_) => {
                    warn!(
                        url = %self.endpoint,
                        timeout_ms = self.connect_timeout.as_millis() as u64,
                        "Connection attempt timed out"
                    );
                    if !self.report_disconnect() {
                        break;
                    }
                }
            }

            self.discard_stale_outbound();

            let delay = self.backoff.next_delay();
            self.shared.write().reconnect = self.backoff.status();

            let Some(delay) = delay else {
                error!(
                    url = %self.endpoint,
                    attempts = self.backoff.attempts(),
                    "Max reconnection attempts reached, giving up"
                );
                break;
            };

            info!(
                attempt = self.backoff.attempts(),
                max = self.backoff.policy().max_attempts,
                delay_ms = delay.as_millis() as u64,
                "Attempting reconnect"
            );

            tokio::select! {
                biased;
                _ = self.shutdown_rx.changed() => break,
                _ = tokio::time::sleep(delay) => {}
            }
        }

        self.set_state(ConnectionState::Disconnected);
        debug!(url = %self.endpoint, "Connection driver stopped");
    }

    /// Serve one open socket until it closes
    async fn run_session<T>(&mut self, ws_stream: T) -> SessionEnd
    where
        T: Stream<Item = std::result::Result<WsMessage, WsError>>
            + Sink<WsMessage, Error = WsError>
            + Unpin,
    {
        let connect_handlers = {
            let mut shared = self.shared.write();
            if shared.closed {
                return SessionEnd::Shutdown;
            }
            self.backoff.reset();
            shared.state = ConnectionState::Connected;
            shared.reconnect = self.backoff.status();
            shared.stats.connections += 1;
            shared.stats.connected_since = Some(Utc::now());
            shared.registry.event_handlers(Channel::Connect)
        };

        info!(url = %self.endpoint, "WebSocket connected");
        dispatch_events(&self.shared, Channel::Connect, connect_handlers);

        let (mut write, mut read) = ws_stream.split();
        let end = self.pump(&mut write, &mut read).await;

        if let SessionEnd::Shutdown = end {
            let _ = tokio::time::timeout(CLOSE_TIMEOUT, write.send(WsMessage::Close(None))).await;
            return end;
        }

        info!(url = %self.endpoint, "WebSocket disconnected");
        if !self.report_disconnect() {
            return SessionEnd::Shutdown;
        }

        end
    }

    /// Move to DISCONNECTED and notify disconnect subscribers.
    ///
    /// Returns false once teardown has begun; nothing is dispatched then.
    fn report_disconnect(&self) -> bool {
        let handlers = {
            let mut shared = self.shared.write();
            if shared.closed {
                return false;
            }
            shared.state = ConnectionState::Disconnected;
            shared.stats.connected_since = None;
            shared.registry.event_handlers(Channel::Disconnect)
        };

        dispatch_events(&self.shared, Channel::Disconnect, handlers);
        true
    }

    /// Move frames in both directions until the socket closes or teardown
    async fn pump<S, R>(&mut self, write: &mut S, read: &mut R) -> SessionEnd
    where
        S: Sink<WsMessage, Error = WsError> + Unpin,
        R: Stream<Item = std::result::Result<WsMessage, WsError>> + Unpin,
    {
        loop {
            tokio::select! {
                biased;

                _ = self.shutdown_rx.changed() => {
                    return SessionEnd::Shutdown;
                }

                // Incoming frame from the server
                msg = read.next() => {
                    match msg {
                        Some(Ok(WsMessage::Text(text))) => self.handle_text(&text),
                        Some(Ok(WsMessage::Binary(data))) => self.handle_binary(&data),
                        Some(Ok(WsMessage::Ping(data))) => {
                            if let Err(e) = write.send(WsMessage::Pong(data)).await {
                                warn!(error = %e, "Failed to answer ping");
                                return SessionEnd::Closed;
                            }
                        }
                        Some(Ok(WsMessage::Close(frame))) => {
                            info!(frame = ?frame, "Received close frame");
                            return SessionEnd::Closed;
                        }
                        Some(Ok(_)) => {}
                        Some(Err(e)) => {
                            warn!(error = %e, "WebSocket error");
                            return SessionEnd::Closed;
                        }
                        None => {
                            info!("WebSocket stream ended");
                            return SessionEnd::Closed;
                        }
                    }
                }

                // Outbound frame from the application
                frame = self.outbound_rx.recv() => {
                    let Some(frame) = frame else {
                        return SessionEnd::Shutdown;
                    };

                    let is_control = matches!(frame, OutboundFrame::Text(_));
                    if let Err(e) = write.send(frame.into_message()).await {
                        warn!(error = %e, "Failed to send frame");
                        return SessionEnd::Closed;
                    }

                    let mut shared = self.shared.write();
                    if is_control {
                        shared.stats.messages_sent += 1;
                    } else {
                        shared.stats.audio_frames_sent += 1;
                    }
                }
            }
        }
    }

    fn handle_text(&self, text: &str) {
        match decode_text(text) {
            Ok(message) => {
                self.shared.write().stats.messages_received += 1;
                dispatch_message(&self.shared, &message);
            }
            Err(e) => {
                self.shared.write().stats.frames_dropped += 1;
                warn!(error = %e, len = text.len(), "Dropping malformed control message");
            }
        }
    }

    fn handle_binary(&self, data: &[u8]) {
        match decode_binary(data) {
            Ok(InboundFrame::Video(payload)) => {
                self.shared.write().stats.video_frames_received += 1;
                dispatch_frame(&self.shared, Channel::VideoFrame, payload);
            }
            Ok(InboundFrame::Audio(payload)) => {
                self.shared.write().stats.audio_frames_received += 1;
                dispatch_frame(&self.shared, Channel::Audio, payload);
            }
            Err(e) => {
                self.shared.write().stats.frames_dropped += 1;
                trace!(error = %e, len = data.len(), "Dropping binary frame");
            }
        }
    }

    /// Frames queued for a socket that has since closed are never replayed
    fn discard_stale_outbound(&mut self) {
        let mut discarded = 0usize;
        while self.outbound_rx.try_recv().is_ok() {
            discarded += 1;
        }
        if discarded > 0 {
            debug!(discarded, "Discarded frames queued for closed connection");
        }
    }

    fn set_state(&self, state: ConnectionState) {
        let mut shared = self.shared.write();
        if !shared.closed {
            shared.state = state;
        }
    }
}

// ─────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────
