//! Feed Connection Supervisor
//!
//! Owns the single WebSocket connection to the Polygon stocks stream.
//!
//! # Lifecycle
//!
//! ```text
//! Disconnected -> Connecting -> Authenticating -> Live
//!                     ^               |             |
//!                     |               v             v
//!                     +-------- Reconnecting <------+
//! ```
//!
//! Each connection authenticates first and only then becomes `Live`. On
//! reaching `Live` the supervisor discards any subscription deltas queued
//! for earlier connections and replays a snapshot of the registry in one
//! subscribe request. While `Live`, registry changes are forwarded as
//! deltas. Every disconnect is followed by a backoff delay and a fresh
//! connection until `shutdown` is called.
//!
//! # Stream URL
//!
//! - Delayed: `wss://delayed.polygon.io/stocks`
//! - Real-time: `wss://socket.polygon.io/stocks`

use std::sync::Arc;
use std::time::Duration;

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use serde::Serialize;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;

use super::auth::{AuthError, AuthHandler, AuthProgress, Credentials};
use super::codec::{CodecError, FeedCodec, FeedEvent};
use super::dispatcher::FrameDispatcher;
use super::heartbeat::{HeartbeatConfig, Liveness};
use super::messages::ControlRequest;
use super::reconnect::{ReconnectConfig, ReconnectPolicy};
use crate::domain::subscription::{SubscriptionRegistry, Symbol};
use crate::infrastructure::metrics;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsWrite = SplitSink<WsStream, Message>;
type WsRead = SplitStream<WsStream>;

/// How long `shutdown` waits for the connection task to exit.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

// =============================================================================
// Error Type
// =============================================================================

/// Errors that end a single connection attempt.
#[derive(Debug, thiserror::Error)]
pub enum FeedError {
    /// WebSocket transport error.
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    /// The TCP/TLS/upgrade handshake did not finish in time.
    #[error("connect timed out after {0:?}")]
    ConnectTimeout(Duration),

    /// Authentication failed.
    #[error("authentication failed: {0}")]
    Auth(#[from] AuthError),

    /// A frame could not be decoded during the handshake.
    #[error("codec error: {0}")]
    Codec(#[from] CodecError),

    /// No inbound traffic within the heartbeat timeout.
    #[error("heartbeat timeout after {0:?} of silence")]
    HeartbeatTimeout(Duration),

    /// The server closed the connection.
    #[error("connection closed")]
    ConnectionClosed,

    /// Reconnect budget exhausted.
    #[error("maximum reconnection attempts ({0}) exceeded")]
    MaxReconnectAttemptsExceeded(u32),
}

impl FeedError {
    /// Short label for metrics.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::WebSocket(_) => "websocket",
            Self::ConnectTimeout(_) => "connect_timeout",
            Self::Auth(AuthError::Timeout(_)) => "auth_timeout",
            Self::Auth(_) => "auth",
            Self::Codec(_) => "codec",
            Self::HeartbeatTimeout(_) => "heartbeat",
            Self::ConnectionClosed => "closed",
            Self::MaxReconnectAttemptsExceeded(_) => "max_attempts",
        }
    }
}

// =============================================================================
// Connection State
// =============================================================================

/// Externally observable connection state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    /// No connection and none being attempted.
    #[default]
    Disconnected,
    /// Opening the socket.
    Connecting,
    /// Socket open, waiting for the auth acknowledgment.
    Authenticating,
    /// Authenticated and subscribed; frames are being dispatched.
    Live,
    /// Waiting out the backoff delay before the next attempt.
    Reconnecting,
}

impl ConnectionState {
    /// String form.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Authenticating => "authenticating",
            Self::Live => "live",
            Self::Reconnecting => "reconnecting",
        }
    }

    /// Whether frames are flowing.
    #[must_use]
    pub const fn is_live(&self) -> bool {
        matches!(self, Self::Live)
    }
}

// =============================================================================
// Configuration
// =============================================================================

/// Connection configuration.
#[derive(Debug, Clone)]
pub struct FeedConfig {
    /// WebSocket URL.
    pub url: String,
    /// API key.
    pub credentials: Credentials,
    /// Channel prefix for subscriptions (`A` or `AM`).
    pub channel: String,
    /// Bound on socket open + upgrade.
    pub connect_timeout: Duration,
    /// Bound on waiting for the auth acknowledgment.
    pub auth_timeout: Duration,
    /// Ping cadence and silence limit.
    pub heartbeat: HeartbeatConfig,
    /// Backoff between attempts.
    pub reconnect: ReconnectConfig,
}

impl FeedConfig {
    /// Delayed stocks feed.
    pub const DELAYED_STOCKS_URL: &'static str = "wss://delayed.polygon.io/stocks";

    /// Create a configuration with default timeouts.
    #[must_use]
    pub fn new(url: impl Into<String>, credentials: Credentials) -> Self {
        Self {
            url: url.into(),
            credentials,
            channel: "A".to_string(),
            connect_timeout: Duration::from_secs(10),
            auth_timeout: Duration::from_secs(10),
            heartbeat: HeartbeatConfig::default(),
            reconnect: ReconnectConfig::default(),
        }
    }
}

// =============================================================================
// Supervisor
// =============================================================================

#[derive(Debug)]
enum Command {
    Subscribe(Vec<Symbol>),
    Unsubscribe(Vec<Symbol>),
}

#[derive(Debug)]
struct RunHandle {
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

/// Supervises the feed connection and keeps it in sync with the registry.
pub struct FeedSupervisor {
    config: FeedConfig,
    codec: FeedCodec,
    registry: Arc<SubscriptionRegistry>,
    dispatcher: Arc<FrameDispatcher>,
    state: watch::Sender<ConnectionState>,
    commands_tx: mpsc::UnboundedSender<Command>,
    commands_rx: tokio::sync::Mutex<mpsc::UnboundedReceiver<Command>>,
    run: Mutex<Option<RunHandle>>,
    shutdown: CancellationToken,
}

impl std::fmt::Debug for FeedSupervisor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FeedSupervisor")
            .field("url", &self.config.url)
            .field("state", &self.state())
            .field("symbols", &self.registry.len())
            .finish_non_exhaustive()
    }
}

impl FeedSupervisor {
    /// Create a supervisor. Nothing connects until [`connect`](Self::connect).
    ///
    /// Cancelling `shutdown` stops any running connection loop.
    #[must_use]
    pub fn new(
        config: FeedConfig,
        registry: Arc<SubscriptionRegistry>,
        dispatcher: Arc<FrameDispatcher>,
        shutdown: CancellationToken,
    ) -> Self {
        let (state, _) = watch::channel(ConnectionState::Disconnected);
        let (commands_tx, commands_rx) = mpsc::unbounded_channel();
        Self {
            config,
            codec: FeedCodec::new(),
            registry,
            dispatcher,
            state,
            commands_tx,
            commands_rx: tokio::sync::Mutex::new(commands_rx),
            run: Mutex::new(None),
            shutdown,
        }
    }

    /// Start the connection loop.
    ///
    /// Returns `false` without doing anything if a loop is already running.
    pub fn connect(self: &Arc<Self>) -> bool {
        let mut run = self.run.lock();
        if run.as_ref().is_some_and(|r| !r.task.is_finished()) {
            return false;
        }

        let cancel = self.shutdown.child_token();
        let this = Arc::clone(self);
        let task_cancel = cancel.clone();
        let task = tokio::spawn(async move {
            if let Err(e) = this.run_loop(&task_cancel).await {
                tracing::error!(error = %e, "Feed supervisor stopped");
            }
        });

        *run = Some(RunHandle { cancel, task });
        true
    }

    /// Stop the connection loop and wait for it to exit.
    ///
    /// The registry is left intact so a later `connect` resumes the same
    /// subscriptions.
    pub async fn shutdown(&self) {
        let handle = self.run.lock().take();
        if let Some(RunHandle { cancel, task }) = handle {
            cancel.cancel();
            match tokio::time::timeout(SHUTDOWN_GRACE, task).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => tracing::error!(error = %e, "Feed task panicked"),
                Err(_) => tracing::warn!(
                    grace_secs = SHUTDOWN_GRACE.as_secs(),
                    "Feed task did not stop in time"
                ),
            }
        }
        self.set_state(ConnectionState::Disconnected);
        tracing::info!("Feed supervisor shut down");
    }

    /// Add symbols to the registry, forwarding a delta if live.
    ///
    /// Returns the symbols that were newly added.
    pub fn subscribe<I, S>(&self, symbols: I) -> Vec<Symbol>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let added = self.registry.add(symbols);
        metrics::set_subscriptions(self.registry.len());
        if !added.is_empty() && self.state().is_live() {
            self.send_command(Command::Subscribe(added.clone()));
        }
        added
    }

    /// Remove symbols from the registry, forwarding a delta if live.
    ///
    /// Returns the symbols that were present and removed.
    pub fn unsubscribe<I, S>(&self, symbols: I) -> Vec<Symbol>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let removed = self.registry.remove(symbols);
        metrics::set_subscriptions(self.registry.len());
        if !removed.is_empty() && self.state().is_live() {
            self.send_command(Command::Unsubscribe(removed.clone()));
        }
        removed
    }

    /// Current subscription set, sorted.
    #[must_use]
    pub fn subscriptions(&self) -> Vec<Symbol> {
        self.registry.snapshot()
    }

    /// Current connection state.
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    /// Watch connection state transitions.
    #[must_use]
    pub fn state_watch(&self) -> watch::Receiver<ConnectionState> {
        self.state.subscribe()
    }

    /// Whether a connection loop is running.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.run
            .lock()
            .as_ref()
            .is_some_and(|r| !r.task.is_finished())
    }

    fn send_command(&self, command: Command) {
        if self.commands_tx.send(command).is_err() {
            tracing::warn!("Feed command channel closed");
        }
    }

    fn set_state(&self, state: ConnectionState) {
        let previous = self.state.send_replace(state);
        if previous != state {
            tracing::debug!(
                from = previous.as_str(),
                to = state.as_str(),
                "Feed state changed"
            );
            metrics::set_feed_live(state.is_live());
        }
    }

    // -------------------------------------------------------------------------
    // Connection loop
    // -------------------------------------------------------------------------

    async fn run_loop(&self, cancel: &CancellationToken) -> Result<(), FeedError> {
        let mut policy = ReconnectPolicy::new(self.config.reconnect.clone());

        loop {
            if cancel.is_cancelled() {
                break;
            }

            match self.connect_and_run(cancel, &mut policy).await {
                Ok(()) => break,
                Err(e) => {
                    metrics::record_feed_error(e.kind());
                    tracing::warn!(error = %e, "Feed connection lost");

                    if cancel.is_cancelled() {
                        break;
                    }

                    self.set_state(ConnectionState::Reconnecting);
                    let Some(delay) = policy.next_delay() else {
                        self.set_state(ConnectionState::Disconnected);
                        return Err(FeedError::MaxReconnectAttemptsExceeded(
                            policy.attempt_count(),
                        ));
                    };

                    metrics::record_reconnect();
                    tracing::info!(
                        attempt = policy.attempt_count(),
                        delay_ms = delay.as_millis(),
                        "Reconnecting to feed"
                    );

                    tokio::select! {
                        () = cancel.cancelled() => break,
                        () = tokio::time::sleep(delay) => {}
                    }
                }
            }
        }

        self.set_state(ConnectionState::Disconnected);
        tracing::info!("Feed connection loop stopped");
        Ok(())
    }

    /// One connection from socket open to close. `Ok(())` means cancelled.
    async fn connect_and_run(
        &self,
        cancel: &CancellationToken,
        policy: &mut ReconnectPolicy,
    ) -> Result<(), FeedError> {
        self.set_state(ConnectionState::Connecting);
        tracing::info!(url = %self.config.url, "Connecting to feed");

        let connect = tokio::time::timeout(
            self.config.connect_timeout,
            tokio_tungstenite::connect_async(self.config.url.as_str()),
        );
        let (ws, _response) = tokio::select! {
            () = cancel.cancelled() => return Ok(()),
            result = connect => result
                .map_err(|_| FeedError::ConnectTimeout(self.config.connect_timeout))??,
        };
        let (mut write, mut read) = ws.split();

        self.set_state(ConnectionState::Authenticating);
        let auth = tokio::time::timeout(
            self.config.auth_timeout,
            self.authenticate(&mut write, &mut read),
        );
        tokio::select! {
            () = cancel.cancelled() => return Ok(()),
            result = auth => result
                .map_err(|_| AuthError::Timeout(self.config.auth_timeout))??,
        }
        policy.reset();

        let mut commands = self.commands_rx.lock().await;
        self.go_live(&mut write, &mut commands).await?;
        self.pump(&mut write, &mut read, &mut commands, cancel).await
    }

    async fn authenticate(&self, write: &mut WsWrite, read: &mut WsRead) -> Result<(), FeedError> {
        let mut auth = AuthHandler::new(self.config.credentials.clone());
        let request = auth.create_auth_request();
        self.send_control(write, &request).await?;

        loop {
            let text = match read.next().await {
                Some(Ok(Message::Text(text))) => text,
                Some(Ok(Message::Ping(data))) => {
                    write.send(Message::Pong(data)).await?;
                    continue;
                }
                Some(Ok(Message::Close(_))) | None => return Err(FeedError::ConnectionClosed),
                Some(Ok(_)) => continue,
                Some(Err(e)) => return Err(e.into()),
            };

            for event in self.codec.decode(&text)? {
                match event {
                    FeedEvent::Status(status) => {
                        if auth.on_status(&status)? == AuthProgress::Authenticated {
                            tracing::info!("Feed authenticated");
                            return Ok(());
                        }
                        tracing::debug!(
                            status = %status.status,
                            auth_state = ?auth.state(),
                            "Handshake status"
                        );
                    }
                    other => {
                        tracing::debug!(kind = other.kind(), "Ignoring event before auth");
                    }
                }
            }
        }
    }

    async fn go_live(
        &self,
        write: &mut WsWrite,
        commands: &mut mpsc::UnboundedReceiver<Command>,
    ) -> Result<(), FeedError> {
        self.set_state(ConnectionState::Live);

        // Deltas queued before this point are covered by the snapshot.
        let mut stale = 0_usize;
        while commands.try_recv().is_ok() {
            stale += 1;
        }

        let snapshot = self.registry.snapshot();
        metrics::set_subscriptions(snapshot.len());
        match ControlRequest::subscribe(&self.config.channel, &snapshot) {
            Some(request) => {
                self.send_control(write, &request).await?;
                tracing::info!(
                    symbols = snapshot.len(),
                    discarded_deltas = stale,
                    "Feed live, subscriptions replayed"
                );
            }
            None => tracing::info!("Feed live with no subscriptions"),
        }
        Ok(())
    }

    async fn pump(
        &self,
        write: &mut WsWrite,
        read: &mut WsRead,
        commands: &mut mpsc::UnboundedReceiver<Command>,
        cancel: &CancellationToken,
    ) -> Result<(), FeedError> {
        let heartbeat = &self.config.heartbeat;
        let period = heartbeat.ping_period();
        let mut ping = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
        ping.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut liveness = Liveness::new();

        loop {
            tokio::select! {
                () = cancel.cancelled() => {
                    let _ = write.send(Message::Close(None)).await;
                    return Ok(());
                }
                Some(command) = commands.recv() => {
                    self.apply_command(write, command).await?;
                }
                _ = ping.tick() => {
                    if liveness.is_stale(heartbeat.timeout) {
                        return Err(FeedError::HeartbeatTimeout(liveness.silence()));
                    }
                    write.send(Message::Ping(Vec::new().into())).await?;
                }
                message = read.next() => match message {
                    Some(Ok(Message::Text(text))) => {
                        liveness.touch();
                        self.handle_text(&text).await;
                    }
                    Some(Ok(Message::Ping(data))) => {
                        liveness.touch();
                        write.send(Message::Pong(data)).await?;
                    }
                    Some(Ok(Message::Close(frame))) => {
                        tracing::info!(?frame, "Server sent close frame");
                        return Err(FeedError::ConnectionClosed);
                    }
                    Some(Ok(_)) => liveness.touch(),
                    Some(Err(e)) => return Err(e.into()),
                    None => return Err(FeedError::ConnectionClosed),
                },
            }
        }
    }

    async fn handle_text(&self, text: &str) {
        match self.codec.decode(text) {
            Ok(events) => {
                let summary = self.dispatcher.dispatch(events).await;
                tracing::trace!(?summary, "Frame dispatched");
            }
            Err(e) => {
                metrics::record_frame(metrics::FrameKind::Malformed);
                tracing::warn!(error = %e, "Skipping undecodable frame");
            }
        }
    }

    async fn apply_command(&self, write: &mut WsWrite, command: Command) -> Result<(), FeedError> {
        let channel = &self.config.channel;
        let request = match &command {
            Command::Subscribe(symbols) => ControlRequest::subscribe(channel, symbols),
            Command::Unsubscribe(symbols) => ControlRequest::unsubscribe(channel, symbols),
        };
        if let Some(request) = request {
            self.send_control(write, &request).await?;
            tracing::debug!(?command, "Sent subscription delta");
        }
        Ok(())
    }

    async fn send_control(
        &self,
        write: &mut WsWrite,
        request: &ControlRequest,
    ) -> Result<(), FeedError> {
        let json = self.codec.encode(request)?;
        write.send(Message::Text(json.into())).await?;
        Ok(())
    }
}

// =============================================================================
// Tests
// =============================================================================
