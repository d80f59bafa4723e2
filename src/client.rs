//! Connection manager for the game engine.
//!
//! [`GameClient`] owns the lifecycle of one connection at a time:
//! `start` opens a transport through a [`Connector`], sends the single
//! `start_game` command and spawns a background session loop. The loop reads
//! engine messages one at a time, reduces them into a fresh
//! [`GameStateStore`] and reports each step on a bounded event channel
//! ([`tokio::sync::mpsc::Receiver<ClientEvent>`]) returned from
//! [`GameClient::new`]. The channel outlives individual connections, so a
//! consumer keeps the same receiver across restarts.
//!
//! # Example
//!
//! ```rust,ignore
//! let connector = WebSocketConnector::new("ws://localhost:8000/ws");
//! let (mut client, mut events) = GameClient::new(connector, GameClientConfig::default());
//! client.start(None).await?;
//!
//! while let Some(event) = events.recv().await {
//!     present(&event, &mut my_sink);
//!     if let ClientEvent::Disconnected { .. } = event {
//!         break;
//!     }
//! }
//! ```

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot, watch, Mutex};
use tracing::{debug, error, info, warn, Instrument};
use uuid::Uuid;

use crate::dispatcher::EventDispatcher;
use crate::error::{Result, WerewolfError};
use crate::event::{ClientEvent, SessionId};
use crate::protocol::ClientMessage;
use crate::state::{Effect, GameSnapshot, GameStateStore};
use crate::transport::{Connector, Transport};

/// Default capacity of the bounded event channel.
const DEFAULT_EVENT_CHANNEL_CAPACITY: usize = 256;

/// Default timeout for the graceful shutdown.
const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(1);

// ── Configuration ───────────────────────────────────────────────────

/// Configuration for a [`GameClient`].
///
/// # Example
///
/// ```
/// use std::time::Duration;
/// use werewolf_client::client::GameClientConfig;
///
/// let config = GameClientConfig::new()
///     .with_event_channel_capacity(512)
///     .with_shutdown_timeout(Duration::from_secs(5));
/// assert_eq!(config.event_channel_capacity, 512);
/// ```
#[derive(Debug, Clone)]
pub struct GameClientConfig {
    /// Capacity of the bounded event channel.
    ///
    /// [`ClientEvent::Updated`] and the lifecycle events are always
    /// delivered: when the consumer falls behind, the session loop waits for
    /// room and stops reading from the engine meanwhile. Only
    /// [`ClientEvent::TransportError`] notices are dropped (with a warning)
    /// when the channel is full.
    ///
    /// Defaults to **256**. Values below 1 are clamped to 1.
    pub event_channel_capacity: usize,
    /// Time the session loop gets to close the transport on shutdown before
    /// the task is aborted.
    ///
    /// Defaults to **1 second**.
    pub shutdown_timeout: Duration,
    /// Receive errors in a row after which the client gives up on the
    /// connection and closes it.
    ///
    /// Defaults to `None`: errors are reported and never close the
    /// connection; only the engine closing it ends the session.
    pub max_consecutive_errors: Option<u32>,
}

impl Default for GameClientConfig {
    fn default() -> Self {
        Self {
            event_channel_capacity: DEFAULT_EVENT_CHANNEL_CAPACITY,
            shutdown_timeout: DEFAULT_SHUTDOWN_TIMEOUT,
            max_consecutive_errors: None,
        }
    }
}

impl GameClientConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the capacity of the bounded event channel (clamped to at least 1).
    #[must_use]
    pub fn with_event_channel_capacity(mut self, capacity: usize) -> Self {
        self.event_channel_capacity = capacity.max(1);
        self
    }

    /// Set the timeout for the graceful shutdown.
    #[must_use]
    pub fn with_shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }

    /// Close the connection after `max` receive errors in a row (at least 1).
    #[must_use]
    pub fn with_max_consecutive_errors(mut self, max: u32) -> Self {
        self.max_consecutive_errors = Some(max.max(1));
        self
    }
}

// ── Connection state ────────────────────────────────────────────────

/// Lifecycle of the connection to the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Open,
    Closing,
}

impl ConnectionState {
    fn from_u8(raw: u8) -> Self {
        match raw {
            1 => Self::Connecting,
            2 => Self::Open,
            3 => Self::Closing,
            _ => Self::Disconnected,
        }
    }

    fn as_u8(self) -> u8 {
        match self {
            Self::Disconnected => 0,
            Self::Connecting => 1,
            Self::Open => 2,
            Self::Closing => 3,
        }
    }
}

// ── Shared state ────────────────────────────────────────────────────

/// State shared between the client handle and the session loop.
struct Shared {
    connection: AtomicU8,
    session: Mutex<Option<SessionId>>,
    snapshot_tx: watch::Sender<Arc<GameSnapshot>>,
}

impl Shared {
    fn new() -> Self {
        let (snapshot_tx, _) = watch::channel(Arc::new(GameSnapshot::default()));
        Self {
            connection: AtomicU8::new(ConnectionState::Disconnected.as_u8()),
            session: Mutex::new(None),
            snapshot_tx,
        }
    }

    fn state(&self) -> ConnectionState {
        ConnectionState::from_u8(self.connection.load(Ordering::Acquire))
    }

    fn set_state(&self, state: ConnectionState) {
        self.connection.store(state.as_u8(), Ordering::Release);
    }

    /// Moves `from` → `to`; returns `false` if the state was not `from`.
    fn transition(&self, from: ConnectionState, to: ConnectionState) -> bool {
        self.connection
            .compare_exchange(from.as_u8(), to.as_u8(), Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    fn publish(&self, snapshot: Arc<GameSnapshot>) {
        self.snapshot_tx.send_replace(snapshot);
    }
}

// ── Client handle ───────────────────────────────────────────────────

/// Handle that drives connections to the game engine.
///
/// Lifecycle methods take `&mut self`, so at most one `start`, `restart` or
/// `shutdown` is ever in flight and at most one session loop exists.
pub struct GameClient<C: Connector> {
    connector: C,
    config: GameClientConfig,
    shared: Arc<Shared>,
    event_tx: mpsc::Sender<ClientEvent>,
    /// Credential of the most recent `start`, reused by `restart`.
    api_key: Option<String>,
    task: Option<tokio::task::JoinHandle<()>>,
    shutdown_tx: Option<oneshot::Sender<()>>,
}

impl<C: Connector> GameClient<C> {
    /// Create an idle client and the receiver for its events.
    ///
    /// No connection is opened until [`start`](Self::start).
    #[must_use = "the event receiver must be used to receive events"]
    pub fn new(connector: C, config: GameClientConfig) -> (Self, mpsc::Receiver<ClientEvent>) {
        // tokio panics on a zero capacity.
        let capacity = config.event_channel_capacity.max(1);
        let (event_tx, event_rx) = mpsc::channel::<ClientEvent>(capacity);
        let client = Self {
            connector,
            config,
            shared: Arc::new(Shared::new()),
            event_tx,
            api_key: None,
            task: None,
            shutdown_tx: None,
        };
        (client, event_rx)
    }

    /// Open a connection and ask the engine to start a game.
    ///
    /// Sends exactly one `{"action": "start_game", "api_key": ...}` command
    /// once the transport is open, then hands the transport to the session
    /// loop.
    ///
    /// # Errors
    ///
    /// - [`WerewolfError::AlreadyActive`] if a connection is connecting or open,
    ///   or is closing and does not finish within the shutdown timeout.
    ///   or closing.
    /// - Any connector error if the transport cannot be opened.
    /// - Any transport error if the start command cannot be sent; the
    ///   connection is closed again in that case.
    pub async fn start(&mut self, api_key: Option<String>) -> Result<()> {
        if !self.claim_connection().await {
            return Err(WerewolfError::AlreadyActive);
        }
        self.reap_previous_session().await;
        self.api_key.clone_from(&api_key);

        let command = match serde_json::to_string(&ClientMessage::StartGame { api_key }) {
            Ok(command) => command,
            Err(e) => {
                self.shared.set_state(ConnectionState::Disconnected);
                return Err(e.into());
            }
        };

        let mut transport = match self.connector.connect().await {
            Ok(transport) => transport,
            Err(e) => {
                error!("failed to connect to game engine: {e}");
                self.shared.set_state(ConnectionState::Disconnected);
                return Err(e);
            }
        };

        let session = Uuid::new_v4();
        *self.shared.session.lock().await = Some(session);
        self.shared.publish(Arc::new(GameSnapshot::default()));
        self.shared.set_state(ConnectionState::Open);
        info!(%session, "connected to game engine");
        send_event(&self.event_tx, ClientEvent::Connected { session }).await;

        if let Err(e) = transport.send(command).await {
            error!(%session, "failed to send start_game: {e}");
            if let Err(close_err) = transport.close().await {
                debug!(%session, "transport close failed: {close_err}");
            }
            self.shared.set_state(ConnectionState::Disconnected);
            send_event(
                &self.event_tx,
                ClientEvent::Disconnected {
                    reason: Some(format!("transport send error: {e}")),
                },
            )
            .await;
            return Err(e);
        }
        debug!(%session, "start_game sent");

        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        let task = tokio::spawn(
            session_loop(
                transport,
                EventDispatcher::new(GameStateStore::new()),
                self.event_tx.clone(),
                Arc::clone(&self.shared),
                shutdown_rx,
                self.config.max_consecutive_errors.map(|max| max.max(1)),
            )
            .instrument(tracing::info_span!("session", %session)),
        );
        self.task = Some(task);
        self.shutdown_tx = Some(shutdown_tx);
        Ok(())
    }

    /// Close any open connection, clear session state and start again with
    /// the credential of the previous [`start`](Self::start).
    ///
    /// Emits [`ClientEvent::Reset`] between the old session's
    /// `Disconnected` and the new session's `Connected`.
    ///
    /// # Errors
    ///
    /// Same as [`start`](Self::start).
    pub async fn restart(&mut self) -> Result<()> {
        debug!("restart requested");
        self.shutdown().await;
        *self.shared.session.lock().await = None;
        self.shared.publish(Arc::new(GameSnapshot::default()));
        send_event(&self.event_tx, ClientEvent::Reset).await;
        self.start(self.api_key.clone()).await
    }

    /// Close the connection, if any, and stop the session loop.
    ///
    /// The loop gets [`GameClientConfig::shutdown_timeout`] to close the
    /// transport and report `Disconnected`; after that it is aborted.
    pub async fn shutdown(&mut self) {
        let Some(mut task) = self.task.take() else {
            return;
        };
        debug!("shutdown requested");
        self.shared.transition(ConnectionState::Open, ConnectionState::Closing);

        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }

        match tokio::time::timeout(self.config.shutdown_timeout, &mut task).await {
            Ok(Ok(())) => {}
            Ok(Err(join_err)) => {
                warn!("session loop terminated with join error: {join_err}");
            }
            Err(_) => {
                warn!("session loop did not exit within timeout; aborting task");
                task.abort();
                if let Err(join_err) = task.await {
                    debug!("session loop aborted: {join_err}");
                }
                self.shared.set_state(ConnectionState::Disconnected);
                // The consumer may be the one not draining the channel.
                emit_event(
                    &self.event_tx,
                    ClientEvent::Disconnected {
                        reason: Some("session aborted".into()),
                    },
                );
            }
        }
        self.shared.set_state(ConnectionState::Disconnected);
    }

    // ── State accessors ─────────────────────────────────────────────

    pub fn connection_state(&self) -> ConnectionState {
        self.shared.state()
    }

    /// Returns `true` while the connection is open.
    pub fn is_connected(&self) -> bool {
        self.shared.state() == ConnectionState::Open
    }

    /// The latest snapshot of the current (or last) game.
    pub fn snapshot(&self) -> Arc<GameSnapshot> {
        Arc::clone(&self.shared.snapshot_tx.borrow())
    }

    /// A receiver that observes every published snapshot.
    pub fn subscribe(&self) -> watch::Receiver<Arc<GameSnapshot>> {
        self.shared.snapshot_tx.subscribe()
    }

    /// Identifier of the current session, if a connection was opened.
    pub async fn session_id(&self) -> Option<SessionId> {
        *self.shared.session.lock().await
    }

    // ── Internal helpers ────────────────────────────────────────────

    /// Moves the connection to `Connecting`.
    ///
    /// A session loop that is already winding down (it reported
    /// `Disconnected` and is about to publish the state) gets
    /// [`GameClientConfig::shutdown_timeout`] to finish first.
    async fn claim_connection(&mut self) -> bool {
        if self.try_claim() {
            return true;
        }
        if self.shared.state() != ConnectionState::Closing {
            return false;
        }
        let Some(task) = self.task.as_mut() else {
            return false;
        };
        if tokio::time::timeout(self.config.shutdown_timeout, task)
            .await
            .is_err()
        {
            return false;
        }
        self.task = None;
        self.shutdown_tx = None;
        self.try_claim()
    }

    fn try_claim(&self) -> bool {
        self.shared
            .transition(ConnectionState::Disconnected, ConnectionState::Connecting)
    }

    /// Waits for a session loop that ended on its own to finish reporting.
    async fn reap_previous_session(&mut self) {
        self.shutdown_tx = None;
        let Some(mut task) = self.task.take() else {
            return;
        };
        if tokio::time::timeout(self.config.shutdown_timeout, &mut task)
            .await
            .is_err()
        {
            warn!("previous session loop still running; aborting it");
            task.abort();
        }
    }
}

impl<C: Connector> std::fmt::Debug for GameClient<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GameClient")
            .field("connection", &self.connection_state())
            .field("has_task", &self.task.is_some())
            .finish()
    }
}

impl<C: Connector> Drop for GameClient<C> {
    fn drop(&mut self) {
        // No executor to drive a graceful close from here.
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

// ── Session loop ────────────────────────────────────────────────────

/// Background loop for one connection.
///
/// Exits when:
/// - the shutdown signal fires (or its sender is dropped)
/// - the transport returns `None` (engine closed the connection)
/// - the game ends (`game_over` asks for the connection to close)
/// - `max_errors` receive errors arrive back to back, when a cap is set
///
/// Updates are delivered with backpressure: while the consumer lags the loop
/// stops reading, but a shutdown request still wins.
async fn session_loop(
    mut transport: impl Transport,
    mut dispatcher: EventDispatcher,
    event_tx: mpsc::Sender<ClientEvent>,
    shared: Arc<Shared>,
    mut shutdown_rx: oneshot::Receiver<()>,
    max_errors: Option<u32>,
) {
    debug!("session loop started");
    let mut consecutive_errors = 0u32;

    let reason = loop {
        tokio::select! {
            _ = &mut shutdown_rx => {
                break close_on_shutdown(&mut transport, &shared).await;
            }

            incoming = transport.recv() => {
                match incoming {
                    Some(Ok(text)) => {
                        consecutive_errors = 0;
                        let before = Arc::clone(dispatcher.store().snapshot());
                        let effects = match dispatcher.dispatch_text(&text) {
                            Ok(effects) => effects,
                            Err(e) => {
                                warn!("dropping undecodable message: {e}, raw: {text}");
                                continue;
                            }
                        };
                        let snapshot = Arc::clone(dispatcher.store().snapshot());
                        let changed = !Arc::ptr_eq(&before, &snapshot);
                        if changed {
                            shared.publish(Arc::clone(&snapshot));
                        }
                        let close = effects.contains(&Effect::CloseConnection);
                        if changed || !effects.is_empty() {
                            let update = ClientEvent::Updated { snapshot, effects };
                            tokio::select! {
                                _ = &mut shutdown_rx => {
                                    break close_on_shutdown(&mut transport, &shared).await;
                                }
                                () = send_event(&event_tx, update) => {}
                            }
                        }
                        if close {
                            info!("game over, closing connection");
                            shared.set_state(ConnectionState::Closing);
                            if let Err(e) = transport.close().await {
                                debug!("transport close failed: {e}");
                            }
                            break Some("game over".to_string());
                        }
                    }
                    Some(Err(e)) => {
                        consecutive_errors += 1;
                        error!("transport receive error: {e}");
                        let message = e.to_string();
                        emit_event(&event_tx, ClientEvent::TransportError { message });
                        if max_errors.is_some_and(|max| consecutive_errors >= max) {
                            error!(consecutive_errors, "too many transport errors, giving up");
                            shared.set_state(ConnectionState::Closing);
                            if let Err(close_err) = transport.close().await {
                                debug!("transport close failed: {close_err}");
                            }
                            break Some(format!("transport receive error: {e}"));
                        }
                    }
                    None => {
                        debug!("transport closed by engine");
                        break None;
                    }
                }
            }
        }
    };

    // `start` waits for `Disconnected` to be published before reconnecting,
    // so the event is never cut off by an abort.
    shared.set_state(ConnectionState::Closing);
    let shown_reason = reason.as_deref().unwrap_or("closed by engine");
    info!(reason = shown_reason, "disconnected from game engine");
    send_event(&event_tx, ClientEvent::Disconnected { reason }).await;
    shared.set_state(ConnectionState::Disconnected);
    debug!("session loop exited");
}

async fn close_on_shutdown(transport: &mut impl Transport, shared: &Shared) -> Option<String> {
    debug!("shutdown signal received");
    shared.set_state(ConnectionState::Closing);
    if let Err(e) = transport.close().await {
        debug!("transport close failed: {e}");
    }
    Some("client shut down".to_string())
}

/// Emit a transient notice without blocking. If the channel is full the
/// notice is dropped with a warning.
fn emit_event(event_tx: &mpsc::Sender<ClientEvent>, event: ClientEvent) {
    match event_tx.try_send(event) {
        Ok(()) => {}
        Err(mpsc::error::TrySendError::Full(dropped)) => {
            warn!(
                "event channel full, dropping event: {:?}",
                std::mem::discriminant(&dropped)
            );
        }
        Err(mpsc::error::TrySendError::Closed(_)) => {
            debug!("event channel closed, receiver dropped");
        }
    }
}

/// Deliver a lifecycle event, waiting for channel capacity if needed.
async fn send_event(event_tx: &mpsc::Sender<ClientEvent>, event: ClientEvent) {
    if event_tx.send(event).await.is_err() {
        debug!("event channel closed, receiver dropped");
    }
}

// ── Tests ───────────────────────────────────────────────────────────

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::indexing_slicing
)]
mod tests {
    use super::*;
    use crate::state::Phase;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::atomic::AtomicBool;
    use std::sync::Mutex as StdMutex;

    type Script = Vec<Option<std::result::Result<String, WerewolfError>>>;

    // ── Mock transport ──────────────────────────────────────────────

    /// Records sent messages and replays scripted engine messages.
    struct MockTransport {
        incoming: VecDeque<Option<std::result::Result<String, WerewolfError>>>,
        sent: Arc<StdMutex<Vec<String>>>,
        closed: Arc<AtomicBool>,
        fail_close: Arc<AtomicBool>,
    }

    #[async_trait]
    impl Transport for MockTransport {
        async fn send(&mut self, message: String) -> std::result::Result<(), WerewolfError> {
            self.sent.lock().unwrap().push(message);
            Ok(())
        }

        async fn recv(&mut self) -> Option<std::result::Result<String, WerewolfError>> {
            if let Some(item) = self.incoming.pop_front() {
                item
            } else {
                // Script exhausted: stay open until shutdown.
                std::future::pending().await
            }
        }

        async fn close(&mut self) -> std::result::Result<(), WerewolfError> {
            self.closed.store(true, Ordering::Relaxed);
            if self.fail_close.load(Ordering::Relaxed) {
                return Err(WerewolfError::TransportSend("close handshake failed".into()));
            }
            Ok(())
        }
    }

    /// Hands out one scripted transport per `connect` call.
    #[derive(Default)]
    struct MockConnector {
        transports: StdMutex<VecDeque<MockTransport>>,
    }

    struct Handles {
        sent: Arc<StdMutex<Vec<String>>>,
        closed: Arc<AtomicBool>,
        fail_close: Arc<AtomicBool>,
    }

    impl MockConnector {
        fn with_session(self, script: Script) -> (Self, Handles) {
            let sent = Arc::new(StdMutex::new(Vec::new()));
            let closed = Arc::new(AtomicBool::new(false));
            let fail_close = Arc::new(AtomicBool::new(false));
            self.transports.lock().unwrap().push_back(MockTransport {
                incoming: script.into(),
                sent: Arc::clone(&sent),
                closed: Arc::clone(&closed),
                fail_close: Arc::clone(&fail_close),
            });
            let handles = Handles {
                sent,
                closed,
                fail_close,
            };
            (self, handles)
        }
    }

    #[async_trait]
    impl Connector for MockConnector {
        type Transport = MockTransport;

        async fn connect(&self) -> std::result::Result<MockTransport, WerewolfError> {
            self.transports.lock().unwrap().pop_front().ok_or_else(|| {
                WerewolfError::Io(std::io::Error::new(
                    std::io::ErrorKind::ConnectionRefused,
                    "no engine",
                ))
            })
        }
    }

    fn msg(json: &str) -> Option<std::result::Result<String, WerewolfError>> {
        Some(Ok(json.to_string()))
    }

    const GAME_START: &str = r#"{"type":"game_start","data":{"players":[
        {"id":1,"role":"werewolf","role_key":"werewolf","is_alive":true},
        {"id":2,"role":"seer","role_key":"seer","is_alive":true}],"message":"go"}}"#;
    const NIGHT: &str = r#"{"type":"phase_change","data":{"round":1,"phase":"night","message":"night 1"}}"#;
    const INFO: &str = r#"{"type":"info","data":{"message":"hello"}}"#;
    const GAME_OVER: &str = r#"{"type":"game_over","data":{"winner":"werewolf","players":[
        {"id":1,"role":"werewolf","role_key":"werewolf","is_alive":true},
        {"id":2,"role":"seer","role_key":"seer","is_alive":false}],"message":"wolves win"}}"#;

    async fn next(events: &mut mpsc::Receiver<ClientEvent>) -> ClientEvent {
        tokio::time::timeout(Duration::from_secs(2), events.recv())
            .await
            .expect("timed out waiting for event")
            .expect("event channel closed")
    }

    // ── Tests ───────────────────────────────────────────────────────

    #[tokio::test]
    async fn start_sends_exactly_one_start_game_command() {
        let (connector, handles) = MockConnector::default().with_session(vec![]);
        let (mut client, mut events) = GameClient::new(connector, GameClientConfig::default());

        client.start(Some("sk-test".into())).await.unwrap();
        assert!(matches!(next(&mut events).await, ClientEvent::Connected { .. }));
        assert!(client.is_connected());
        assert!(client.session_id().await.is_some());

        let sent = handles.sent.lock().unwrap().clone();
        assert_eq!(sent.len(), 1);
        let value: serde_json::Value = serde_json::from_str(&sent[0]).unwrap();
        assert_eq!(
            value,
            serde_json::json!({"action": "start_game", "api_key": "sk-test"})
        );

        client.shutdown().await;
    }

    #[tokio::test]
    async fn start_while_open_is_already_active() {
        let (connector, _handles) = MockConnector::default().with_session(vec![]);
        let (mut client, _events) = GameClient::new(connector, GameClientConfig::default());

        client.start(None).await.unwrap();
        let err = client.start(None).await.unwrap_err();
        assert!(matches!(err, WerewolfError::AlreadyActive));
        assert_eq!(client.connection_state(), ConnectionState::Open);

        client.shutdown().await;
    }

    #[tokio::test]
    async fn connect_failure_leaves_client_disconnected() {
        let (mut client, _events) =
            GameClient::new(MockConnector::default(), GameClientConfig::default());
        let err = client.start(None).await.unwrap_err();
        assert!(matches!(err, WerewolfError::Io(_)));
        assert_eq!(client.connection_state(), ConnectionState::Disconnected);
    }

    #[tokio::test]
    async fn events_update_snapshot_in_order() {
        let (connector, _handles) =
            MockConnector::default().with_session(vec![msg(GAME_START), msg(NIGHT)]);
        let (mut client, mut events) = GameClient::new(connector, GameClientConfig::default());
        client.start(None).await.unwrap();

        assert!(matches!(next(&mut events).await, ClientEvent::Connected { .. }));
        match next(&mut events).await {
            ClientEvent::Updated { snapshot, .. } => {
                assert_eq!(snapshot.players().len(), 2);
                assert_eq!(snapshot.phase(), Phase::Idle);
            }
            other => panic!("expected Updated, got {other:?}"),
        }
        match next(&mut events).await {
            ClientEvent::Updated { snapshot, .. } => assert_eq!(snapshot.phase(), Phase::Night),
            other => panic!("expected Updated, got {other:?}"),
        }
        assert_eq!(client.snapshot().phase(), Phase::Night);

        client.shutdown().await;
    }

    #[tokio::test]
    async fn malformed_and_unknown_messages_are_skipped() {
        let (connector, _handles) = MockConnector::default().with_session(vec![
            msg("{{ not json"),
            msg(r#"{"type":"fireworks","data":{}}"#),
            msg(INFO),
        ]);
        let (mut client, mut events) = GameClient::new(connector, GameClientConfig::default());
        client.start(None).await.unwrap();

        assert!(matches!(next(&mut events).await, ClientEvent::Connected { .. }));
        match next(&mut events).await {
            ClientEvent::Updated { effects, .. } => assert_eq!(effects.len(), 1),
            other => panic!("expected Updated for info, got {other:?}"),
        }
        assert!(client.is_connected());

        client.shutdown().await;
    }

    #[tokio::test]
    async fn single_transport_error_keeps_connection_open() {
        let (connector, _handles) = MockConnector::default().with_session(vec![
            Some(Err(WerewolfError::TransportReceive("hiccup".into()))),
            msg(INFO),
        ]);
        let (mut client, mut events) = GameClient::new(connector, GameClientConfig::default());
        client.start(None).await.unwrap();

        assert!(matches!(next(&mut events).await, ClientEvent::Connected { .. }));
        assert!(matches!(
            next(&mut events).await,
            ClientEvent::TransportError { .. }
        ));
        assert!(matches!(next(&mut events).await, ClientEvent::Updated { .. }));
        assert!(client.is_connected());

        client.shutdown().await;
    }

    #[tokio::test]
    async fn repeated_transport_errors_close_the_connection() {
        let (connector, handles) = MockConnector::default().with_session(vec![
            Some(Err(WerewolfError::TransportReceive("a".into()))),
            Some(Err(WerewolfError::TransportReceive("b".into()))),
        ]);
        let config = GameClientConfig::default().with_max_consecutive_errors(2);
        let (mut client, mut events) = GameClient::new(connector, config);
        client.start(None).await.unwrap();

        assert!(matches!(next(&mut events).await, ClientEvent::Connected { .. }));
        assert!(matches!(next(&mut events).await, ClientEvent::TransportError { .. }));
        assert!(matches!(next(&mut events).await, ClientEvent::TransportError { .. }));
        assert!(matches!(
            next(&mut events).await,
            ClientEvent::Disconnected { reason: Some(_) }
        ));
        assert!(handles.closed.load(Ordering::Relaxed));
        client.shutdown().await;
        assert_eq!(client.connection_state(), ConnectionState::Disconnected);
    }

    #[tokio::test]
    async fn receive_errors_never_close_by_default() {
        let mut script: Script = (0..20)
            .map(|i| Some(Err(WerewolfError::TransportReceive(format!("glitch {i}")))))
            .collect();
        script.push(msg(INFO));
        let (connector, handles) = MockConnector::default().with_session(script);
        let (mut client, mut events) = GameClient::new(connector, GameClientConfig::default());
        client.start(None).await.unwrap();

        assert!(matches!(next(&mut events).await, ClientEvent::Connected { .. }));
        for _ in 0..20 {
            assert!(matches!(
                next(&mut events).await,
                ClientEvent::TransportError { .. }
            ));
        }
        assert!(matches!(next(&mut events).await, ClientEvent::Updated { .. }));
        assert!(client.is_connected());
        assert!(!handles.closed.load(Ordering::Relaxed));

        client.shutdown().await;
    }

    #[tokio::test]
    async fn engine_close_allows_a_new_start() {
        let (connector, _first) =
            MockConnector::default().with_session(vec![msg(GAME_START), None]);
        let (connector, second) = connector.with_session(vec![]);
        let (mut client, mut events) = GameClient::new(connector, GameClientConfig::default());
        client.start(None).await.unwrap();

        assert!(matches!(next(&mut events).await, ClientEvent::Connected { .. }));
        assert!(matches!(next(&mut events).await, ClientEvent::Updated { .. }));
        assert!(matches!(
            next(&mut events).await,
            ClientEvent::Disconnected { reason: None }
        ));
        // The interrupted game stays visible but is not ended.
        assert_eq!(client.snapshot().players().len(), 2);
        assert_ne!(client.snapshot().phase(), Phase::Ended);

        // Starting right after `Disconnected` waits for the old loop to settle.
        client.start(None).await.unwrap();
        assert!(matches!(next(&mut events).await, ClientEvent::Connected { .. }));
        assert_eq!(second.sent.lock().unwrap().len(), 1);
        assert!(client.snapshot().players().is_empty());

        client.shutdown().await;
    }

    #[tokio::test]
    async fn game_over_closes_the_connection() {
        let (connector, handles) = MockConnector::default().with_session(vec![
            msg(GAME_START),
            msg(NIGHT),
            msg(GAME_OVER),
        ]);
        let (mut client, mut events) = GameClient::new(connector, GameClientConfig::default());
        client.start(None).await.unwrap();

        let _ = next(&mut events).await; // Connected
        let _ = next(&mut events).await; // game_start
        let _ = next(&mut events).await; // night
        match next(&mut events).await {
            ClientEvent::Updated { snapshot, effects } => {
                assert_eq!(snapshot.phase(), Phase::Ended);
                assert_eq!(effects.last(), Some(&Effect::CloseConnection));
            }
            other => panic!("expected Updated, got {other:?}"),
        }
        match next(&mut events).await {
            ClientEvent::Disconnected { reason } => {
                assert_eq!(reason.as_deref(), Some("game over"));
            }
            other => panic!("expected Disconnected, got {other:?}"),
        }
        assert!(handles.closed.load(Ordering::Relaxed));
        client.shutdown().await;
        assert_eq!(client.connection_state(), ConnectionState::Disconnected);
        assert_eq!(client.snapshot().phase(), Phase::Ended);
    }

    #[tokio::test]
    async fn failed_close_still_ends_the_session() {
        let (connector, handles) =
            MockConnector::default().with_session(vec![msg(GAME_START), msg(GAME_OVER)]);
        handles.fail_close.store(true, Ordering::Relaxed);
        let (mut client, mut events) = GameClient::new(connector, GameClientConfig::default());
        client.start(None).await.unwrap();

        let _ = next(&mut events).await; // Connected
        let _ = next(&mut events).await; // game_start
        let _ = next(&mut events).await; // game_over
        assert!(matches!(
            next(&mut events).await,
            ClientEvent::Disconnected { reason: Some(_) }
        ));
        assert!(handles.closed.load(Ordering::Relaxed));
        client.shutdown().await;
        assert_eq!(client.connection_state(), ConnectionState::Disconnected);
    }

    #[tokio::test]
    async fn restart_closes_resets_and_reconnects() {
        let (connector, first) = MockConnector::default().with_session(vec![msg(GAME_START)]);
        let (connector, second) = connector.with_session(vec![]);
        let (mut client, mut events) = GameClient::new(connector, GameClientConfig::default());
        client.start(Some("key".into())).await.unwrap();

        let _ = next(&mut events).await; // Connected
        let _ = next(&mut events).await; // game_start
        let first_session = client.session_id().await;

        client.restart().await.unwrap();
        assert!(first.closed.load(Ordering::Relaxed));
        assert!(matches!(
            next(&mut events).await,
            ClientEvent::Disconnected { .. }
        ));
        assert!(matches!(next(&mut events).await, ClientEvent::Reset));
        assert!(matches!(next(&mut events).await, ClientEvent::Connected { .. }));

        assert!(client.snapshot().players().is_empty());
        assert_ne!(client.session_id().await, first_session);
        let sent = second.sent.lock().unwrap().clone();
        let value: serde_json::Value = serde_json::from_str(&sent[0]).unwrap();
        assert_eq!(value["api_key"], "key");

        client.shutdown().await;
    }

    #[tokio::test]
    async fn shutdown_without_start_is_a_no_op() {
        let (mut client, _events) =
            GameClient::new(MockConnector::default(), GameClientConfig::default());
        client.shutdown().await;
        client.shutdown().await;
        assert_eq!(client.connection_state(), ConnectionState::Disconnected);
    }

    #[tokio::test]
    async fn config_defaults_and_clamping() {
        let config = GameClientConfig::default();
        assert_eq!(config.event_channel_capacity, DEFAULT_EVENT_CHANNEL_CAPACITY);
        assert_eq!(config.shutdown_timeout, DEFAULT_SHUTDOWN_TIMEOUT);
        assert_eq!(config.max_consecutive_errors, None);

        let config = GameClientConfig::new()
            .with_event_channel_capacity(0)
            .with_max_consecutive_errors(0);
        assert_eq!(config.event_channel_capacity, 1);
        assert_eq!(config.max_consecutive_errors, Some(1));
    }

    #[tokio::test]
    async fn debug_impl_reports_connection() {
        let (client, _events) =
            GameClient::new(MockConnector::default(), GameClientConfig::default());
        let debug = format!("{client:?}");
        assert!(debug.contains("Disconnected"));
    }
}
