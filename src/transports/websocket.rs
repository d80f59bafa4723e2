//! WebSocket link to the game engine, built on `tokio-tungstenite`.
//!
//! The engine pushes one JSON event per text frame. Some deployments put the
//! same JSON in binary frames; those are accepted as long as they are valid
//! UTF-8. `ws://` and `wss://` URLs both work (TLS comes from
//! [`MaybeTlsStream`](tokio_tungstenite::MaybeTlsStream)).
//!
//! Only compiled with the `transport-websocket` feature, which is on by
//! default.
//!
//! ```rust,no_run
//! # async fn example() -> Result<(), werewolf_client::WerewolfError> {
//! use std::time::Duration;
//! use werewolf_client::{Connector, WebSocketConnector};
//!
//! let connector = WebSocketConnector::new("ws://localhost:8000/ws")
//!     .with_connect_timeout(Duration::from_secs(3));
//! let transport = connector.connect().await?;
//! # Ok(())
//! # }
//! ```

use std::time::Duration;

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio_tungstenite::tungstenite::{self, protocol::Message};

use crate::error::WerewolfError;
use crate::transport::{Connector, Transport};

/// How long [`WebSocketConnector`] waits for the handshake by default.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// The stream type returned by `connect_async`.
pub type WsStream =
    tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>;

/// What one WebSocket frame means for the session loop.
enum Frame {
    Event(String),
    Closed,
    Ignored,
}

impl Frame {
    fn classify(msg: Message) -> Self {
        match msg {
            Message::Text(text) => Self::Event(text.to_string()),
            Message::Binary(bytes) => match String::from_utf8(bytes.to_vec()) {
                Ok(text) => Self::Event(text),
                Err(_) => {
                    tracing::warn!(len = bytes.len(), "dropping non-UTF-8 binary frame");
                    Self::Ignored
                }
            },
            Message::Close(frame) => {
                tracing::debug!(?frame, "engine sent close frame");
                Self::Closed
            }
            // Pongs are queued by tungstenite itself.
            Message::Ping(_) | Message::Pong(_) | Message::Frame(_) => Self::Ignored,
        }
    }
}

fn handshake_error(err: tungstenite::Error) -> WerewolfError {
    let kind = match &err {
        tungstenite::Error::Io(io) => io.kind(),
        _ => std::io::ErrorKind::Other,
    };
    WerewolfError::Io(std::io::Error::new(kind, err))
}

/// A [`Transport`] over one WebSocket connection to the engine.
///
/// [`recv`](Transport::recv) is cancel-safe: it only awaits
/// `StreamExt::next`, which holds no partial frame across cancellation.
#[derive(Debug)]
pub struct WebSocketTransport {
    stream: WsStream,
    closed: bool,
}

impl WebSocketTransport {
    /// Opens a connection to `url` with no time limit.
    ///
    /// # Errors
    ///
    /// [`WerewolfError::Io`] when the URL is invalid or the handshake fails.
    /// The I/O error kind is kept when tungstenite reports one.
    pub async fn connect(url: &str) -> Result<Self, WerewolfError> {
        tracing::debug!(%url, "opening engine websocket");
        let (stream, _response) = tokio_tungstenite::connect_async(url)
            .await
            .map_err(handshake_error)?;
        tracing::info!(%url, "engine websocket open");
        Ok(Self::from_stream(stream))
    }

    /// Opens a connection to `url`, giving up after `timeout`.
    ///
    /// # Errors
    ///
    /// [`WerewolfError::Timeout`], or whatever [`connect`](Self::connect)
    /// reports.
    pub async fn connect_with_timeout(url: &str, timeout: Duration) -> Result<Self, WerewolfError> {
        match tokio::time::timeout(timeout, Self::connect(url)).await {
            Ok(result) => result,
            Err(_) => {
                tracing::warn!(%url, ?timeout, "engine websocket handshake timed out");
                Err(WerewolfError::Timeout)
            }
        }
    }

    /// Wraps a stream that was opened elsewhere (proxies, custom TLS).
    pub fn from_stream(stream: WsStream) -> Self {
        Self {
            stream,
            closed: false,
        }
    }
}

#[async_trait]
impl Transport for WebSocketTransport {
    async fn send(&mut self, message: String) -> Result<(), WerewolfError> {
        if self.closed {
            return Err(WerewolfError::TransportClosed);
        }
        self.stream
            .send(Message::Text(message.into()))
            .await
            .map_err(|e| WerewolfError::TransportSend(e.to_string()))
    }

    async fn recv(&mut self) -> Option<Result<String, WerewolfError>> {
        while let Some(next) = self.stream.next().await {
            let msg = match next {
                Ok(msg) => msg,
                Err(e) => return Some(Err(WerewolfError::TransportReceive(e.to_string()))),
            };
            match Frame::classify(msg) {
                Frame::Event(text) => return Some(Ok(text)),
                Frame::Closed => return None,
                Frame::Ignored => {}
            }
        }
        None
    }

    async fn close(&mut self) -> Result<(), WerewolfError> {
        if std::mem::replace(&mut self.closed, true) {
            return Ok(());
        }
        match self.stream.close(None).await {
            Ok(()) | Err(tungstenite::Error::ConnectionClosed) => Ok(()),
            Err(e) => Err(WerewolfError::TransportSend(e.to_string())),
        }
    }
}

/// Opens a [`WebSocketTransport`] to a fixed engine URL on every start.
#[derive(Debug, Clone)]
pub struct WebSocketConnector {
    url: String,
    connect_timeout: Duration,
}

impl WebSocketConnector {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
        }
    }

    /// Defaults to [`DEFAULT_CONNECT_TIMEOUT`].
    #[must_use]
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl Connector for WebSocketConnector {
    type Transport = WebSocketTransport;

    async fn connect(&self) -> Result<WebSocketTransport, WerewolfError> {
        WebSocketTransport::connect_with_timeout(&self.url, self.connect_timeout).await
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::indexing_slicing
)]
mod tests {
    use super::*;
    use tokio::net::{TcpListener, TcpStream};
    use tokio::sync::oneshot;

    type EngineSide = tokio_tungstenite::WebSocketStream<TcpStream>;

    /// Accepts one connection on a local port and hands it to `engine`.
    async fn spawn_engine<F, Fut>(engine: F) -> String
    where
        F: FnOnce(EngineSide) -> Fut + Send + 'static,
        Fut: std::future::Future<Output = ()> + Send,
    {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("ws://{}", listener.local_addr().unwrap());
        tokio::spawn(async move {
            let (tcp, _) = listener.accept().await.unwrap();
            engine(tokio_tungstenite::accept_async(tcp).await.unwrap()).await;
        });
        url
    }

    const GAME_START: &str =
        r#"{"type":"game_start","data":{"players":[{"id":1,"role":"seer","role_key":"seer","is_alive":true}]}}"#;

    #[test]
    fn transport_can_move_into_the_session_task() {
        fn assert_send<T: Send + 'static>() {}
        assert_send::<WebSocketTransport>();
    }

    #[tokio::test]
    async fn bad_url_is_an_io_error() {
        let err = WebSocketTransport::connect("engine.local").await.unwrap_err();
        assert!(matches!(err, WerewolfError::Io(_)));
    }

    #[tokio::test]
    async fn refused_connection_is_an_io_error() {
        let err = WebSocketTransport::connect("ws://127.0.0.1:1").await.unwrap_err();
        assert!(matches!(err, WerewolfError::Io(_)));
    }

    #[tokio::test]
    async fn events_arrive_until_the_engine_closes() {
        let url = spawn_engine(|mut ws| async move {
            ws.send(Message::Text(GAME_START.into())).await.unwrap();
            ws.send(Message::Ping(vec![1].into())).await.unwrap();
            ws.send(Message::Text(r#"{"type":"info","data":{}}"#.into()))
                .await
                .unwrap();
            ws.close(None).await.unwrap();
        })
        .await;

        let mut transport = WebSocketTransport::connect(&url).await.unwrap();
        assert_eq!(transport.recv().await.unwrap().unwrap(), GAME_START);
        assert_eq!(
            transport.recv().await.unwrap().unwrap(),
            r#"{"type":"info","data":{}}"#
        );
        assert!(transport.recv().await.is_none());
    }

    #[tokio::test]
    async fn utf8_binary_frames_count_as_events() {
        let url = spawn_engine(|mut ws| async move {
            ws.send(Message::Binary(vec![0xFF, 0xFE].into())).await.unwrap();
            ws.send(Message::Binary(GAME_START.as_bytes().to_vec().into()))
                .await
                .unwrap();
            ws.close(None).await.unwrap();
        })
        .await;

        let mut transport = WebSocketTransport::connect(&url).await.unwrap();
        assert_eq!(transport.recv().await.unwrap().unwrap(), GAME_START);
        assert!(transport.recv().await.is_none());
    }

    #[tokio::test]
    async fn connector_delivers_the_start_command() {
        let (seen_tx, seen_rx) = oneshot::channel::<String>();
        let url = spawn_engine(|mut ws| async move {
            if let Some(Ok(Message::Text(text))) = ws.next().await {
                seen_tx.send(text.to_string()).unwrap();
            }
            while let Some(Ok(_)) = ws.next().await {}
        })
        .await;

        let connector = WebSocketConnector::new(url.clone());
        assert_eq!(connector.url(), url);
        let mut transport = connector.connect().await.unwrap();
        transport
            .send(r#"{"action":"start_game","api_key":null}"#.to_string())
            .await
            .unwrap();
        assert_eq!(
            seen_rx.await.unwrap(),
            r#"{"action":"start_game","api_key":null}"#
        );
        transport.close().await.unwrap();
    }

    #[tokio::test]
    async fn close_is_idempotent_and_blocks_sends() {
        let url = spawn_engine(|mut ws| async move {
            while let Some(Ok(_)) = ws.next().await {}
        })
        .await;

        let mut transport = WebSocketTransport::connect(&url).await.unwrap();
        transport.close().await.unwrap();
        transport.close().await.unwrap();
        let err = transport.send("{}".to_string()).await.unwrap_err();
        assert!(matches!(err, WerewolfError::TransportClosed));
    }

    #[tokio::test]
    async fn connector_gives_up_after_timeout() {
        // TEST-NET-1 is unroutable, so the handshake never completes.
        let connector = WebSocketConnector::new("ws://192.0.2.1:1")
            .with_connect_timeout(Duration::from_millis(50));
        let err = connector.connect().await.unwrap_err();
        assert!(matches!(err, WerewolfError::Timeout));
    }
}
