//! The link between the client and the game engine.
//!
//! A [`Transport`] moves whole JSON text messages in both directions and
//! owns its own framing. A [`Connector`] remembers where the engine lives and
//! opens a fresh transport for every game, so
//! [`GameClient::restart`](crate::client::GameClient::restart) can reconnect
//! on its own.
//!
//! # Line-delimited TCP
//!
//! ```rust,no_run
//! use async_trait::async_trait;
//! use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
//! use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
//! use werewolf_client::{Connector, Transport, WerewolfError};
//!
//! struct LineTransport {
//!     lines: Lines<BufReader<OwnedReadHalf>>,
//!     writer: OwnedWriteHalf,
//! }
//!
//! #[async_trait]
//! impl Transport for LineTransport {
//!     async fn send(&mut self, message: String) -> Result<(), WerewolfError> {
//!         self.writer.write_all(format!("{message}\n").as_bytes()).await?;
//!         Ok(())
//!     }
//!
//!     async fn recv(&mut self) -> Option<Result<String, WerewolfError>> {
//!         self.lines.next_line().await.map_err(WerewolfError::from).transpose()
//!     }
//!
//!     async fn close(&mut self) -> Result<(), WerewolfError> {
//!         Ok(self.writer.shutdown().await?)
//!     }
//! }
//!
//! struct LineConnector(String);
//!
//! #[async_trait]
//! impl Connector for LineConnector {
//!     type Transport = LineTransport;
//!
//!     async fn connect(&self) -> Result<LineTransport, WerewolfError> {
//!         let (read, writer) = tokio::net::TcpStream::connect(&self.0).await?.into_split();
//!         Ok(LineTransport { lines: BufReader::new(read).lines(), writer })
//!     }
//! }
//! ```

use async_trait::async_trait;

use crate::error::WerewolfError;

/// Two-way channel of JSON text messages to the engine.
///
/// [`recv`](Transport::recv) must be cancel-safe. The session loop races it
/// against the shutdown signal in `tokio::select!`, and a message must not
/// be lost when the losing future is dropped.
#[async_trait]
pub trait Transport: Send + 'static {
    /// Sends one message.
    ///
    /// # Errors
    ///
    /// [`WerewolfError::TransportSend`] when the write fails, or
    /// [`WerewolfError::TransportClosed`] once [`close`](Transport::close) ran.
    async fn send(&mut self, message: String) -> Result<(), WerewolfError>;

    /// Waits for the next message.
    ///
    /// `None` means the engine closed the connection. An `Err` reports a
    /// problem the connection may survive; the client keeps reading after it.
    async fn recv(&mut self) -> Option<Result<String, WerewolfError>>;

    /// Closes the connection. Calling it twice is harmless.
    ///
    /// # Errors
    ///
    /// When the close handshake fails. Resources are released regardless.
    async fn close(&mut self) -> Result<(), WerewolfError>;
}

/// Opens [`Transport`]s to one engine endpoint.
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    type Transport: Transport;

    /// Opens a new connection.
    ///
    /// # Errors
    ///
    /// Whatever keeps the connection from opening, usually
    /// [`WerewolfError::Io`] or [`WerewolfError::Timeout`].
    async fn connect(&self) -> Result<Self::Transport, WerewolfError>;
}
