//! Error types for the werewolf client.

use thiserror::Error;

/// Errors that can occur when driving a connection to the game engine.
///
/// Nothing here is fatal to the process. The worst outcome of any variant is
/// a disconnect that needs an explicit [`restart`](crate::client::GameClient::restart).
#[derive(Debug, Error)]
pub enum WerewolfError {
    /// Failed to send a message through the transport.
    #[error("transport send error: {0}")]
    TransportSend(String),

    /// Failed to receive a message from the transport.
    #[error("transport receive error: {0}")]
    TransportReceive(String),

    /// The transport was already closed when it was asked to send.
    #[error("engine connection closed")]
    TransportClosed,

    /// Failed to serialize the outbound command.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// `start` was called while a connection is connecting, open or closing.
    #[error("a game connection is already active")]
    AlreadyActive,

    /// The engine did not accept the connection in time.
    #[error("operation timed out")]
    Timeout,

    /// The engine could not be reached.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// A specialized [`Result`] type for werewolf client operations.
pub type Result<T> = std::result::Result<T, WerewolfError>;
