//! Built-in engine links.
//!
//! With the default `transport-websocket` feature this provides
//! [`WebSocketConnector`], which is what most front ends hand to
//! [`GameClient::new`](crate::client::GameClient::new), and the
//! [`WebSocketTransport`] it opens. Other links plug in through the
//! [`Transport`](crate::Transport) and [`Connector`](crate::Connector) traits.

#[cfg(feature = "transport-websocket")]
pub mod websocket;

#[cfg(feature = "transport-websocket")]
pub use websocket::{WebSocketConnector, WebSocketTransport};
