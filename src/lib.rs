//! # Werewolf Client
//!
//! Client-side state synchronizer for a remote werewolf (mafia-style) game
//! engine.
//!
//! The engine owns every rule. This crate receives its ordered stream of
//! JSON events and derives from it alone a consistent local view: who is
//! alive, which phase the round is in, who holds the floor and how votes are
//! accumulating.
//!
//! ## Features
//!
//! - **Pure reducer**: [`state::reduce`] turns `(snapshot, event)` into the
//!   next snapshot plus presentation [`Effect`]s, with no I/O
//! - **Forward-compatible decoding**: unknown event kinds are accepted and
//!   ignored ([`dispatcher::decode`])
//! - **Transport-agnostic**: implement [`Transport`] and [`Connector`] for any
//!   backend; the default `transport-websocket` feature provides
//!   `WebSocketTransport` / `WebSocketConnector`
//! - **Headless presentation**: paint through the [`PresentationSink`] trait
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use werewolf_client::{GameClient, GameClientConfig, WebSocketConnector};
//!
//! let connector = WebSocketConnector::new("ws://localhost:8000/ws");
//! let (mut client, mut events) = GameClient::new(connector, GameClientConfig::default());
//! client.start(None).await?;
//! while let Some(event) = events.recv().await {
//!     werewolf_client::presenter::present(&event, &mut sink);
//! }
//! ```

#[cfg(feature = "tokio-runtime")]
pub mod client;
pub mod dispatcher;
pub mod error;
pub mod event;
pub mod presenter;
pub mod protocol;
pub mod state;
pub mod transport;
pub mod transports;

// Re-export primary types for ergonomic imports.
#[cfg(feature = "tokio-runtime")]
pub use client::{ConnectionState, GameClient, GameClientConfig};
pub use dispatcher::{DecodeError, EventDispatcher, Inbound};
pub use error::WerewolfError;
pub use event::{ClientEvent, SessionId};
pub use presenter::PresentationSink;
pub use protocol::{ClientMessage, Faction, PlayerId, ServerMessage};
pub use state::{Effect, GameSnapshot, GameStateStore, LogCategory, Phase, Player};
pub use transport::{Connector, Transport};
#[cfg(feature = "transport-websocket")]
pub use transports::{WebSocketConnector, WebSocketTransport};
