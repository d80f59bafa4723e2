//! Events emitted by [`GameClient`](crate::client::GameClient) to its consumer.

use std::sync::Arc;

use uuid::Uuid;

use crate::state::{Effect, GameSnapshot};

/// Identifies one connection session (one `start` → close cycle).
pub type SessionId = Uuid;

/// What the client reports on its event channel, in arrival order.
#[derive(Debug, Clone)]
pub enum ClientEvent {
    /// The transport opened; the `start_game` command is sent right after.
    Connected { session: SessionId },
    /// An engine event was reduced into a new snapshot.
    Updated {
        snapshot: Arc<GameSnapshot>,
        effects: Vec<Effect>,
    },
    /// The transport reported an error. The connection is not closed by it;
    /// a closure, if any, follows as [`ClientEvent::Disconnected`].
    TransportError { message: String },
    /// Session-scoped state was cleared by a restart.
    Reset,
    /// The connection is gone and `start` may be called again.
    Disconnected { reason: Option<String> },
}
