//! Decoding of inbound engine messages and routing into the state store.
//!
//! Decoding is two-staged: a message is first tried against the closed
//! [`ServerMessage`] union; if that fails, only the envelope's `type` is read
//! to tell a kind this client does not know (accepted and ignored) from a
//! known kind with a broken payload or text that is not JSON at all (both
//! reported as [`DecodeError`]).

use serde::Deserialize;
use thiserror::Error;
use tracing::debug;

use crate::protocol::ServerMessage;
use crate::state::{Effect, GameStateStore};

/// A decoded inbound message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inbound {
    /// A message of a kind this client understands.
    Event(ServerMessage),
    /// A well-formed envelope of a kind this client does not know.
    Unknown { kind: String },
}

/// Why an inbound text frame could not be decoded.
#[derive(Debug, Error)]
pub enum DecodeError {
    /// Not a JSON object with a string `type` field.
    #[error("malformed message: {0}")]
    Malformed(#[source] serde_json::Error),

    /// A known `type` whose `data` does not match the expected payload.
    #[error("invalid `{kind}` payload: {source}")]
    InvalidPayload {
        kind: String,
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Deserialize)]
struct Envelope {
    #[serde(rename = "type")]
    kind: String,
}

/// Decodes one JSON text frame from the engine.
///
/// # Errors
///
/// Returns [`DecodeError::Malformed`] when the text is not an envelope at
/// all, and [`DecodeError::InvalidPayload`] when a known kind carries a
/// payload that does not fit.
pub fn decode(text: &str) -> Result<Inbound, DecodeError> {
    match serde_json::from_str::<ServerMessage>(text) {
        Ok(msg) => Ok(Inbound::Event(msg)),
        Err(err) => {
            let envelope: Envelope = serde_json::from_str(text).map_err(DecodeError::Malformed)?;
            if ServerMessage::is_known_kind(&envelope.kind) {
                Err(DecodeError::InvalidPayload {
                    kind: envelope.kind,
                    source: err,
                })
            } else {
                Ok(Inbound::Unknown {
                    kind: envelope.kind,
                })
            }
        }
    }
}

/// Routes decoded messages into a [`GameStateStore`].
///
/// Dispatching never performs I/O; the returned [`Effect`]s describe what the
/// presentation layer should do.
#[derive(Debug, Default)]
pub struct EventDispatcher {
    store: GameStateStore,
}

impl EventDispatcher {
    pub fn new(store: GameStateStore) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &GameStateStore {
        &self.store
    }

    pub fn into_store(self) -> GameStateStore {
        self.store
    }

    /// Applies one decoded message. Unknown kinds are a no-op.
    pub fn dispatch(&mut self, inbound: &Inbound) -> Vec<Effect> {
        match inbound {
            Inbound::Event(msg) => {
                debug!(kind = msg.kind(), "dispatching event");
                self.store.apply(msg)
            }
            Inbound::Unknown { kind } => {
                debug!(kind = %kind, "ignoring unknown event kind");
                Vec::new()
            }
        }
    }

    /// Decodes and applies one JSON text frame.
    ///
    /// # Errors
    ///
    /// Propagates [`DecodeError`] from [`decode`]; the store is untouched in
    /// that case.
    pub fn dispatch_text(&mut self, text: &str) -> Result<Vec<Effect>, DecodeError> {
        let inbound = decode(text)?;
        Ok(self.dispatch(&inbound))
    }

    /// Clears the store back to an idle snapshot.
    pub fn reset(&mut self) {
        self.store.reset();
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
    use crate::state::Phase;
    use std::sync::Arc;

    #[test]
    fn decodes_known_kind() {
        let inbound = decode(r#"{"type":"info","data":{"message":"hello"}}"#).unwrap();
        match inbound {
            Inbound::Event(ServerMessage::Info(payload)) => assert_eq!(payload.message, "hello"),
            other => panic!("expected info, got {other:?}"),
        }
    }

    #[test]
    fn unknown_kind_is_accepted() {
        let inbound = decode(r#"{"type":"weather","data":{"rain":true}}"#).unwrap();
        assert_eq!(
            inbound,
            Inbound::Unknown {
                kind: "weather".into()
            }
        );
    }

    #[test]
    fn non_json_is_malformed() {
        let err = decode("not json at all").unwrap_err();
        assert!(matches!(err, DecodeError::Malformed(_)));
    }

    #[test]
    fn missing_type_is_malformed() {
        let err = decode(r#"{"data":{}}"#).unwrap_err();
        assert!(matches!(err, DecodeError::Malformed(_)));
    }

    #[test]
    fn broken_payload_of_known_kind_is_reported() {
        let err = decode(r#"{"type":"vote","data":{"target":"two"}}"#).unwrap_err();
        match err {
            DecodeError::InvalidPayload { kind, .. } => assert_eq!(kind, "vote"),
            other => panic!("expected InvalidPayload, got {other:?}"),
        }
    }

    #[test]
    fn unknown_kind_leaves_store_untouched() {
        let mut dispatcher = EventDispatcher::default();
        dispatcher
            .dispatch_text(r#"{"type":"game_start","data":{"players":[{"id":1,"role":"seer","role_key":"seer","is_alive":true}]}}"#)
            .unwrap();
        let before = Arc::clone(dispatcher.store().snapshot());
        let effects = dispatcher
            .dispatch_text(r#"{"type":"spectator_joined","data":null}"#)
            .unwrap();
        assert!(effects.is_empty());
        assert!(Arc::ptr_eq(&before, dispatcher.store().snapshot()));
    }

    #[test]
    fn dispatch_text_routes_phase_change() {
        let mut dispatcher = EventDispatcher::default();
        dispatcher
            .dispatch_text(r#"{"type":"phase_change","data":{"round":1,"phase":"night","message":"night falls"}}"#)
            .unwrap();
        assert_eq!(dispatcher.store().snapshot().phase(), Phase::Night);
        dispatcher.reset();
        assert_eq!(dispatcher.into_store().snapshot().phase(), Phase::Idle);
    }
}
