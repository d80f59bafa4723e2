//! The presentation contract and the pure projection onto it.
//!
//! Nothing in this crate paints. A UI implements [`PresentationSink`] and
//! feeds it with [`present`]; headless callers can implement it to record
//! calls instead.

use std::collections::BTreeMap;

use crate::event::ClientEvent;
use crate::protocol::{Faction, PlayerId};
use crate::state::{Effect, GameSnapshot, LogCategory, Player};

/// A rendering surface for the game.
///
/// The first five methods are the core contract. The rest are hooks for
/// transient cues and default to doing nothing.
pub trait PresentationSink {
    /// Paint the roster. `reveal_roles` is set once the game has ended;
    /// before that only dead players' roles are available.
    fn render_roster(&mut self, players: &[Player], reveal_roles: bool);

    /// Paint the vote counts of the current voting sub-round.
    fn show_vote_tally(&mut self, tally: &BTreeMap<PlayerId, u32>);

    /// Fill the speech panel.
    fn show_speech(&mut self, speaker: PlayerId, text: &str, rationale: Option<&str>);

    /// Append a line to the event log.
    fn append_log(&mut self, text: &str, category: LogCategory);

    /// Show the final summary.
    fn show_result(&mut self, winner: Faction, final_roster: &[Player]);

    fn hide_pre_game_controls(&mut self) {}

    fn clear_speech_panel(&mut self) {}

    fn highlight_speaker(&mut self, _player_id: PlayerId) {}

    /// Open the speech panel before the text arrives.
    fn show_speech_pending(&mut self, _player_id: PlayerId) {}

    /// Transient "voted" cue; the sink is responsible for clearing it.
    fn pulse_vote(&mut self, _voter: Option<PlayerId>, _target: PlayerId) {}

    /// Connection status line.
    fn set_status(&mut self, _status: &str) {}

    /// Drop every rendered artifact of the previous session.
    fn reset(&mut self) {}
}

/// Paints the persistent parts of a snapshot.
///
/// Depends on nothing but `snapshot`: projecting the same snapshot twice
/// makes the same calls.
pub fn project(snapshot: &GameSnapshot, sink: &mut dyn PresentationSink) {
    sink.render_roster(snapshot.players(), snapshot.reveals_all_roles());
    sink.show_vote_tally(snapshot.vote_tally());
}

/// Forwards one reduction effect to the sink.
///
/// [`Effect::CloseConnection`] is for the connection layer and is not
/// painted.
pub fn apply_effect(effect: &Effect, sink: &mut dyn PresentationSink) {
    match effect {
        Effect::Log { text, category } => sink.append_log(text, *category),
        Effect::HidePreGameControls => sink.hide_pre_game_controls(),
        Effect::ClearSpeechPanel => sink.clear_speech_panel(),
        Effect::HighlightSpeaker { player_id } => sink.highlight_speaker(*player_id),
        Effect::SpeechPending { player_id } => sink.show_speech_pending(*player_id),
        Effect::ShowSpeech {
            player_id,
            text,
            rationale,
        } => sink.show_speech(*player_id, text, rationale.as_deref()),
        Effect::VotePulse { voter, target } => sink.pulse_vote(*voter, *target),
        Effect::ShowResult { winner, roster } => sink.show_result(*winner, roster),
        Effect::CloseConnection => {}
    }
}

/// Renders one [`ClientEvent`]: effects first, then the snapshot.
pub fn present(event: &ClientEvent, sink: &mut dyn PresentationSink) {
    match event {
        ClientEvent::Connected { .. } => sink.set_status("connected"),
        ClientEvent::Updated { snapshot, effects } => {
            for effect in effects {
                apply_effect(effect, sink);
            }
            project(snapshot, sink);
        }
        ClientEvent::TransportError { message } => {
            sink.set_status(&format!("connection error: {message}"));
        }
        ClientEvent::Reset => sink.reset(),
        ClientEvent::Disconnected { reason } => match reason {
            Some(reason) => sink.set_status(&format!("disconnected: {reason}")),
            None => sink.set_status("disconnected"),
        },
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
    use crate::protocol::{GameStartPayload, PhaseChangePayload, PlayerInfo, ServerMessage};
    use crate::state::GameStateStore;
    use std::sync::Arc;

    /// Records every call as a line of text.
    #[derive(Default)]
    struct Transcript(Vec<String>);

    impl PresentationSink for Transcript {
        fn render_roster(&mut self, players: &[Player], reveal_roles: bool) {
            let ids: Vec<_> = players.iter().map(Player::id).collect();
            self.0.push(format!("roster {ids:?} reveal={reveal_roles}"));
        }

        fn show_vote_tally(&mut self, tally: &BTreeMap<PlayerId, u32>) {
            self.0.push(format!("tally {tally:?}"));
        }

        fn show_speech(&mut self, speaker: PlayerId, text: &str, rationale: Option<&str>) {
            self.0.push(format!("speech {speaker} {text} {rationale:?}"));
        }

        fn append_log(&mut self, text: &str, category: LogCategory) {
            self.0.push(format!("log[{}] {text}", category.as_str()));
        }

        fn show_result(&mut self, winner: Faction, _final_roster: &[Player]) {
            self.0.push(format!("result {winner}"));
        }

        fn set_status(&mut self, status: &str) {
            self.0.push(format!("status {status}"));
        }
    }

    fn started_store() -> GameStateStore {
        let mut store = GameStateStore::new();
        store.apply(&ServerMessage::GameStart(GameStartPayload {
            players: (1..=3)
                .map(|id| PlayerInfo {
                    id,
                    role: "villager".into(),
                    role_key: "villager".into(),
                    is_alive: true,
                    personality: None,
                })
                .collect(),
            message: String::new(),
        }));
        store
    }

    #[test]
    fn projection_is_repeatable() {
        let store = started_store();
        let mut first = Transcript::default();
        let mut second = Transcript::default();
        project(store.snapshot(), &mut first);
        project(store.snapshot(), &mut second);
        project(store.snapshot(), &mut second);
        assert_eq!(first.0.len(), 2);
        assert_eq!(second.0[..2], first.0[..]);
        assert_eq!(second.0[2..], first.0[..]);
    }

    #[test]
    fn updated_event_paints_effects_then_snapshot() {
        let mut store = started_store();
        let effects = store.apply(&ServerMessage::PhaseChange(PhaseChangePayload {
            round: 1,
            phase: "night".into(),
            message: "night 1".into(),
        }));
        let event = ClientEvent::Updated {
            snapshot: Arc::clone(store.snapshot()),
            effects,
        };
        let mut sink = Transcript::default();
        present(&event, &mut sink);
        assert_eq!(
            sink.0,
            vec![
                "log[phase] night 1".to_string(),
                "roster [1, 2, 3] reveal=false".to_string(),
                "tally {}".to_string(),
            ]
        );
    }

    #[test]
    fn disconnect_sets_status() {
        let mut sink = Transcript::default();
        present(
            &ClientEvent::Disconnected {
                reason: Some("engine went away".into()),
            },
            &mut sink,
        );
        assert_eq!(sink.0, vec!["status disconnected: engine went away"]);
    }
}
