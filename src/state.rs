//! Game state store: the local snapshot of one game and the reducer that
//! derives the next snapshot from each engine event.
//!
//! [`reduce`] is pure. It never performs I/O; it returns the next
//! [`GameSnapshot`] together with a list of [`Effect`]s that the caller hands
//! to a [`PresentationSink`](crate::presenter::PresentationSink) or acts on
//! (for example [`Effect::CloseConnection`]).
//!
//! The snapshot upholds these rules after every reduction:
//!
//! - every key of the vote tally named an alive player when the vote landed;
//! - a dead player never comes back to life;
//! - the round only moves on `phase_change`, and never backwards;
//! - a role is visible iff its player is dead or the game has ended;
//! - at most one player holds the floor.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use tracing::{debug, warn};

use crate::protocol::{Faction, PlayerId, PlayerInfo, ServerMessage};

// ── Phase ───────────────────────────────────────────────────────────

/// Sub-round of gameplay.
///
/// `Idle` and `Ended` are client-side bookends; the engine only ever names
/// the three gameplay phases in `phase_change`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Phase {
    #[default]
    Idle,
    Night,
    DaySpeech,
    DayVote,
    Ended,
}

impl Phase {
    /// Wire label of this phase.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Night => "night",
            Self::DaySpeech => "day_speech",
            Self::DayVote => "day_vote",
            Self::Ended => "ended",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A `phase_change` label this client does not recognise.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown phase label `{0}`")]
pub struct UnknownPhase(pub String);

impl FromStr for Phase {
    type Err = UnknownPhase;

    /// Parses a gameplay phase announced by the engine.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "night" => Ok(Self::Night),
            "day_speech" => Ok(Self::DaySpeech),
            "day_vote" => Ok(Self::DayVote),
            other => Err(UnknownPhase(other.to_string())),
        }
    }
}

// ── Player ──────────────────────────────────────────────────────────

/// A player's role: display label plus the stable key used for icons.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Role {
    pub label: String,
    pub key: String,
}

/// One roster entry as the client sees it.
///
/// The engine hands the whole roster, roles included, to the client at
/// `game_start`. The role is sealed until a death, an elimination or the
/// end of the game discloses it, and [`Player::role`] returns `None` while
/// it is sealed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Player {
    id: PlayerId,
    role: Role,
    disclosed: bool,
    is_alive: bool,
    personality: Option<String>,
}

impl Player {
    /// Builds a roster entry with its role sealed (unless already dead).
    pub fn sealed(info: &PlayerInfo) -> Self {
        Self {
            id: info.id,
            role: Role {
                label: info.role.clone(),
                key: info.role_key.clone(),
            },
            disclosed: !info.is_alive,
            is_alive: info.is_alive,
            personality: info.personality.clone(),
        }
    }

    /// Builds a roster entry with its role disclosed.
    pub fn disclosed(info: &PlayerInfo) -> Self {
        Self {
            disclosed: true,
            ..Self::sealed(info)
        }
    }

    pub fn id(&self) -> PlayerId {
        self.id
    }

    pub fn is_alive(&self) -> bool {
        self.is_alive
    }

    /// The role, or `None` while it is still masked.
    pub fn role(&self) -> Option<&Role> {
        self.disclosed.then_some(&self.role)
    }

    pub fn personality(&self) -> Option<&str> {
        self.personality.as_deref()
    }

    /// Marks the player dead and discloses the role. `label` overrides the
    /// sealed label when the engine names the role in the death message.
    fn kill(&mut self, label: Option<&str>) {
        self.is_alive = false;
        self.disclosed = true;
        if let Some(label) = label {
            self.role.label = label.to_string();
        }
    }
}

// ── Snapshot ────────────────────────────────────────────────────────

/// The complete local view of one game session.
///
/// Snapshots are values: the store swaps in a new one after every event and
/// never edits a published snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GameSnapshot {
    players: Vec<Player>,
    round: u32,
    phase: Phase,
    vote_tally: BTreeMap<PlayerId, u32>,
    active_speaker: Option<PlayerId>,
    winner: Option<Faction>,
}

impl Default for GameSnapshot {
    fn default() -> Self {
        Self {
            players: Vec::new(),
            round: 1,
            phase: Phase::Idle,
            vote_tally: BTreeMap::new(),
            active_speaker: None,
            winner: None,
        }
    }
}

impl GameSnapshot {
    /// Roster in engine order.
    pub fn players(&self) -> &[Player] {
        &self.players
    }

    pub fn player(&self, id: PlayerId) -> Option<&Player> {
        self.players.iter().find(|p| p.id == id)
    }

    pub fn alive_players(&self) -> impl Iterator<Item = &Player> {
        self.players.iter().filter(|p| p.is_alive)
    }

    pub fn round(&self) -> u32 {
        self.round
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Votes cast in the current voting sub-round, by target.
    pub fn vote_tally(&self) -> &BTreeMap<PlayerId, u32> {
        &self.vote_tally
    }

    pub fn active_speaker(&self) -> Option<PlayerId> {
        self.active_speaker
    }

    pub fn winner(&self) -> Option<Faction> {
        self.winner
    }

    /// Whether roles are shown for every player (only once the game ended).
    pub fn reveals_all_roles(&self) -> bool {
        self.phase == Phase::Ended
    }

    fn player_mut(&mut self, id: PlayerId) -> Option<&mut Player> {
        self.players.iter_mut().find(|p| p.id == id)
    }
}

// ── Effects ─────────────────────────────────────────────────────────

/// Styling bucket for event-log lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LogCategory {
    Info,
    Phase,
    Action,
    Death,
    Speech,
    Vote,
    Result,
}

impl LogCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Info => "info",
            Self::Phase => "phase",
            Self::Action => "action",
            Self::Death => "death",
            Self::Speech => "speech",
            Self::Vote => "vote",
            Self::Result => "result",
        }
    }
}

/// A presentation instruction produced by a reduction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    /// Append a line to the event log.
    Log { text: String, category: LogCategory },
    /// Hide the pre-game controls.
    HidePreGameControls,
    /// Close the speech panel.
    ClearSpeechPanel,
    /// Highlight the card of the player holding the floor.
    HighlightSpeaker { player_id: PlayerId },
    /// Open the speech panel in its pending state.
    SpeechPending { player_id: PlayerId },
    /// Fill the speech panel.
    ShowSpeech {
        player_id: PlayerId,
        text: String,
        rationale: Option<String>,
    },
    /// Transient, self-clearing "voted" pulse on the target's card.
    VotePulse {
        voter: Option<PlayerId>,
        target: PlayerId,
    },
    /// Show the final summary.
    ShowResult {
        winner: Faction,
        roster: Vec<Player>,
    },
    /// The session is over; the connection must be closed.
    CloseConnection,
}

/// Output of [`reduce`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reduction {
    pub snapshot: GameSnapshot,
    pub effects: Vec<Effect>,
}

impl Reduction {
    fn unchanged(current: &GameSnapshot) -> Self {
        Self {
            snapshot: current.clone(),
            effects: Vec::new(),
        }
    }
}

// ── Reducer ─────────────────────────────────────────────────────────

/// Computes the snapshot that follows `current` once `msg` is applied.
///
/// Events that reference unknown players or arrive in the wrong phase are
/// ignored rather than treated as errors. Once the game has ended every
/// event is ignored.
pub fn reduce(current: &GameSnapshot, msg: &ServerMessage) -> Reduction {
    if current.phase == Phase::Ended {
        debug!(kind = msg.kind(), "game already ended, ignoring event");
        return Reduction::unchanged(current);
    }

    let mut next = current.clone();
    let mut effects = Vec::new();

    match msg {
        ServerMessage::Info(payload) => {
            log(&mut effects, LogCategory::Info, &payload.message, String::new);
        }

        ServerMessage::GameStart(payload) => {
            if current.phase != Phase::Idle {
                warn!(phase = %current.phase, "game_start outside idle phase, ignoring");
                return Reduction::unchanged(current);
            }
            let mut players: Vec<Player> = Vec::with_capacity(payload.players.len());
            for info in &payload.players {
                if players.iter().any(|p| p.id == info.id) {
                    warn!(player_id = info.id, "duplicate player id in roster, skipping");
                    continue;
                }
                players.push(Player::sealed(info));
            }
            next = GameSnapshot {
                players,
                ..GameSnapshot::default()
            };
            effects.push(Effect::HidePreGameControls);
            let count = next.players.len();
            log(&mut effects, LogCategory::Info, &payload.message, || {
                format!("game started with {count} players")
            });
        }

        ServerMessage::PhaseChange(payload) => {
            match payload.phase.parse::<Phase>() {
                Ok(phase) => {
                    if payload.round < current.round {
                        warn!(
                            current = current.round,
                            announced = payload.round,
                            "phase_change announced an earlier round, keeping current"
                        );
                    }
                    next.round = current.round.max(payload.round);
                    next.phase = phase;
                    next.active_speaker = None;
                    if phase == Phase::DayVote {
                        next.vote_tally.clear();
                    }
                    effects.push(Effect::ClearSpeechPanel);
                }
                Err(e) => {
                    warn!(error = %e, "leaving phase unchanged");
                }
            }
            log(&mut effects, LogCategory::Phase, &payload.message, || {
                format!("round {}: {}", payload.round, payload.phase)
            });
        }

        ServerMessage::Action(payload) => {
            log(&mut effects, LogCategory::Action, &payload.message, || {
                match &payload.role {
                    Some(role) => format!("{role} is acting"),
                    None => String::new(),
                }
            });
        }

        ServerMessage::Death(payload) => {
            let Some(player) = next.player_mut(payload.player_id) else {
                debug!(player_id = payload.player_id, "death for unknown player, ignoring");
                return Reduction::unchanged(current);
            };
            player.kill(payload.role.as_deref());
            log(&mut effects, LogCategory::Death, &payload.message, || {
                match &payload.reason {
                    Some(reason) => format!("player {} died: {reason}", payload.player_id),
                    None => format!("player {} died", payload.player_id),
                }
            });
        }

        ServerMessage::Speaking(payload) => {
            if current.phase != Phase::DaySpeech {
                debug!(phase = %current.phase, "speaking outside day_speech, ignoring");
                return Reduction::unchanged(current);
            }
            if current.player(payload.player_id).is_none() {
                debug!(player_id = payload.player_id, "speaking for unknown player, ignoring");
                return Reduction::unchanged(current);
            }
            next.active_speaker = Some(payload.player_id);
            effects.push(Effect::HighlightSpeaker {
                player_id: payload.player_id,
            });
            effects.push(Effect::SpeechPending {
                player_id: payload.player_id,
            });
            log(&mut effects, LogCategory::Speech, &payload.message, String::new);
        }

        ServerMessage::Speech(payload) => {
            if current.active_speaker.is_some() {
                effects.push(Effect::ShowSpeech {
                    player_id: payload.player_id,
                    text: payload.speech.clone(),
                    rationale: payload.thought.clone().filter(|t| !t.is_empty()),
                });
            } else {
                debug!(player_id = payload.player_id, "speech without a speaker, log only");
            }
            log(&mut effects, LogCategory::Speech, &payload.message, || {
                format!("{}: {}", payload.player_id, payload.speech)
            });
        }

        ServerMessage::Vote(payload) => {
            if current.phase != Phase::DayVote {
                debug!(phase = %current.phase, "vote outside day_vote, ignoring");
                return Reduction::unchanged(current);
            }
            if !current.player(payload.target).is_some_and(Player::is_alive) {
                warn!(target = payload.target, "vote for unknown or dead player, ignoring");
                return Reduction::unchanged(current);
            }
            *next.vote_tally.entry(payload.target).or_insert(0) += 1;
            effects.push(Effect::VotePulse {
                voter: payload.player_id,
                target: payload.target,
            });
            log(&mut effects, LogCategory::Vote, &payload.message, || {
                match payload.player_id {
                    Some(voter) => format!("{voter} -> {}", payload.target),
                    None => format!("vote for {}", payload.target),
                }
            });
        }

        ServerMessage::VoteResult(payload) => {
            if current.phase != Phase::DayVote {
                debug!(phase = %current.phase, "vote_result outside day_vote, ignoring");
                return Reduction::unchanged(current);
            }
            log(&mut effects, LogCategory::Result, &payload.message, String::new);
            for (player_id, count) in &payload.counts {
                let noun = if *count == 1 { "vote" } else { "votes" };
                effects.push(Effect::Log {
                    text: format!("player {player_id}: {count} {noun}"),
                    category: LogCategory::Vote,
                });
            }
        }

        ServerMessage::Eliminated(payload) => {
            let Some(player) = next.player_mut(payload.player_id) else {
                debug!(player_id = payload.player_id, "eliminated unknown player, ignoring");
                return Reduction::unchanged(current);
            };
            player.kill(Some(&payload.role));
            next.vote_tally.clear();
            log(&mut effects, LogCategory::Death, &payload.message, || {
                format!("player {} was eliminated ({})", payload.player_id, payload.role)
            });
        }

        ServerMessage::GameOver(payload) => {
            next.players = payload
                .players
                .iter()
                .map(|info| {
                    let mut player = Player::disclosed(info);
                    if let Some(known) = current.player(info.id) {
                        if !known.is_alive {
                            player.is_alive = false;
                        }
                        if player.personality.is_none() {
                            player.personality.clone_from(&known.personality);
                        }
                    }
                    player
                })
                .collect();
            next.winner = Some(payload.winner);
            next.phase = Phase::Ended;
            next.active_speaker = None;
            effects.push(Effect::ShowResult {
                winner: payload.winner,
                roster: next.players.clone(),
            });
            log(&mut effects, LogCategory::Result, &payload.message, || {
                format!("game over: {} win", payload.winner)
            });
            effects.push(Effect::CloseConnection);
        }
    }

    Reduction {
        snapshot: next,
        effects,
    }
}

/// Pushes a log line, preferring the engine's own message text.
fn log(
    effects: &mut Vec<Effect>,
    category: LogCategory,
    message: &str,
    fallback: impl FnOnce() -> String,
) {
    let text = if message.is_empty() {
        fallback()
    } else {
        message.to_string()
    };
    if !text.is_empty() {
        effects.push(Effect::Log { text, category });
    }
}

// ── Store ───────────────────────────────────────────────────────────

/// Owner of the current [`GameSnapshot`].
///
/// The reducer is the only mutator: [`apply`](Self::apply) swaps in the
/// snapshot it returns. Published snapshots are shared behind an [`Arc`] and
/// stay valid after later events.
#[derive(Debug, Clone, Default)]
pub struct GameStateStore {
    snapshot: Arc<GameSnapshot>,
}

impl GameStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// The current snapshot.
    pub fn snapshot(&self) -> &Arc<GameSnapshot> {
        &self.snapshot
    }

    /// Reduces `msg` into the store and returns the presentation effects.
    pub fn apply(&mut self, msg: &ServerMessage) -> Vec<Effect> {
        let Reduction { snapshot, effects } = reduce(&self.snapshot, msg);
        if snapshot != *self.snapshot {
            self.snapshot = Arc::new(snapshot);
        }
        effects
    }

    /// Returns `true` once `game_over` has been applied.
    pub fn is_ended(&self) -> bool {
        self.snapshot.phase == Phase::Ended
    }

    /// Drops every session-scoped value and goes back to `idle`.
    pub fn reset(&mut self) {
        self.snapshot = Arc::new(GameSnapshot::default());
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
    use crate::protocol::{
        ActionPayload, DeathPayload, EliminatedPayload, GameOverPayload, GameStartPayload,
        InfoPayload, PhaseChangePayload, SpeakingPayload, SpeechPayload, VotePayload,
        VoteResultPayload,
    };

    fn info(id: PlayerId, role: &str) -> PlayerInfo {
        PlayerInfo {
            id,
            role: role.to_string(),
            role_key: role.to_string(),
            is_alive: true,
            personality: None,
        }
    }

    fn game_start(ids: &[PlayerId]) -> ServerMessage {
        ServerMessage::GameStart(GameStartPayload {
            players: ids.iter().map(|id| info(*id, "villager")).collect(),
            message: String::new(),
        })
    }

    fn phase(round: u32, phase: &str) -> ServerMessage {
        ServerMessage::PhaseChange(PhaseChangePayload {
            round,
            phase: phase.to_string(),
            message: String::new(),
        })
    }

    fn vote(target: PlayerId) -> ServerMessage {
        ServerMessage::Vote(VotePayload {
            player_id: None,
            target,
            message: String::new(),
        })
    }

    fn eliminated(player_id: PlayerId, role: &str) -> ServerMessage {
        ServerMessage::Eliminated(EliminatedPayload {
            player_id,
            role: role.to_string(),
            votes: None,
            message: String::new(),
        })
    }

    fn death(player_id: PlayerId, role: Option<&str>) -> ServerMessage {
        ServerMessage::Death(DeathPayload {
            player_id,
            role: role.map(str::to_string),
            reason: None,
            message: String::new(),
        })
    }

    fn store_with(msgs: &[ServerMessage]) -> GameStateStore {
        let mut store = GameStateStore::new();
        for msg in msgs {
            store.apply(msg);
        }
        store
    }

    #[test]
    fn game_start_builds_masked_roster() {
        let store = store_with(&[game_start(&[1, 2, 3])]);
        let snap = store.snapshot();
        assert_eq!(snap.players().len(), 3);
        assert!(snap.players().iter().all(Player::is_alive));
        assert!(snap.players().iter().all(|p| p.role().is_none()));
        assert_eq!(snap.phase(), Phase::Idle);
    }

    #[test]
    fn game_start_hides_pre_game_controls() {
        let mut store = GameStateStore::new();
        let effects = store.apply(&game_start(&[1]));
        assert_eq!(effects.first(), Some(&Effect::HidePreGameControls));
    }

    #[test]
    fn game_start_after_idle_is_ignored() {
        let mut store = store_with(&[game_start(&[1, 2]), phase(1, "night")]);
        let before = Arc::clone(store.snapshot());
        let effects = store.apply(&game_start(&[7, 8, 9]));
        assert!(effects.is_empty());
        assert_eq!(**store.snapshot(), *before);
    }

    #[test]
    fn votes_accumulate_per_target() {
        let store = store_with(&[
            game_start(&[1, 2, 3]),
            phase(1, "day_vote"),
            vote(2),
            vote(2),
            vote(3),
        ]);
        let tally: Vec<_> = store
            .snapshot()
            .vote_tally()
            .iter()
            .map(|(k, v)| (*k, *v))
            .collect();
        assert_eq!(tally, vec![(2, 2), (3, 1)]);
    }

    #[test]
    fn elimination_clears_tally_and_discloses_role() {
        let store = store_with(&[
            game_start(&[1, 2, 3]),
            phase(1, "day_vote"),
            vote(2),
            vote(2),
            vote(3),
            eliminated(2, "werewolf"),
        ]);
        let snap = store.snapshot();
        assert!(snap.vote_tally().is_empty());
        let p2 = snap.player(2).unwrap();
        assert!(!p2.is_alive());
        assert_eq!(p2.role().unwrap().label, "werewolf");
    }

    #[test]
    fn game_over_discloses_everyone_and_closes() {
        let mut store = store_with(&[game_start(&[1, 2, 3]), phase(1, "night")]);
        let effects = store.apply(&ServerMessage::GameOver(GameOverPayload {
            players: vec![info(1, "werewolf"), info(2, "seer"), info(3, "villager")],
            winner: Faction::Villager,
            message: String::new(),
        }));
        let snap = store.snapshot();
        assert_eq!(snap.phase(), Phase::Ended);
        assert_eq!(snap.winner(), Some(Faction::Villager));
        assert!(snap.players().iter().all(|p| p.role().is_some()));
        assert!(snap.players().iter().all(Player::is_alive));
        assert_eq!(effects.last(), Some(&Effect::CloseConnection));
        assert!(effects
            .iter()
            .any(|e| matches!(e, Effect::ShowResult { winner: Faction::Villager, .. })));
    }

    #[test]
    fn game_over_keeps_personalities_from_the_roster() {
        let mut store = GameStateStore::new();
        store.apply(&ServerMessage::GameStart(GameStartPayload {
            players: vec![
                PlayerInfo {
                    personality: Some("cautious".into()),
                    ..info(1, "seer")
                },
                PlayerInfo {
                    personality: Some("bold".into()),
                    ..info(2, "werewolf")
                },
            ],
            message: String::new(),
        }));
        store.apply(&phase(1, "night"));
        store.apply(&ServerMessage::GameOver(GameOverPayload {
            winner: Faction::Villager,
            players: vec![
                info(1, "seer"),
                PlayerInfo {
                    personality: Some("reckless".into()),
                    ..info(2, "werewolf")
                },
            ],
            message: String::new(),
        }));
        let snap = store.snapshot();
        assert_eq!(snap.player(1).unwrap().personality(), Some("cautious"));
        assert_eq!(snap.player(2).unwrap().personality(), Some("reckless"));
    }

    #[test]
    fn game_over_cannot_resurrect() {
        let mut store = store_with(&[game_start(&[1, 2]), phase(1, "night"), death(1, None)]);
        store.apply(&ServerMessage::GameOver(GameOverPayload {
            players: vec![info(1, "villager"), info(2, "werewolf")],
            winner: Faction::Werewolf,
            message: String::new(),
        }));
        assert!(!store.snapshot().player(1).unwrap().is_alive());
    }

    #[test]
    fn events_after_end_are_ignored() {
        let mut store = store_with(&[game_start(&[1, 2])]);
        store.apply(&ServerMessage::GameOver(GameOverPayload {
            players: vec![info(1, "villager"), info(2, "werewolf")],
            winner: Faction::Werewolf,
            message: String::new(),
        }));
        let before = Arc::clone(store.snapshot());
        assert!(store.apply(&phase(2, "night")).is_empty());
        assert!(store.apply(&death(1, None)).is_empty());
        assert!(Arc::ptr_eq(&before, store.snapshot()));
    }

    #[test]
    fn vote_for_unknown_or_dead_target_is_ignored() {
        let mut store = store_with(&[
            game_start(&[1, 2, 3]),
            phase(1, "night"),
            death(3, Some("seer")),
            phase(1, "day_vote"),
        ]);
        assert!(store.apply(&vote(42)).is_empty());
        assert!(store.apply(&vote(3)).is_empty());
        assert!(store.snapshot().vote_tally().is_empty());
    }

    #[test]
    fn vote_outside_day_vote_is_ignored() {
        let mut store = store_with(&[game_start(&[1, 2]), phase(1, "day_speech")]);
        assert!(store.apply(&vote(1)).is_empty());
        assert!(store.snapshot().vote_tally().is_empty());
    }

    #[test]
    fn vote_emits_pulse_and_log() {
        let mut store = store_with(&[game_start(&[1, 2]), phase(1, "day_vote")]);
        let effects = store.apply(&ServerMessage::Vote(VotePayload {
            player_id: Some(1),
            target: 2,
            message: String::new(),
        }));
        assert_eq!(
            effects,
            vec![
                Effect::VotePulse {
                    voter: Some(1),
                    target: 2
                },
                Effect::Log {
                    text: "1 -> 2".into(),
                    category: LogCategory::Vote
                },
            ]
        );
    }

    #[test]
    fn entering_day_vote_resets_tally() {
        let store = store_with(&[
            game_start(&[1, 2, 3]),
            phase(1, "day_vote"),
            vote(1),
            phase(2, "night"),
            phase(2, "day_vote"),
        ]);
        assert!(store.snapshot().vote_tally().is_empty());
    }

    #[test]
    fn unknown_phase_leaves_snapshot_but_logs() {
        let mut store = store_with(&[game_start(&[1]), phase(1, "night")]);
        let before = Arc::clone(store.snapshot());
        let effects = store.apply(&ServerMessage::PhaseChange(PhaseChangePayload {
            round: 3,
            phase: "twilight".into(),
            message: "something new".into(),
        }));
        assert_eq!(**store.snapshot(), *before);
        assert_eq!(
            effects,
            vec![Effect::Log {
                text: "something new".into(),
                category: LogCategory::Phase
            }]
        );
    }

    #[test]
    fn round_never_goes_backwards() {
        let store = store_with(&[game_start(&[1]), phase(3, "night"), phase(2, "day_speech")]);
        assert_eq!(store.snapshot().round(), 3);
        assert_eq!(store.snapshot().phase(), Phase::DaySpeech);
    }

    #[test]
    fn speaking_sets_single_speaker_and_phase_change_clears_it() {
        let mut store = store_with(&[game_start(&[1, 2]), phase(1, "day_speech")]);
        let effects = store.apply(&ServerMessage::Speaking(SpeakingPayload {
            player_id: 1,
            message: String::new(),
        }));
        assert_eq!(
            effects,
            vec![
                Effect::HighlightSpeaker { player_id: 1 },
                Effect::SpeechPending { player_id: 1 },
            ]
        );
        store.apply(&ServerMessage::Speaking(SpeakingPayload {
            player_id: 2,
            message: String::new(),
        }));
        assert_eq!(store.snapshot().active_speaker(), Some(2));

        let effects = store.apply(&phase(1, "day_vote"));
        assert_eq!(store.snapshot().active_speaker(), None);
        assert_eq!(effects.first(), Some(&Effect::ClearSpeechPanel));
    }

    #[test]
    fn speaking_outside_day_speech_is_ignored() {
        let mut store = store_with(&[game_start(&[1]), phase(1, "night")]);
        let effects = store.apply(&ServerMessage::Speaking(SpeakingPayload {
            player_id: 1,
            message: String::new(),
        }));
        assert!(effects.is_empty());
        assert_eq!(store.snapshot().active_speaker(), None);
    }

    #[test]
    fn speech_fills_panel_without_touching_snapshot() {
        let mut store = store_with(&[
            game_start(&[1]),
            phase(1, "day_speech"),
            ServerMessage::Speaking(SpeakingPayload {
                player_id: 1,
                message: String::new(),
            }),
        ]);
        let before = Arc::clone(store.snapshot());
        let effects = store.apply(&ServerMessage::Speech(SpeechPayload {
            player_id: 1,
            speech: "I am the seer".into(),
            thought: Some(String::new()),
            message: "1: I am the seer".into(),
        }));
        assert!(Arc::ptr_eq(&before, store.snapshot()));
        assert_eq!(
            effects,
            vec![
                Effect::ShowSpeech {
                    player_id: 1,
                    text: "I am the seer".into(),
                    rationale: None
                },
                Effect::Log {
                    text: "1: I am the seer".into(),
                    category: LogCategory::Speech
                },
            ]
        );
    }

    #[test]
    fn speech_without_speaker_is_logged_only() {
        let mut store = store_with(&[game_start(&[1]), phase(1, "day_speech")]);
        let effects = store.apply(&ServerMessage::Speech(SpeechPayload {
            player_id: 1,
            speech: "hello".into(),
            thought: Some("they suspect me".into()),
            message: String::new(),
        }));
        assert_eq!(
            effects,
            vec![Effect::Log {
                text: "1: hello".into(),
                category: LogCategory::Speech
            }]
        );
    }

    #[test]
    fn death_without_role_discloses_sealed_role() {
        let mut store = GameStateStore::new();
        store.apply(&ServerMessage::GameStart(GameStartPayload {
            players: vec![info(1, "seer"), info(2, "werewolf")],
            message: String::new(),
        }));
        store.apply(&phase(1, "night"));
        store.apply(&death(1, None));
        let snap = store.snapshot();
        assert_eq!(snap.player(1).unwrap().role().unwrap().key, "seer");
        assert!(snap.player(2).unwrap().role().is_none());
    }

    #[test]
    fn death_for_unknown_player_is_ignored() {
        let mut store = store_with(&[game_start(&[1]), phase(1, "night")]);
        assert!(store.apply(&death(9, Some("seer"))).is_empty());
    }

    #[test]
    fn vote_result_lists_counts() {
        let mut store = store_with(&[game_start(&[1, 2]), phase(1, "day_vote")]);
        let effects = store.apply(&ServerMessage::VoteResult(VoteResultPayload {
            counts: BTreeMap::from([(1, 1), (2, 3)]),
            message: "tally done".into(),
        }));
        let lines: Vec<_> = effects
            .iter()
            .filter_map(|e| match e {
                Effect::Log { text, .. } => Some(text.as_str()),
                _ => None,
            })
            .collect();
        assert_eq!(lines, vec!["tally done", "player 1: 1 vote", "player 2: 3 votes"]);
        assert!(store.snapshot().vote_tally().is_empty());
    }

    #[test]
    fn info_and_action_only_log() {
        let mut store = store_with(&[game_start(&[1])]);
        let before = Arc::clone(store.snapshot());
        let effects = store.apply(&ServerMessage::Info(InfoPayload {
            message: "quiet night".into(),
        }));
        assert_eq!(effects.len(), 1);
        let effects = store.apply(&ServerMessage::Action(ActionPayload {
            role: Some("witch".into()),
            message: String::new(),
        }));
        assert_eq!(
            effects,
            vec![Effect::Log {
                text: "witch is acting".into(),
                category: LogCategory::Action
            }]
        );
        assert!(Arc::ptr_eq(&before, store.snapshot()));
    }

    #[test]
    fn reset_returns_to_idle() {
        let mut store = store_with(&[game_start(&[1, 2]), phase(2, "day_vote"), vote(1)]);
        store.reset();
        assert_eq!(**store.snapshot(), GameSnapshot::default());
        assert!(!store.is_ended());
    }

    #[test]
    fn phase_labels_round_trip_through_from_str() {
        for phase in [Phase::Night, Phase::DaySpeech, Phase::DayVote] {
            assert_eq!(phase.as_str().parse::<Phase>(), Ok(phase));
        }
        assert!("idle".parse::<Phase>().is_err());
        assert!("ended".parse::<Phase>().is_err());
    }

    #[test]
    fn unknown_phase_label_is_a_std_error() {
        let err = "dusk".parse::<Phase>().unwrap_err();
        assert_eq!(err, UnknownPhase("dusk".into()));
        assert_eq!(err.to_string(), "unknown phase label `dusk`");
        let boxed: Box<dyn std::error::Error> = Box::new(err);
        assert!(boxed.source().is_none());
    }
}
