//! Wire-compatible protocol types for the werewolf game engine.
//!
//! The engine speaks JSON text frames. Every inbound message is an envelope
//! `{"type": <kind>, "data": <payload>}`; the client sends exactly one
//! outbound command per connection, `{"action": "start_game", "api_key": ...}`.
//!
//! Payload fields the engine always sends but the client can live without
//! (`message`, `reason`, `votes`, ...) are optional on decode so a sparse
//! message never drops an otherwise valid event.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

// ── Type aliases ────────────────────────────────────────────────────

/// Engine-assigned player identifier, unique within one game.
pub type PlayerId = u32;

// ── Enums ───────────────────────────────────────────────────────────

/// Winning side announced by `game_over`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Faction {
    Werewolf,
    Villager,
    /// A faction label this client does not know yet.
    #[serde(other)]
    Unknown,
}

impl Faction {
    /// Human-readable name for summaries and logs.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Werewolf => "werewolves",
            Self::Villager => "villagers",
            Self::Unknown => "unknown faction",
        }
    }
}

impl std::fmt::Display for Faction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

// ── Structs ─────────────────────────────────────────────────────────

/// A roster entry as sent in `game_start` and `game_over`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PlayerInfo {
    pub id: PlayerId,
    /// Human-readable role label.
    pub role: String,
    /// Stable role identifier used for iconography (e.g. `"seer"`).
    pub role_key: String,
    pub is_alive: bool,
    /// AI personality label, when the engine exposes it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub personality: Option<String>,
}

// ── Payload structs ─────────────────────────────────────────────────

/// Payload for `info` and the shared shape of plain announcements.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct InfoPayload {
    #[serde(default)]
    pub message: String,
}

/// Payload for `game_start`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct GameStartPayload {
    pub players: Vec<PlayerInfo>,
    #[serde(default)]
    pub message: String,
}

/// Payload for `phase_change`.
///
/// `phase` stays a raw label here; the reducer decides whether it names a
/// phase it understands.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PhaseChangePayload {
    pub round: u32,
    pub phase: String,
    #[serde(default)]
    pub message: String,
}

/// Payload for `action` (night-time role activity announcements).
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ActionPayload {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(default)]
    pub message: String,
}

/// Payload for `death`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DeathPayload {
    pub player_id: PlayerId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(default)]
    pub message: String,
}

/// Payload for `speaking`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SpeakingPayload {
    pub player_id: PlayerId,
    #[serde(default)]
    pub message: String,
}

/// Payload for `speech`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SpeechPayload {
    pub player_id: PlayerId,
    pub speech: String,
    /// The speaker's private rationale. The engine sends `""` when it has none.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thought: Option<String>,
    #[serde(default)]
    pub message: String,
}

/// Payload for `vote`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct VotePayload {
    /// The voter.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub player_id: Option<PlayerId>,
    pub target: PlayerId,
    #[serde(default)]
    pub message: String,
}

/// Payload for `vote_result`.
///
/// On the wire `counts` is a JSON object keyed by stringified player ids.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct VoteResultPayload {
    pub counts: BTreeMap<PlayerId, u32>,
    #[serde(default)]
    pub message: String,
}

/// Payload for `eliminated`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct EliminatedPayload {
    pub player_id: PlayerId,
    pub role: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub votes: Option<u32>,
    #[serde(default)]
    pub message: String,
}

/// Payload for `game_over`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct GameOverPayload {
    pub players: Vec<PlayerInfo>,
    pub winner: Faction,
    #[serde(default)]
    pub message: String,
}

// ── Messages ────────────────────────────────────────────────────────

/// Commands sent from client to engine.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Ask the engine to start a new game. MUST be the only message sent on
    /// a connection, immediately after it opens.
    StartGame {
        /// Credential forwarded to the engine; serialized as `null` when absent.
        api_key: Option<String>,
    },
}

/// Events sent from engine to client.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Free-form status line.
    Info(InfoPayload),
    /// Roster for a new game.
    GameStart(GameStartPayload),
    /// The engine moved to another round and/or phase.
    PhaseChange(PhaseChangePayload),
    /// A role is acting during the night.
    Action(ActionPayload),
    /// A player died during the night.
    Death(DeathPayload),
    /// A player is about to speak.
    Speaking(SpeakingPayload),
    /// A player's speech.
    Speech(SpeechPayload),
    /// One ballot.
    Vote(VotePayload),
    /// Final counts of the voting sub-round.
    VoteResult(VoteResultPayload),
    /// A player was voted out.
    Eliminated(EliminatedPayload),
    /// The game ended.
    GameOver(GameOverPayload),
}

impl ServerMessage {
    /// Every `type` value this client understands.
    pub const KINDS: [&'static str; 11] = [
        "info",
        "game_start",
        "phase_change",
        "action",
        "death",
        "speaking",
        "speech",
        "vote",
        "vote_result",
        "eliminated",
        "game_over",
    ];

    /// The wire `type` of this message.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Info(_) => "info",
            Self::GameStart(_) => "game_start",
            Self::PhaseChange(_) => "phase_change",
            Self::Action(_) => "action",
            Self::Death(_) => "death",
            Self::Speaking(_) => "speaking",
            Self::Speech(_) => "speech",
            Self::Vote(_) => "vote",
            Self::VoteResult(_) => "vote_result",
            Self::Eliminated(_) => "eliminated",
            Self::GameOver(_) => "game_over",
        }
    }

    /// Returns `true` if `kind` names a message this client can decode.
    pub fn is_known_kind(kind: &str) -> bool {
        Self::KINDS.contains(&kind)
    }
}
