#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::indexing_slicing,
    dead_code
)]
//! Shared test utilities for werewolf client integration tests.
//!
//! Provides a scripted [`MockTransport`], a [`MockConnector`] that hands one
//! out per connection, a [`RecordingSink`] and helpers that build engine
//! messages.

use std::collections::{BTreeMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as StdMutex};

use async_trait::async_trait;
use werewolf_client::protocol::{
    DeathPayload, EliminatedPayload, GameOverPayload, GameStartPayload, InfoPayload,
    PhaseChangePayload, PlayerInfo, ServerMessage, SpeakingPayload, SpeechPayload, VotePayload,
    VoteResultPayload,
};
use werewolf_client::{
    Connector, Faction, LogCategory, Player, PlayerId, PresentationSink, Transport, WerewolfError,
};

pub type Scripted = Option<Result<String, WerewolfError>>;

// ── MockTransport ───────────────────────────────────────────────────

/// Replays scripted engine messages in order and records what the client sends.
pub struct MockTransport {
    incoming: VecDeque<Scripted>,
    pub sent: Arc<StdMutex<Vec<String>>>,
    pub closed: Arc<AtomicBool>,
}

/// Inspection handles for one scripted connection.
#[derive(Clone)]
pub struct Wire {
    pub sent: Arc<StdMutex<Vec<String>>>,
    pub closed: Arc<AtomicBool>,
}

impl Wire {
    pub fn sent(&self) -> Vec<String> {
        self.sent.lock().unwrap().clone()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Relaxed)
    }
}

impl MockTransport {
    pub fn new(incoming: Vec<Scripted>) -> (Self, Wire) {
        let sent = Arc::new(StdMutex::new(Vec::new()));
        let closed = Arc::new(AtomicBool::new(false));
        let transport = Self {
            incoming: VecDeque::from(incoming),
            sent: Arc::clone(&sent),
            closed: Arc::clone(&closed),
        };
        (transport, Wire { sent, closed })
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn send(&mut self, message: String) -> Result<(), WerewolfError> {
        self.sent.lock().unwrap().push(message);
        Ok(())
    }

    async fn recv(&mut self) -> Option<Result<String, WerewolfError>> {
        if let Some(item) = self.incoming.pop_front() {
            item
        } else {
            // No more scripted messages: hang so the session stays open.
            std::future::pending().await
        }
    }

    async fn close(&mut self) -> Result<(), WerewolfError> {
        self.closed.store(true, Ordering::Relaxed);
        Ok(())
    }
}

// ── MockConnector ───────────────────────────────────────────────────

/// Hands out one scripted transport per `connect`; refuses once exhausted.
#[derive(Default)]
pub struct MockConnector {
    queue: StdMutex<VecDeque<MockTransport>>,
}

impl MockConnector {
    /// Queue one more connection and return its inspection handles.
    pub fn script(&self, incoming: Vec<Scripted>) -> Wire {
        let (transport, wire) = MockTransport::new(incoming);
        self.queue.lock().unwrap().push_back(transport);
        wire
    }
}

#[async_trait]
impl Connector for MockConnector {
    type Transport = MockTransport;

    async fn connect(&self) -> Result<MockTransport, WerewolfError> {
        self.queue.lock().unwrap().pop_front().ok_or_else(|| {
            WerewolfError::Io(std::io::Error::new(
                std::io::ErrorKind::ConnectionRefused,
                "engine unavailable",
            ))
        })
    }
}

// ── RecordingSink ───────────────────────────────────────────────────

/// One call made on a [`PresentationSink`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SinkCall {
    Roster {
        ids: Vec<PlayerId>,
        alive: Vec<bool>,
        roles: Vec<Option<String>>,
        reveal_roles: bool,
    },
    Tally(BTreeMap<PlayerId, u32>),
    Speech {
        speaker: PlayerId,
        text: String,
        rationale: Option<String>,
    },
    Log {
        text: String,
        category: LogCategory,
    },
    Result {
        winner: Faction,
        roster: Vec<PlayerId>,
    },
    HidePreGame,
    ClearSpeech,
    Highlight(PlayerId),
    SpeechPending(PlayerId),
    Pulse {
        voter: Option<PlayerId>,
        target: PlayerId,
    },
    Status(String),
    Reset,
}

/// Records every presentation call in order.
#[derive(Debug, Default)]
pub struct RecordingSink {
    pub calls: Vec<SinkCall>,
}

impl RecordingSink {
    pub fn logs(&self) -> Vec<&str> {
        self.calls
            .iter()
            .filter_map(|c| match c {
                SinkCall::Log { text, .. } => Some(text.as_str()),
                _ => None,
            })
            .collect()
    }
}

impl PresentationSink for RecordingSink {
    fn render_roster(&mut self, players: &[Player], reveal_roles: bool) {
        self.calls.push(SinkCall::Roster {
            ids: players.iter().map(Player::id).collect(),
            alive: players.iter().map(Player::is_alive).collect(),
            roles: players
                .iter()
                .map(|p| p.role().map(|r| r.label.clone()))
                .collect(),
            reveal_roles,
        });
    }

    fn show_vote_tally(&mut self, tally: &BTreeMap<PlayerId, u32>) {
        self.calls.push(SinkCall::Tally(tally.clone()));
    }

    fn show_speech(&mut self, speaker: PlayerId, text: &str, rationale: Option<&str>) {
        self.calls.push(SinkCall::Speech {
            speaker,
            text: text.to_string(),
            rationale: rationale.map(str::to_string),
        });
    }

    fn append_log(&mut self, text: &str, category: LogCategory) {
        self.calls.push(SinkCall::Log {
            text: text.to_string(),
            category,
        });
    }

    fn show_result(&mut self, winner: Faction, final_roster: &[Player]) {
        self.calls.push(SinkCall::Result {
            winner,
            roster: final_roster.iter().map(Player::id).collect(),
        });
    }

    fn hide_pre_game_controls(&mut self) {
        self.calls.push(SinkCall::HidePreGame);
    }

    fn clear_speech_panel(&mut self) {
        self.calls.push(SinkCall::ClearSpeech);
    }

    fn highlight_speaker(&mut self, player_id: PlayerId) {
        self.calls.push(SinkCall::Highlight(player_id));
    }

    fn show_speech_pending(&mut self, player_id: PlayerId) {
        self.calls.push(SinkCall::SpeechPending(player_id));
    }

    fn pulse_vote(&mut self, voter: Option<PlayerId>, target: PlayerId) {
        self.calls.push(SinkCall::Pulse { voter, target });
    }

    fn set_status(&mut self, status: &str) {
        self.calls.push(SinkCall::Status(status.to_string()));
    }

    fn reset(&mut self) {
        self.calls.push(SinkCall::Reset);
    }
}

// ── Message builders ────────────────────────────────────────────────

pub fn player(id: PlayerId, role: &str) -> PlayerInfo {
    PlayerInfo {
        id,
        role: role.to_string(),
        role_key: role.to_string(),
        is_alive: true,
        personality: None,
    }
}

pub fn info(message: &str) -> ServerMessage {
    ServerMessage::Info(InfoPayload {
        message: message.into(),
    })
}

pub fn game_start(players: Vec<PlayerInfo>) -> ServerMessage {
    ServerMessage::GameStart(GameStartPayload {
        players,
        message: "game on".into(),
    })
}

pub fn phase_change(round: u32, phase: &str) -> ServerMessage {
    ServerMessage::PhaseChange(PhaseChangePayload {
        round,
        phase: phase.into(),
        message: format!("round {round} {phase}"),
    })
}

pub fn death(player_id: PlayerId, role: Option<&str>) -> ServerMessage {
    ServerMessage::Death(DeathPayload {
        player_id,
        role: role.map(str::to_string),
        reason: Some("killed by werewolves".into()),
        message: String::new(),
    })
}

pub fn speaking(player_id: PlayerId) -> ServerMessage {
    ServerMessage::Speaking(SpeakingPayload {
        player_id,
        message: String::new(),
    })
}

pub fn speech(player_id: PlayerId, text: &str, thought: &str) -> ServerMessage {
    ServerMessage::Speech(SpeechPayload {
        player_id,
        speech: text.into(),
        thought: Some(thought.into()),
        message: String::new(),
    })
}

pub fn vote(voter: PlayerId, target: PlayerId) -> ServerMessage {
    ServerMessage::Vote(VotePayload {
        player_id: Some(voter),
        target,
        message: String::new(),
    })
}

pub fn vote_result(counts: &[(PlayerId, u32)]) -> ServerMessage {
    ServerMessage::VoteResult(VoteResultPayload {
        counts: counts.iter().copied().collect(),
        message: String::new(),
    })
}

pub fn eliminated(player_id: PlayerId, role: &str) -> ServerMessage {
    ServerMessage::Eliminated(EliminatedPayload {
        player_id,
        role: role.into(),
        votes: None,
        message: String::new(),
    })
}

pub fn game_over(players: Vec<PlayerInfo>, winner: Faction) -> ServerMessage {
    ServerMessage::GameOver(GameOverPayload {
        players,
        winner,
        message: String::new(),
    })
}

/// Serialize a message as the engine would put it on the wire.
pub fn wire(msg: &ServerMessage) -> Scripted {
    Some(Ok(serde_json::to_string(msg).expect("serialize engine message")))
}
