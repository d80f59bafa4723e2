//! # Scripted Game Example
//!
//! Runs a whole game without a network: a [`Connector`] hands the client an
//! in-process loopback [`Transport`] whose other end is a tiny scripted
//! engine. Useful as a template for driving front ends in tests.
//!
//! ## Running
//!
//! ```sh
//! cargo run --example scripted_game
//! ```

use async_trait::async_trait;
use serde_json::json;
use tokio::sync::mpsc;
use werewolf_client::{
    ClientEvent, Connector, Effect, GameClient, GameClientConfig, Transport, WerewolfError,
};

// ── Loopback transport ──────────────────────────────────────────────

/// Client half of an in-process channel pair.
struct LoopbackTransport {
    tx: mpsc::UnboundedSender<String>,
    rx: mpsc::UnboundedReceiver<String>,
}

#[async_trait]
impl Transport for LoopbackTransport {
    async fn send(&mut self, message: String) -> Result<(), WerewolfError> {
        self.tx
            .send(message)
            .map_err(|e| WerewolfError::TransportSend(e.to_string()))
    }

    async fn recv(&mut self) -> Option<Result<String, WerewolfError>> {
        self.rx.recv().await.map(Ok)
    }

    async fn close(&mut self) -> Result<(), WerewolfError> {
        self.rx.close();
        Ok(())
    }
}

// ── Scripted engine ─────────────────────────────────────────────────

/// Spawns a fresh scripted engine for every connection.
struct ScriptedEngine;

fn script() -> Vec<serde_json::Value> {
    let roster = |dead: &[u32]| {
        [
            (1, "werewolf"),
            (2, "seer"),
            (3, "villager"),
            (4, "villager"),
        ]
        .iter()
        .map(|(id, role)| {
            json!({"id": id, "role": role, "role_key": role, "is_alive": !dead.contains(id)})
        })
        .collect::<Vec<_>>()
    };
    vec![
        json!({"type": "game_start", "data": {"players": roster(&[]), "message": "Game on"}}),
        json!({"type": "phase_change", "data": {"round": 1, "phase": "night", "message": "Night 1 falls"}}),
        json!({"type": "action", "data": {"role": "werewolf", "message": "The wolves choose a victim"}}),
        json!({"type": "death", "data": {"player_id": 2, "reason": "killed by werewolves", "message": "Player 2 was found dead"}}),
        json!({"type": "phase_change", "data": {"round": 1, "phase": "day_speech", "message": "Day 1 discussion"}}),
        json!({"type": "speaking", "data": {"player_id": 3}}),
        json!({"type": "speech", "data": {"player_id": 3, "speech": "Player 1 was too quiet.", "thought": "1 dodged every question"}}),
        json!({"type": "phase_change", "data": {"round": 1, "phase": "day_vote", "message": "Day 1 vote"}}),
        json!({"type": "vote", "data": {"player_id": 3, "target": 1}}),
        json!({"type": "vote", "data": {"player_id": 4, "target": 1}}),
        json!({"type": "vote", "data": {"player_id": 1, "target": 3}}),
        json!({"type": "vote_result", "data": {"counts": {"1": 2, "3": 1}, "message": "The village has spoken"}}),
        json!({"type": "eliminated", "data": {"player_id": 1, "role": "werewolf", "votes": 2}}),
        json!({"type": "game_over", "data": {"winner": "villager", "players": roster(&[1, 2]), "message": "The villagers win"}}),
    ]
}

#[async_trait]
impl Connector for ScriptedEngine {
    type Transport = LoopbackTransport;

    async fn connect(&self) -> Result<LoopbackTransport, WerewolfError> {
        let (client_tx, mut engine_rx) = mpsc::unbounded_channel::<String>();
        let (engine_tx, client_rx) = mpsc::unbounded_channel::<String>();

        tokio::spawn(async move {
            let Some(command) = engine_rx.recv().await else {
                return;
            };
            tracing::info!("engine received {command}");
            for event in script() {
                if engine_tx.send(event.to_string()).is_err() {
                    return;
                }
            }
        });

        Ok(LoopbackTransport {
            tx: client_tx,
            rx: client_rx,
        })
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let (mut client, mut events) = GameClient::new(ScriptedEngine, GameClientConfig::default());
    client.start(None).await?;

    while let Some(event) = events.recv().await {
        match event {
            ClientEvent::Updated { snapshot, effects } => {
                for effect in &effects {
                    if let Effect::Log { text, category } = effect {
                        println!("{:>7} | {text}", category.as_str());
                    }
                }
                println!(
                    "        round {} / {} / alive {}",
                    snapshot.round(),
                    snapshot.phase(),
                    snapshot.alive_players().count()
                );
            }
            ClientEvent::Disconnected { reason } => {
                println!("disconnected: {}", reason.as_deref().unwrap_or("engine closed"));
                break;
            }
            other => tracing::debug!("event: {other:?}"),
        }
    }

    let snapshot = client.snapshot();
    if let Some(winner) = snapshot.winner() {
        println!("winner: {winner}");
    }
    client.shutdown().await;
    Ok(())
}
