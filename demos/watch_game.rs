//! # Watch Game Example
//!
//! Connects to a running werewolf engine, starts a game and paints every
//! step to the terminal:
//!
//! 1. Open a WebSocket to the engine and send `start_game`
//! 2. Render the roster, speeches, votes and event log as events arrive
//! 3. Print the result when the game ends, or shut down on Ctrl+C
//!
//! ## Running
//!
//! ```sh
//! # Start the engine on localhost:8000, then:
//! cargo run --example watch_game
//!
//! # Point at another engine and forward an API key:
//! WEREWOLF_URL=ws://my-host:8000/ws WEREWOLF_API_KEY=sk-... cargo run --example watch_game
//! ```

use std::collections::BTreeMap;

use werewolf_client::presenter::present;
use werewolf_client::{
    ClientEvent, Faction, GameClient, GameClientConfig, LogCategory, Player, PlayerId,
    PresentationSink, WebSocketConnector,
};

/// Default engine URL when `WEREWOLF_URL` is not set.
const DEFAULT_URL: &str = "ws://localhost:8000/ws";

// ── Terminal sink ───────────────────────────────────────────────────

/// Paints to stdout. Only repaints the roster when it actually changed.
#[derive(Default)]
struct TerminalSink {
    last_roster: String,
    last_tally: BTreeMap<PlayerId, u32>,
}

fn card(player: &Player) -> String {
    let role = player.role().map_or("?", |r| r.label.as_str());
    let mark = if player.is_alive() { ' ' } else { 'x' };
    match player.personality() {
        Some(personality) => format!("[{mark}{}:{role} ({personality})]", player.id()),
        None => format!("[{mark}{}:{role}]", player.id()),
    }
}

impl PresentationSink for TerminalSink {
    fn render_roster(&mut self, players: &[Player], _reveal_roles: bool) {
        let line = players.iter().map(card).collect::<Vec<_>>().join(" ");
        if line != self.last_roster {
            println!("  roster {line}");
            self.last_roster = line;
        }
    }

    fn show_vote_tally(&mut self, tally: &BTreeMap<PlayerId, u32>) {
        if *tally != self.last_tally && !tally.is_empty() {
            let line = tally
                .iter()
                .map(|(id, n)| format!("{id}={n}"))
                .collect::<Vec<_>>()
                .join(" ");
            println!("  tally  {line}");
        }
        self.last_tally.clone_from(tally);
    }

    fn show_speech(&mut self, speaker: PlayerId, text: &str, rationale: Option<&str>) {
        println!("  #{speaker} says: {text}");
        if let Some(rationale) = rationale {
            println!("      (thinks: {rationale})");
        }
    }

    fn append_log(&mut self, text: &str, category: LogCategory) {
        println!("{:>7} | {text}", category.as_str());
    }

    fn show_result(&mut self, winner: Faction, final_roster: &[Player]) {
        println!("==== {winner} win ====");
        for player in final_roster {
            println!("  {}", card(player));
        }
    }

    fn show_speech_pending(&mut self, player_id: PlayerId) {
        println!("  #{player_id} is thinking...");
    }

    fn set_status(&mut self, status: &str) {
        tracing::info!("status: {status}");
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // ── Logging ─────────────────────────────────────────────────────
    // Set `RUST_LOG=werewolf_client=debug` for the session trace.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    // ── Configuration ───────────────────────────────────────────────
    let url = std::env::var("WEREWOLF_URL").unwrap_or_else(|_| DEFAULT_URL.to_string());
    let api_key = std::env::var("WEREWOLF_API_KEY").ok();
    tracing::info!("Connecting to {url}");

    let (mut client, mut events) =
        GameClient::new(WebSocketConnector::new(url), GameClientConfig::default());
    client.start(api_key).await?;

    // ── Event loop ──────────────────────────────────────────────────
    let mut sink = TerminalSink::default();
    loop {
        tokio::select! {
            event = events.recv() => {
                let Some(event) = event else {
                    break;
                };
                present(&event, &mut sink);
                if let ClientEvent::Disconnected { .. } = event {
                    break;
                }
            }

            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Ctrl+C received, shutting down");
                break;
            }
        }
    }

    // ── Cleanup ─────────────────────────────────────────────────────
    client.shutdown().await;
    Ok(())
}
