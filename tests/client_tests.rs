#![cfg(feature = "tokio-runtime")]
#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::indexing_slicing
)]
//! End-to-end client tests against scripted engine connections.
//!
//! Each test queues one or more connections on a `MockConnector`, drives the
//! `GameClient` through its lifecycle and replays the resulting events into a
//! `RecordingSink`, the way a real front end would.

mod common;

use std::time::Duration;

use tokio::sync::mpsc::Receiver;
use tokio_test::{assert_err, assert_ok};
use werewolf_client::presenter::present;
use werewolf_client::{
    ClientEvent, ClientMessage, ConnectionState, Faction, GameClient, GameClientConfig, Phase,
    WerewolfError,
};

use common::{
    death, eliminated, game_over, game_start, info, phase_change, player, speaking, speech, vote,
    vote_result, wire, MockConnector, RecordingSink, SinkCall,
};

// ════════════════════════════════════════════════════════════════════
// Helpers
// ════════════════════════════════════════════════════════════════════

async fn next(events: &mut Receiver<ClientEvent>) -> ClientEvent {
    tokio::time::timeout(Duration::from_secs(2), events.recv())
        .await
        .expect("timed out waiting for client event")
        .expect("event channel closed")
}

/// Presents events into `sink` until a `Disconnected` arrives.
async fn present_until_disconnected(
    events: &mut Receiver<ClientEvent>,
    sink: &mut RecordingSink,
) -> Option<String> {
    loop {
        let event = next(events).await;
        present(&event, sink);
        if let ClientEvent::Disconnected { reason } = event {
            return reason;
        }
    }
}

fn five_players() -> Vec<werewolf_client::protocol::PlayerInfo> {
    vec![
        player(1, "werewolf"),
        player(2, "seer"),
        player(3, "villager"),
        player(4, "witch"),
        player(5, "villager"),
    ]
}

// ════════════════════════════════════════════════════════════════════
// Start command
// ════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn start_command_carries_null_when_no_key() {
    let connector = MockConnector::default();
    let wire_handles = connector.script(vec![]);
    let (mut client, mut events) = GameClient::new(connector, GameClientConfig::default());

    assert_ok!(client.start(None).await);
    assert!(matches!(next(&mut events).await, ClientEvent::Connected { .. }));

    let sent = wire_handles.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0], r#"{"action":"start_game","api_key":null}"#);
    let parsed: ClientMessage = serde_json::from_str(&sent[0]).unwrap();
    assert_eq!(parsed, ClientMessage::StartGame { api_key: None });

    client.shutdown().await;
}

#[tokio::test]
async fn second_start_while_open_sends_nothing() {
    let connector = MockConnector::default();
    let wire_handles = connector.script(vec![]);
    let (mut client, _events) = GameClient::new(connector, GameClientConfig::default());

    assert_ok!(client.start(Some("sk-1".into())).await);
    let err = assert_err!(client.start(Some("sk-2".into())).await);
    assert!(matches!(err, WerewolfError::AlreadyActive));
    assert_eq!(wire_handles.sent().len(), 1);

    client.shutdown().await;
}

#[tokio::test]
async fn unreachable_engine_reports_error_and_stays_idle() {
    let (mut client, _events) =
        GameClient::new(MockConnector::default(), GameClientConfig::default());

    let err = assert_err!(client.start(None).await);
    assert!(matches!(err, WerewolfError::Io(_)));
    assert_eq!(client.connection_state(), ConnectionState::Disconnected);
    assert!(client.session_id().await.is_none());
}

// ════════════════════════════════════════════════════════════════════
// Full games
// ════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn full_game_reaches_result_and_closes() {
    let connector = MockConnector::default();
    let wire_handles = connector.script(vec![
        wire(&info("connecting AI players")),
        wire(&game_start(five_players())),
        wire(&phase_change(1, "night")),
        wire(&death(3, Some("villager"))),
        wire(&phase_change(1, "day_speech")),
        wire(&speaking(1)),
        wire(&speech(1, "I saw nothing.", "keep a low profile")),
        wire(&phase_change(1, "day_vote")),
        wire(&vote(1, 2)),
        wire(&vote(2, 1)),
        wire(&vote(4, 2)),
        wire(&vote(5, 2)),
        wire(&vote_result(&[(1, 1), (2, 3)])),
        wire(&eliminated(2, "seer")),
        wire(&game_over(
            {
                let mut roster = five_players();
                roster[1].is_alive = false;
                roster[2].is_alive = false;
                roster
            },
            Faction::Werewolf,
        )),
    ]);
    let (mut client, mut events) = GameClient::new(connector, GameClientConfig::default());
    assert_ok!(client.start(None).await);

    let mut sink = RecordingSink::default();
    let reason = present_until_disconnected(&mut events, &mut sink).await;
    assert_eq!(reason.as_deref(), Some("game over"));
    assert!(wire_handles.is_closed());
    client.shutdown().await;
    assert_eq!(client.connection_state(), ConnectionState::Disconnected);

    let snap = client.snapshot();
    assert_eq!(snap.phase(), Phase::Ended);
    assert_eq!(snap.winner(), Some(Faction::Werewolf));
    assert!(snap.players().iter().all(|p| p.role().is_some()));
    assert_eq!(
        snap.alive_players().map(|p| p.id()).collect::<Vec<_>>(),
        vec![1, 4, 5]
    );

    assert!(sink.calls.contains(&SinkCall::HidePreGame));
    assert!(sink.calls.contains(&SinkCall::Highlight(1)));
    assert!(sink.calls.contains(&SinkCall::Speech {
        speaker: 1,
        text: "I saw nothing.".into(),
        rationale: Some("keep a low profile".into()),
    }));
    assert!(sink.calls.contains(&SinkCall::Pulse {
        voter: Some(4),
        target: 2
    }));
    assert!(sink.calls.contains(&SinkCall::Result {
        winner: Faction::Werewolf,
        roster: vec![1, 2, 3, 4, 5],
    }));
    assert_eq!(
        sink.calls.last(),
        Some(&SinkCall::Status("disconnected: game over".into()))
    );
}

#[tokio::test]
async fn slow_consumer_still_sees_every_update() {
    let connector = MockConnector::default();
    let mut script = vec![
        wire(&game_start(five_players())),
        wire(&phase_change(1, "night")),
    ];
    script.extend((1..=5).map(|n| wire(&info(&format!("night murmur {n}")))));
    script.push(wire(&game_over(five_players(), Faction::Villager)));
    connector.script(script);
    let config = GameClientConfig::default().with_event_channel_capacity(1);
    let (mut client, mut events) = GameClient::new(connector, config);
    assert_ok!(client.start(None).await);

    // The engine is far ahead by the time the front end starts drawing.
    tokio::time::sleep(Duration::from_millis(200)).await;
    let mut sink = RecordingSink::default();
    let mut updates = 0;
    let reason = loop {
        let event = next(&mut events).await;
        present(&event, &mut sink);
        match event {
            ClientEvent::Updated { .. } => updates += 1,
            ClientEvent::Disconnected { reason } => break reason,
            _ => {}
        }
    };

    assert_eq!(reason.as_deref(), Some("game over"));
    assert_eq!(updates, 8);
    for n in 1..=5 {
        let text = format!("night murmur {n}");
        assert!(
            sink.calls
                .iter()
                .any(|c| matches!(c, SinkCall::Log { text: t, .. } if *t == text)),
            "missing log line `{text}`"
        );
    }
    assert!(sink.calls.contains(&SinkCall::Result {
        winner: Faction::Villager,
        roster: vec![1, 2, 3, 4, 5],
    }));
}

#[tokio::test]
async fn vote_tally_is_painted_before_elimination_clears_it() {
    let connector = MockConnector::default();
    connector.script(vec![
        wire(&game_start(five_players())),
        wire(&phase_change(1, "day_vote")),
        wire(&vote(1, 2)),
        wire(&vote(3, 2)),
        wire(&eliminated(2, "seer")),
        None,
    ]);
    let (mut client, mut events) = GameClient::new(connector, GameClientConfig::default());
    assert_ok!(client.start(None).await);

    let mut sink = RecordingSink::default();
    let reason = present_until_disconnected(&mut events, &mut sink).await;
    assert_eq!(reason, None);

    let tallies: Vec<_> = sink
        .calls
        .iter()
        .filter_map(|c| match c {
            SinkCall::Tally(t) => Some(t.get(&2).copied().unwrap_or(0)),
            _ => None,
        })
        .collect();
    // game_start, day_vote, two votes, elimination.
    assert_eq!(tallies, vec![0, 0, 1, 2, 0]);
}

#[tokio::test]
async fn roles_stay_masked_until_death_while_connected() {
    let connector = MockConnector::default();
    connector.script(vec![
        wire(&game_start(five_players())),
        wire(&phase_change(1, "night")),
        wire(&death(4, None)),
    ]);
    let (mut client, mut events) = GameClient::new(connector, GameClientConfig::default());
    assert_ok!(client.start(None).await);

    let mut sink = RecordingSink::default();
    for _ in 0..4 {
        present(&next(&mut events).await, &mut sink);
    }
    let Some(SinkCall::Roster {
        roles,
        reveal_roles,
        ..
    }) = sink
        .calls
        .iter()
        .rev()
        .find(|c| matches!(c, SinkCall::Roster { .. }))
    else {
        panic!("no roster painted");
    };
    assert!(!reveal_roles);
    assert_eq!(
        roles,
        &vec![None, None, None, Some("witch".to_string()), None]
    );

    client.shutdown().await;
}

// ════════════════════════════════════════════════════════════════════
// Robustness
// ════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn garbage_between_events_does_not_disturb_the_game() {
    let connector = MockConnector::default();
    connector.script(vec![
        wire(&game_start(five_players())),
        Some(Ok("<html>502</html>".into())),
        Some(Ok(r#"{"type":"chat","data":{"text":"hi"}}"#.into())),
        Some(Ok(r#"{"type":"death","data":{"player_id":"three"}}"#.into())),
        wire(&phase_change(1, "night")),
    ]);
    let (mut client, mut events) = GameClient::new(connector, GameClientConfig::default());
    assert_ok!(client.start(None).await);

    assert!(matches!(next(&mut events).await, ClientEvent::Connected { .. }));
    assert!(matches!(next(&mut events).await, ClientEvent::Updated { .. }));
    match next(&mut events).await {
        ClientEvent::Updated { snapshot, .. } => {
            assert_eq!(snapshot.phase(), Phase::Night);
            assert_eq!(snapshot.alive_players().count(), 5);
        }
        other => panic!("expected night update, got {other:?}"),
    }
    assert!(client.is_connected());

    client.shutdown().await;
}

#[tokio::test]
async fn receive_error_is_reported_without_closing() {
    let connector = MockConnector::default();
    let wire_handles = connector.script(vec![
        Some(Err(WerewolfError::TransportReceive("reset by peer".into()))),
        wire(&info("still here")),
    ]);
    let (mut client, mut events) = GameClient::new(connector, GameClientConfig::default());
    assert_ok!(client.start(None).await);

    let mut sink = RecordingSink::default();
    for _ in 0..3 {
        present(&next(&mut events).await, &mut sink);
    }
    assert!(sink
        .calls
        .iter()
        .any(|c| matches!(c, SinkCall::Status(s) if s.starts_with("connection error"))));
    assert_eq!(sink.logs(), vec!["still here"]);
    assert!(!wire_handles.is_closed());
    assert!(client.is_connected());

    client.shutdown().await;
}

// ════════════════════════════════════════════════════════════════════
// Restart and shutdown
// ════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn restart_reuses_key_and_clears_the_view() {
    let connector = MockConnector::default();
    let first = connector.script(vec![
        wire(&game_start(five_players())),
        wire(&phase_change(2, "day_vote")),
        wire(&vote(1, 3)),
    ]);
    let second = connector.script(vec![]);
    let (mut client, mut events) = GameClient::new(connector, GameClientConfig::default());
    assert_ok!(client.start(Some("sk-live".into())).await);

    for _ in 0..4 {
        next(&mut events).await;
    }
    assert_eq!(client.snapshot().vote_tally().get(&3), Some(&1));

    assert_ok!(client.restart().await);
    assert!(first.is_closed());

    let mut sink = RecordingSink::default();
    let mut saw_reset = false;
    loop {
        let event = next(&mut events).await;
        present(&event, &mut sink);
        match event {
            ClientEvent::Reset => saw_reset = true,
            ClientEvent::Connected { .. } => break,
            _ => {}
        }
    }
    assert!(saw_reset);
    assert!(sink.calls.contains(&SinkCall::Reset));

    let snap = client.snapshot();
    assert!(snap.players().is_empty());
    assert!(snap.vote_tally().is_empty());
    assert_eq!(snap.round(), 1);
    assert_eq!(snap.phase(), Phase::Idle);

    assert_eq!(
        second.sent(),
        vec![r#"{"action":"start_game","api_key":"sk-live"}"#.to_string()]
    );

    client.shutdown().await;
}

#[tokio::test]
async fn shutdown_closes_transport_and_reports_reason() {
    let connector = MockConnector::default();
    let wire_handles = connector.script(vec![wire(&game_start(five_players()))]);
    let (mut client, mut events) = GameClient::new(connector, GameClientConfig::default());
    assert_ok!(client.start(None).await);
    next(&mut events).await;
    next(&mut events).await;

    client.shutdown().await;
    assert!(wire_handles.is_closed());
    match next(&mut events).await {
        ClientEvent::Disconnected { reason } => {
            assert_eq!(reason.as_deref(), Some("client shut down"));
        }
        other => panic!("expected Disconnected, got {other:?}"),
    }
    // The last game stays visible after the connection is gone.
    assert_eq!(client.snapshot().players().len(), 5);
}

#[tokio::test]
async fn snapshot_watch_sees_latest_state() {
    let connector = MockConnector::default();
    connector.script(vec![
        wire(&game_start(five_players())),
        wire(&phase_change(1, "night")),
    ]);
    let (mut client, mut events) = GameClient::new(connector, GameClientConfig::default());
    let mut watch = client.subscribe();
    assert_ok!(client.start(None).await);

    for _ in 0..3 {
        next(&mut events).await;
    }
    assert_ok!(watch.changed().await);
    assert_eq!(watch.borrow_and_update().phase(), Phase::Night);

    client.shutdown().await;
}
