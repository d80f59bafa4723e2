#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::indexing_slicing
)]
//! Properties of the reducer over arbitrary engine event sequences, plus the
//! reference scenarios driven through the JSON dispatcher.

mod common;

use std::collections::BTreeMap;
use std::sync::Arc;

use proptest::prelude::*;
use werewolf_client::protocol::ServerMessage;
use werewolf_client::state::reduce;
use werewolf_client::{
    Effect, EventDispatcher, Faction, GameSnapshot, GameStateStore, Phase, PlayerId,
};

use common::{
    death, eliminated, game_over, game_start, info, phase_change, player, speaking, speech, vote,
    vote_result,
};

// ════════════════════════════════════════════════════════════════════
// Generators
// ════════════════════════════════════════════════════════════════════

/// Ids 1..=5 are on the roster; 6 never is.
fn any_id() -> impl Strategy<Value = PlayerId> {
    1u32..=6
}

fn any_phase_label() -> impl Strategy<Value = &'static str> {
    prop_oneof![
        Just("night"),
        Just("day_speech"),
        Just("day_vote"),
        Just("dusk"),
    ]
}

fn roster() -> Vec<werewolf_client::protocol::PlayerInfo> {
    vec![
        player(1, "werewolf"),
        player(2, "werewolf"),
        player(3, "seer"),
        player(4, "witch"),
        player(5, "villager"),
    ]
}

fn any_event() -> impl Strategy<Value = ServerMessage> {
    prop_oneof![
        2 => "[a-z ]{0,12}".prop_map(|m| info(&m)),
        4 => (0u32..6, any_phase_label()).prop_map(|(r, p)| phase_change(r, p)),
        2 => (any_id(), proptest::option::of(Just("hunter"))).prop_map(|(id, role)| death(id, role)),
        2 => any_id().prop_map(speaking),
        2 => any_id().prop_map(|id| speech(id, "words", "")),
        6 => (any_id(), any_id()).prop_map(|(v, t)| vote(v, t)),
        1 => (any_id(), 0u32..4).prop_map(|(id, n)| vote_result(&[(id, n)])),
        2 => any_id().prop_map(|id| eliminated(id, "villager")),
        1 => Just(game_start(vec![player(9, "villager")])),
        1 => Just(game_over(roster(), Faction::Villager)),
    ]
}

/// A game: the roster first, then arbitrary engine traffic.
fn any_game() -> impl Strategy<Value = Vec<ServerMessage>> {
    proptest::collection::vec(any_event(), 0..60).prop_map(|mut events| {
        events.insert(0, game_start(roster()));
        events
    })
}

fn snapshots(events: &[ServerMessage]) -> Vec<GameSnapshot> {
    let mut out = vec![GameSnapshot::default()];
    for event in events {
        let next = reduce(out.last().unwrap(), event).snapshot;
        out.push(next);
    }
    out
}

// ════════════════════════════════════════════════════════════════════
// Properties
// ════════════════════════════════════════════════════════════════════

proptest! {
    #[test]
    fn dead_players_stay_dead(events in any_game()) {
        let history = snapshots(&events);
        for (event, pair) in events.iter().zip(history.windows(2)) {
            // A roster accepted in idle starts a different game.
            if matches!(event, ServerMessage::GameStart(_)) {
                continue;
            }
            let (before, after) = (&pair[0], &pair[1]);
            for p in before.players().iter().filter(|p| !p.is_alive()) {
                if let Some(later) = after.player(p.id()) {
                    prop_assert!(!later.is_alive(), "player {} came back", p.id());
                }
            }
        }
    }

    #[test]
    fn tally_is_the_replay_of_votes_since_last_reset(events in any_game()) {
        let mut current = GameSnapshot::default();
        let mut expected: BTreeMap<PlayerId, u32> = BTreeMap::new();
        for event in &events {
            let ended = current.phase() == Phase::Ended;
            match event {
                _ if ended => {}
                ServerMessage::GameStart(_) if current.phase() == Phase::Idle => expected.clear(),
                ServerMessage::PhaseChange(p) if p.phase == "day_vote" => expected.clear(),
                ServerMessage::Eliminated(e) if current.player(e.player_id).is_some() => {
                    expected.clear();
                }
                ServerMessage::Vote(v)
                    if current.phase() == Phase::DayVote
                        && current.player(v.target).is_some_and(|p| p.is_alive()) =>
                {
                    *expected.entry(v.target).or_insert(0) += 1;
                }
                _ => {}
            }
            current = reduce(&current, event).snapshot;
            prop_assert_eq!(current.vote_tally(), &expected);
        }
    }

    #[test]
    fn roles_are_masked_for_the_living_until_the_end(events in any_game()) {
        for snap in snapshots(&events) {
            if snap.phase() == Phase::Ended {
                prop_assert!(snap.players().iter().all(|p| p.role().is_some()));
                continue;
            }
            for p in snap.players() {
                prop_assert_eq!(p.role().is_some(), !p.is_alive());
            }
        }
    }

    #[test]
    fn at_most_one_speaker_and_round_never_decreases(events in any_game()) {
        let history = snapshots(&events);
        for pair in history.windows(2) {
            prop_assert!(pair[1].round() >= pair[0].round());
            if let Some(id) = pair[1].active_speaker() {
                prop_assert!(pair[1].player(id).is_some());
            }
        }
    }

    #[test]
    fn unknown_kinds_change_nothing(events in any_game(), kind in "[a-z_]{3,12}") {
        prop_assume!(!ServerMessage::is_known_kind(&kind));
        let mut dispatcher = EventDispatcher::new(GameStateStore::new());
        for event in &events {
            dispatcher.dispatch_text(&serde_json::to_string(event).unwrap()).unwrap();
        }
        let before = Arc::clone(dispatcher.store().snapshot());
        let text = format!(r#"{{"type":"{kind}","data":{{"player_id":1}}}}"#);
        let effects = dispatcher.dispatch_text(&text).unwrap();
        prop_assert!(effects.is_empty());
        prop_assert!(Arc::ptr_eq(&before, dispatcher.store().snapshot()));
    }
}

// ════════════════════════════════════════════════════════════════════
// Reference scenarios, fed as engine JSON
// ════════════════════════════════════════════════════════════════════

fn feed(dispatcher: &mut EventDispatcher, text: &str) -> Vec<Effect> {
    dispatcher.dispatch_text(text).unwrap()
}

fn scenario_b() -> EventDispatcher {
    let mut d = EventDispatcher::default();
    feed(
        &mut d,
        r#"{"type":"game_start","data":{"players":[
            {"id":1,"role":"villager","role_key":"villager","is_alive":true},
            {"id":2,"role":"werewolf","role_key":"werewolf","is_alive":true},
            {"id":3,"role":"seer","role_key":"seer","is_alive":true}]}}"#,
    );
    feed(&mut d, r#"{"type":"phase_change","data":{"round":1,"phase":"day_vote"}}"#);
    feed(&mut d, r#"{"type":"vote","data":{"target":2}}"#);
    feed(&mut d, r#"{"type":"vote","data":{"target":2}}"#);
    feed(&mut d, r#"{"type":"vote","data":{"target":3}}"#);
    d
}

#[test]
fn scenario_a_roster_is_masked() {
    let mut d = EventDispatcher::default();
    feed(
        &mut d,
        r#"{"type":"game_start","data":{"players":[
            {"id":1,"role":"villager","role_key":"villager","is_alive":true},
            {"id":2,"role":"werewolf","role_key":"werewolf","is_alive":true},
            {"id":3,"role":"seer","role_key":"seer","is_alive":true}]}}"#,
    );
    let snap = d.store().snapshot();
    assert_eq!(snap.players().len(), 3);
    assert!(snap.players().iter().all(|p| p.is_alive() && p.role().is_none()));
}

#[test]
fn scenario_b_votes_accumulate() {
    let d = scenario_b();
    assert_eq!(
        d.store().snapshot().vote_tally(),
        &BTreeMap::from([(2, 2), (3, 1)])
    );
}

#[test]
fn scenario_c_elimination_clears_tally() {
    let mut d = scenario_b();
    feed(
        &mut d,
        r#"{"type":"eliminated","data":{"player_id":2,"role":"werewolf"}}"#,
    );
    let snap = d.store().snapshot();
    assert!(snap.vote_tally().is_empty());
    let p2 = snap.player(2).unwrap();
    assert!(!p2.is_alive());
    assert_eq!(p2.role().unwrap().label, "werewolf");
}

#[test]
fn scenario_d_game_over_discloses_all_and_closes() {
    let mut d = scenario_b();
    feed(
        &mut d,
        r#"{"type":"eliminated","data":{"player_id":2,"role":"werewolf"}}"#,
    );
    let effects = feed(
        &mut d,
        r#"{"type":"game_over","data":{"winner":"villager","players":[
            {"id":1,"role":"villager","role_key":"villager","is_alive":true},
            {"id":2,"role":"werewolf","role_key":"werewolf","is_alive":false},
            {"id":3,"role":"seer","role_key":"seer","is_alive":true}]}}"#,
    );
    let snap = d.store().snapshot();
    assert_eq!(snap.phase(), Phase::Ended);
    assert!(snap.reveals_all_roles());
    assert!(snap.players().iter().all(|p| p.role().is_some()));
    assert!(snap.player(1).unwrap().is_alive());
    assert!(effects.contains(&Effect::CloseConnection));
}
