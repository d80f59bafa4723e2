#![no_main]

use libfuzzer_sys::fuzz_target;
use werewolf_client::EventDispatcher;

// Newline-separated frames replayed into one game; the reducer must never
// panic and dead players must stay dead.
fuzz_target!(|data: &[u8]| {
    let Ok(text) = std::str::from_utf8(data) else {
        return;
    };
    let mut dispatcher = EventDispatcher::default();
    for frame in text.lines() {
        let before = std::sync::Arc::clone(dispatcher.store().snapshot());
        let _ = dispatcher.dispatch_text(frame);
        let after = dispatcher.store().snapshot();
        if frame.contains("\"game_start\"") {
            continue;
        }
        for p in before.players().iter().filter(|p| !p.is_alive()) {
            if let Some(now) = after.player(p.id()) {
                assert!(!now.is_alive());
            }
        }
    }
});
