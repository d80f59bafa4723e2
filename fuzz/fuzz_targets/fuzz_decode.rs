#![no_main]

use libfuzzer_sys::fuzz_target;
use werewolf_client::dispatcher::{decode, Inbound};

fuzz_target!(|data: &[u8]| {
    let Ok(text) = std::str::from_utf8(data) else {
        return;
    };
    // Anything that decodes as a known event must carry a known kind.
    if let Ok(Inbound::Event(msg)) = decode(text) {
        assert!(werewolf_client::ServerMessage::is_known_kind(msg.kind()));
    }
});
