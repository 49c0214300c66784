#![no_main]

use bytes::BytesMut;
use honeypotd::core::packet::Packet;
use honeypotd::protocol::mysql::{MySqlSession, DEFAULT_BANNER};
use honeypotd::protocol::Emulator;
use libfuzzer_sys::fuzz_target;
use std::net::SocketAddr;
use std::sync::Arc;

fuzz_target!(|data: &[u8]| {
    let _ = Packet::from_bytes(data);

    let peer = SocketAddr::from(([192, 0, 2, 1], 40000));
    let mut session = MySqlSession::new(Arc::from(DEFAULT_BANNER), 1, peer);
    if session.greeting().is_err() {
        return;
    }

    // Feed attacker bytes the way the supervisor does, never looping without progress
    let mut buf = BytesMut::from(data);
    while let Ok(step) = session.on_data(&mut buf) {
        if step.close.is_some() || !step.progressed {
            break;
        }
    }
});
