//! Fuzz target for inbound message handling
//!
//! Feeds a sequence of arbitrary frames from two hosts into a manager that
//! has one registered buffer and one download in flight.

#![no_main]

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use std::net::SocketAddr;
use xfer_core::{XferConfig, XferManager};
use xfer_files::LocationKind;
use xfer_transport::{CircuitInfo, RecordingMessageSystem};

#[derive(Debug, Arbitrary)]
struct Input {
    frames: Vec<(bool, Vec<u8>)>,
    ticks: u8,
}

fuzz_target!(|input: Input| {
    let peer = SocketAddr::from(([10, 0, 0, 2], 13000));
    let stranger = SocketAddr::from(([10, 0, 0, 3], 13000));

    let mut transport = RecordingMessageSystem::new();
    transport.add_circuit(peer, CircuitInfo::untrusted());
    transport.add_circuit(stranger, CircuitInfo::untrusted());
    let config = XferConfig::with_dirs(std::env::temp_dir().join("xfer-fuzz-cache"), std::env::temp_dir());
    let Ok(mut manager) = XferManager::new(transport, config) else {
        return;
    };
    manager.register_xfer(vec![0x5a; 2500]);
    manager.request_memory("fuzzed_1.tmp", LocationKind::Cache, peer, false, None, false);

    for (from_peer, frame) in &input.frames {
        let sender = if *from_peer { peer } else { stranger };
        let _ = manager.dispatch_frame(sender, frame);
    }
    for _ in 0..input.ticks % 8 {
        manager.retransmit_unacked_packets();
    }
    manager.transport_mut().take_outbound();
});
