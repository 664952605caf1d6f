//! Fuzz target for configuration parsing
//!
//! Any configuration that parses has passed validation, so a manager can be
//! built from it.

#![no_main]

use libfuzzer_sys::fuzz_target;
use xfer_core::{XferConfig, XferManager};
use xfer_transport::RecordingMessageSystem;

fuzz_target!(|data: &[u8]| {
    let Ok(text) = std::str::from_utf8(data) else {
        return;
    };
    if let Ok(config) = XferConfig::from_toml_str(text) {
        assert!(config.effective_ack_throttle_bps() >= config.ack_throttle_bps);
        assert!(XferManager::new(RecordingMessageSystem::new(), config).is_ok());
    }
});
