//! In-process message system that records outbound frames.
//!
//! Every outbound message is run through the frame codec and queued, so
//! whatever a caller drains is exactly what would have gone on the wire.
//! Circuits are declared explicitly; a host with no declared circuit has no
//! bookkeeping at all.

use crate::codec::{CodecError, decode_message, encode_message};
use crate::message::{MessageKind, XferMessage};
use crate::system::{CircuitInfo, MessageSystem};
use std::collections::{HashMap, VecDeque};
use std::net::SocketAddr;

/// One recorded outbound frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Outbound {
    /// Destination host.
    pub host: SocketAddr,
    /// Sent through the reliable path.
    pub reliable: bool,
    /// Encoded frame.
    pub frame: Vec<u8>,
}

impl Outbound {
    /// Decode the recorded frame.
    ///
    /// # Errors
    ///
    /// Returns the codec error if the frame does not decode.
    pub fn message(&self) -> Result<XferMessage, CodecError> {
        decode_message(&self.frame)
    }
}

/// Message system that records instead of delivering.
#[derive(Debug, Default)]
pub struct RecordingMessageSystem {
    outbound: VecDeque<Outbound>,
    circuits: HashMap<SocketAddr, CircuitInfo>,
    disabled: Vec<SocketAddr>,
    handlers: Vec<MessageKind>,
    encode_failures: usize,
}

impl RecordingMessageSystem {
    /// Create an empty recorder with no circuits.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare (or replace) the circuit to `host`.
    pub fn add_circuit(&mut self, host: SocketAddr, info: CircuitInfo) {
        self.circuits.insert(host, info);
    }

    /// Mark the circuit to `host` alive or dead. No-op if no circuit exists.
    pub fn set_alive(&mut self, host: &SocketAddr, alive: bool) {
        if let Some(info) = self.circuits.get_mut(host) {
            info.alive = alive;
        }
    }

    /// Hosts whose circuits were disabled, in order.
    #[must_use]
    pub fn disabled_circuits(&self) -> &[SocketAddr] {
        &self.disabled
    }

    /// Message kinds registered so far.
    #[must_use]
    pub fn registered_handlers(&self) -> &[MessageKind] {
        &self.handlers
    }

    /// Number of frames waiting to be drained.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.outbound.len()
    }

    /// Messages that failed to encode and were dropped.
    #[must_use]
    pub fn encode_failures(&self) -> usize {
        self.encode_failures
    }

    /// Drain all recorded frames.
    pub fn take_outbound(&mut self) -> Vec<Outbound> {
        self.outbound.drain(..).collect()
    }

    /// Drain all recorded frames, decoded. Frames that fail to decode are skipped.
    pub fn drain_messages(&mut self) -> Vec<(SocketAddr, XferMessage)> {
        self.outbound
            .drain(..)
            .filter_map(|out| match out.message() {
                Ok(msg) => Some((out.host, msg)),
                Err(e) => {
                    tracing::warn!("Dropping undecodable recorded frame to {}: {}", out.host, e);
                    None
                }
            })
            .collect()
    }

    fn record(&mut self, host: SocketAddr, message: &XferMessage, reliable: bool) {
        match encode_message(message) {
            Ok(frame) => {
                tracing::trace!(
                    "Recorded {} frame ({} bytes) to {}",
                    message.kind(),
                    frame.len(),
                    host
                );
                self.outbound.push_back(Outbound {
                    host,
                    reliable,
                    frame,
                });
            }
            Err(e) => {
                self.encode_failures += 1;
                tracing::warn!("Failed to encode {} to {}: {}", message.kind(), host, e);
            }
        }
    }
}

impl MessageSystem for RecordingMessageSystem {
    fn send_reliable(&mut self, host: SocketAddr, message: XferMessage) {
        self.record(host, &message, true);
    }

    fn send_message(&mut self, host: SocketAddr, message: XferMessage) {
        self.record(host, &message, false);
    }

    fn register_handler(&mut self, kind: MessageKind) {
        if !self.handlers.contains(&kind) {
            self.handlers.push(kind);
        }
    }

    fn circuit_info(&self, host: &SocketAddr) -> Option<CircuitInfo> {
        self.circuits.get(host).copied()
    }

    fn disable_circuit(&mut self, host: &SocketAddr) {
        tracing::info!("Disabling circuit for {}", host);
        self.set_alive(host, false);
        self.disabled.push(*host);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::ConfirmPacket;

    fn host(port: u16) -> SocketAddr {
        SocketAddr::from(([127, 0, 0, 1], port))
    }

    #[test]
    fn test_records_and_drains_in_order() {
        let mut sys = RecordingMessageSystem::new();
        for n in 0..3 {
            sys.send_message(
                host(9000),
                XferMessage::Confirm(ConfirmPacket {
                    transfer_id: 5,
                    packet_number: n,
                }),
            );
        }
        assert_eq!(sys.pending(), 3);

        let drained = sys.drain_messages();
        assert_eq!(drained.len(), 3);
        assert_eq!(sys.pending(), 0);
        for (n, (to, msg)) in drained.into_iter().enumerate() {
            assert_eq!(to, host(9000));
            assert_eq!(
                msg,
                XferMessage::Confirm(ConfirmPacket {
                    transfer_id: 5,
                    packet_number: n as u32,
                })
            );
        }
    }

    #[test]
    fn test_reliable_flag_recorded() {
        let mut sys = RecordingMessageSystem::new();
        let msg = XferMessage::Confirm(ConfirmPacket {
            transfer_id: 1,
            packet_number: 0,
        });
        sys.send_reliable(host(1), msg.clone());
        sys.send_message(host(1), msg);
        let out = sys.take_outbound();
        assert!(out[0].reliable);
        assert!(!out[1].reliable);
    }

    #[test]
    fn test_circuit_bookkeeping() {
        let mut sys = RecordingMessageSystem::new();
        assert!(sys.circuit_info(&host(1)).is_none());
        assert!(!sys.is_circuit_alive(&host(1)));

        sys.add_circuit(host(1), CircuitInfo::trusted());
        assert!(sys.is_circuit_alive(&host(1)));
        assert!(sys.is_trusted_circuit(&host(1)));

        sys.disable_circuit(&host(1));
        assert!(!sys.is_circuit_alive(&host(1)));
        assert_eq!(sys.disabled_circuits(), &[host(1)]);
    }

    #[test]
    fn test_register_handler_deduplicates() {
        let mut sys = RecordingMessageSystem::new();
        for kind in MessageKind::ALL {
            sys.register_handler(kind);
            sys.register_handler(kind);
        }
        assert_eq!(sys.registered_handlers().len(), 4);
    }
}
