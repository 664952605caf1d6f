//! The outer message system, as seen by the transfer layer.

use crate::message::{MessageKind, XferMessage};
use std::net::SocketAddr;

/// Circuit bookkeeping for one remote host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CircuitInfo {
    /// Circuit still exchanging traffic.
    pub alive: bool,
    /// Circuit belongs to a trusted (internal) peer.
    pub trusted: bool,
}

impl CircuitInfo {
    /// A live, untrusted circuit.
    #[must_use]
    pub const fn untrusted() -> Self {
        Self {
            alive: true,
            trusted: false,
        }
    }

    /// A live, trusted circuit.
    #[must_use]
    pub const fn trusted() -> Self {
        Self {
            alive: true,
            trusted: true,
        }
    }
}

/// Message system the transfer manager sends through.
///
/// Implementations frame and deliver messages between hosts and own the
/// circuit table. All calls are fire-and-forget; delivery failures surface
/// later as timeouts or dead circuits.
pub trait MessageSystem {
    /// Send a message that the system retries until acknowledged.
    fn send_reliable(&mut self, host: SocketAddr, message: XferMessage);

    /// Send a message without delivery guarantees.
    fn send_message(&mut self, host: SocketAddr, message: XferMessage);

    /// Route inbound messages of `kind` to the transfer manager.
    fn register_handler(&mut self, kind: MessageKind);

    /// Circuit bookkeeping for `host`, if a circuit exists.
    fn circuit_info(&self, host: &SocketAddr) -> Option<CircuitInfo>;

    /// Tear down the circuit to `host`.
    fn disable_circuit(&mut self, host: &SocketAddr);

    /// Whether the circuit to `host` exists and is alive.
    fn is_circuit_alive(&self, host: &SocketAddr) -> bool {
        self.circuit_info(host).is_some_and(|c| c.alive)
    }

    /// Whether the circuit to `host` exists and is trusted.
    fn is_trusted_circuit(&self, host: &SocketAddr) -> bool {
        self.circuit_info(host).is_some_and(|c| c.trusted)
    }
}
