//! Transfer wire messages.
//!
//! Four message kinds drive the protocol:
//!
//! ```text
//! Requester                         Server
//!     |                               |
//!     |-- RequestTransfer ----------->|
//!     |<-------- SendDataPacket (0) --|   first payload carries a 4-byte size
//!     |-- ConfirmPacket (0) --------->|
//!     |<-------- SendDataPacket (1) --|
//!     |-- ConfirmPacket (1) --------->|
//!     |               ...             |
//!     |<-- SendDataPacket (N | EOF) --|
//!     |-- ConfirmPacket (N) --------->|
//! ```
//!
//! Either side may send `AbortTransfer` to end a transfer early.
//!
//! These are logical shapes only; the outer message system owns serialization
//! (see [`crate::codec`] for the frame format used in-process).

use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::SocketAddr;
use uuid::Uuid;

/// Request that the receiving host start sending a transfer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestTransfer {
    /// Transfer id chosen by the requester.
    pub transfer_id: u64,
    /// Remote file name; empty for object and registered-memory requests.
    pub filename: String,
    /// Location kind the file name is relative to.
    pub location: u8,
    /// Ask the server to delete its source once the transfer completes.
    pub delete_on_completion: bool,
    /// Use the large payload size for data packets.
    pub use_big_packets: bool,
    /// Object id for content-addressed transfers; nil otherwise.
    pub object_id: Uuid,
    /// Object type for content-addressed transfers; -1 otherwise.
    pub object_type: i16,
}

/// One data packet of a transfer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SendDataPacket {
    /// Transfer id.
    pub transfer_id: u64,
    /// Sequence number in the low 28 bits, top bit set on the last packet.
    pub packet_number: i32,
    /// Payload bytes.
    pub data: Vec<u8>,
}

/// Acknowledgement of one data packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfirmPacket {
    /// Transfer id.
    pub transfer_id: u64,
    /// Decoded sequence number being confirmed.
    pub packet_number: u32,
}

/// Early termination of a transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AbortTransfer {
    /// Transfer id.
    pub transfer_id: u64,
    /// Wire status code describing why.
    pub result_code: i32,
}

/// Any transfer message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum XferMessage {
    /// See [`RequestTransfer`].
    Request(RequestTransfer),
    /// See [`SendDataPacket`].
    Data(SendDataPacket),
    /// See [`ConfirmPacket`].
    Confirm(ConfirmPacket),
    /// See [`AbortTransfer`].
    Abort(AbortTransfer),
}

impl XferMessage {
    /// The kind of this message, used for handler registration.
    #[must_use]
    pub fn kind(&self) -> MessageKind {
        match self {
            Self::Request(_) => MessageKind::RequestTransfer,
            Self::Data(_) => MessageKind::SendDataPacket,
            Self::Confirm(_) => MessageKind::ConfirmPacket,
            Self::Abort(_) => MessageKind::AbortTransfer,
        }
    }

    /// Transfer id carried by the message.
    #[must_use]
    pub fn transfer_id(&self) -> u64 {
        match self {
            Self::Request(m) => m.transfer_id,
            Self::Data(m) => m.transfer_id,
            Self::Confirm(m) => m.transfer_id,
            Self::Abort(m) => m.transfer_id,
        }
    }
}

/// Message kinds a transfer manager registers handlers for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageKind {
    /// Inbound "give me this file".
    RequestTransfer,
    /// Inbound data packet.
    SendDataPacket,
    /// Inbound packet confirmation.
    ConfirmPacket,
    /// Inbound abort.
    AbortTransfer,
}

impl MessageKind {
    /// All kinds, in registration order.
    pub const ALL: [MessageKind; 4] = [
        MessageKind::ConfirmPacket,
        MessageKind::RequestTransfer,
        MessageKind::SendDataPacket,
        MessageKind::AbortTransfer,
    ];
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::RequestTransfer => write!(f, "RequestXfer"),
            Self::SendDataPacket => write!(f, "SendXferPacket"),
            Self::ConfirmPacket => write!(f, "ConfirmXferPacket"),
            Self::AbortTransfer => write!(f, "AbortXfer"),
        }
    }
}

/// A message delivered by the outer system, with the host that sent it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Inbound {
    /// Sending host.
    pub sender: SocketAddr,
    /// The message.
    pub message: XferMessage,
}

impl Inbound {
    /// Wrap a message received from `sender`.
    #[must_use]
    pub fn new(sender: SocketAddr, message: XferMessage) -> Self {
        Self { sender, message }
    }
}
