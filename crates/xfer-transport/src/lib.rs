//! # XFER Transport
//!
//! The seam between the transfer layer and the outer message system.
//!
//! This crate provides:
//! - The four transfer wire messages and their logical fields
//! - A binary frame codec for those messages
//! - The `MessageSystem` trait (reliable/unreliable send, handler registration,
//!   circuit bookkeeping) the transfer manager drives
//! - A recording message system that captures outbound frames in-process

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod codec;
pub mod message;
pub mod recording;
pub mod system;

pub use codec::{CodecError, decode_message, encode_message};
pub use message::{
    AbortTransfer, ConfirmPacket, Inbound, MessageKind, RequestTransfer, SendDataPacket,
    XferMessage,
};
pub use recording::{Outbound, RecordingMessageSystem};
pub use system::{CircuitInfo, MessageSystem};
