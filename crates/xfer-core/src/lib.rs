//! # XFER Core
//!
//! Reliable, windowed, retry-driven bulk transfers over an unreliable
//! message system.
//!
//! This crate provides:
//! - Transfer units for files, memory buffers and store objects
//! - The transfer manager: send/receive queues, per-host admission control,
//!   flood protection, retransmission and confirmation throttling
//! - The filename policy applied to inbound requests
//! - An async driver that owns a manager and runs its tick
//!
//! ## Packet format
//!
//! Each data packet carries up to 1000 payload bytes (7680 with big
//! packets). Packet 0 is prefixed with the 4-byte total size. The sequence
//! number's top bit marks the last packet:
//!
//! ```text
//!  31  30                 28 27                                  0
//! +---+---------------------+-------------------------------------+
//! |EOF|      reserved       |          sequence number            |
//! +---+---------------------+-------------------------------------+
//! ```
//!
//! Every packet is confirmed before the next one is sent; an unconfirmed
//! packet is resent after the packet timeout until the retry limit is used up.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod clock;
pub mod completion;
pub mod config;
pub mod driver;
pub mod error;
pub mod host_status;
pub mod ids;
pub mod list;
pub mod manager;
pub mod packet;
pub mod security;
pub mod throttle;
pub mod xfer;

pub use clock::{Clock, ManualClock, SystemClock};
pub use completion::{Completion, XferOutcome};
pub use config::XferConfig;
pub use driver::{DriverInput, ManagerCall, XferDriver};
pub use error::{ErrorCode, Result, XferError, XferStatus, status_from_wire, status_to_wire};
pub use host_status::{HostStatus, HostStatusTable};
pub use ids::TransferId;
pub use list::XferList;
pub use manager::{AckInfo, FileRequest, XferManager};
pub use packet::PacketSize;
pub use security::{ExpectedFiles, FilenameRejection, check_requested_filename, verify_cache_filename};
pub use xfer::{FileXfer, MemoryXfer, ObjectXfer, Xfer, XferKind, XferState};
