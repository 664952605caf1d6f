//! Packet numbering and payload sizing.
//!
//! A wire packet number packs a 28-bit sequence number with a last-packet
//! flag in the top bit. Packet 0 carries the total transfer size as a
//! little-endian `i32` in front of its payload.

/// Payload bytes per packet by default.
pub const DEFAULT_CHUNK_SIZE: usize = 1000;

/// Payload bytes per packet when big packets are requested.
pub const LARGE_CHUNK_SIZE: usize = 7680;

/// Length of the total-size prefix on packet 0.
pub const SIZE_PREFIX_LEN: usize = 4;

/// Largest payload accepted on an inbound data packet.
pub const MAX_INBOUND_PAYLOAD: usize = LARGE_CHUNK_SIZE + SIZE_PREFIX_LEN;

/// Top bit, set on the last packet of a transfer.
pub const LAST_PACKET_FLAG: u32 = 0x8000_0000;

/// Low 28 bits carrying the sequence number.
pub const SEQUENCE_MASK: u32 = 0x0FFF_FFFF;

/// Payload size a transfer was negotiated with.
///
/// Peers agree on the meaning of `Large` out of band; the request only
/// carries a flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum PacketSize {
    /// [`DEFAULT_CHUNK_SIZE`] bytes
    #[default]
    Default,
    /// [`LARGE_CHUNK_SIZE`] bytes
    Large,
}

impl PacketSize {
    /// Size for a request's big-packets flag.
    #[must_use]
    pub const fn from_big_packets(use_big_packets: bool) -> Self {
        if use_big_packets {
            Self::Large
        } else {
            Self::Default
        }
    }

    /// Whether this is the large size.
    #[must_use]
    pub const fn is_large(self) -> bool {
        matches!(self, Self::Large)
    }

    /// Payload bytes per packet.
    #[must_use]
    pub const fn bytes(self) -> usize {
        match self {
            Self::Default => DEFAULT_CHUNK_SIZE,
            Self::Large => LARGE_CHUNK_SIZE,
        }
    }
}

/// Encode a sequence number, flagging the last packet.
#[must_use]
pub const fn encode_packet_num(packet_num: i32, is_last: bool) -> i32 {
    if is_last {
        ((packet_num as u32) | LAST_PACKET_FLAG) as i32
    } else {
        packet_num
    }
}

/// Sequence number of a wire packet number.
#[must_use]
pub const fn decode_packet_num(raw: i32) -> i32 {
    ((raw as u32) & SEQUENCE_MASK) as i32
}

/// Whether a wire packet number carries the last-packet flag.
#[must_use]
pub const fn is_last_packet(raw: i32) -> bool {
    (raw as u32) & LAST_PACKET_FLAG != 0
}

/// Total-size prefix for packet 0.
#[must_use]
pub const fn encode_size_prefix(total_size: i32) -> [u8; SIZE_PREFIX_LEN] {
    total_size.to_le_bytes()
}

/// Split packet 0's payload into the declared total size and the data after it.
///
/// Returns `None` when the payload is too short to hold the prefix.
#[must_use]
pub fn split_size_prefix(payload: &[u8]) -> Option<(i32, &[u8])> {
    let (prefix, rest) = payload.split_first_chunk::<SIZE_PREFIX_LEN>()?;
    Some((i32::from_le_bytes(*prefix), rest))
}
