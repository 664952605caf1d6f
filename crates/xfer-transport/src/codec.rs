//! Frame codec for transfer messages.
//!
//! ```text
//!  Offset  Size  Field
//!  0       1     Frame version (0x01)
//!  1       N     bincode-encoded `XferMessage` (standard config, size-limited)
//! ```
//!
//! The outer message system is free to use its own framing; this codec is the
//! one used in-process (recording message system, fuzzing).

use crate::message::XferMessage;
use thiserror::Error;

/// Current frame version byte.
pub const FRAME_VERSION: u8 = 0x01;

/// Upper bound on an encoded frame, comfortably above a large data packet.
pub const MAX_FRAME_SIZE: usize = 16 * 1024;

/// Frame encoding/decoding errors.
#[derive(Debug, Error)]
pub enum CodecError {
    /// Frame was empty.
    #[error("empty frame")]
    Empty,

    /// Frame version not understood.
    #[error("unsupported frame version {0:#04x}")]
    UnsupportedVersion(u8),

    /// Frame exceeds [`MAX_FRAME_SIZE`].
    #[error("frame too large: {0} bytes")]
    TooLarge(usize),

    /// Bytes left over after the message.
    #[error("{0} trailing bytes after message")]
    TrailingBytes(usize),

    /// Encoding failed.
    #[error("encode failed: {0}")]
    Encode(String),

    /// Decoding failed.
    #[error("decode failed: {0}")]
    Decode(String),
}

fn config() -> impl bincode::config::Config {
    bincode::config::standard().with_limit::<MAX_FRAME_SIZE>()
}

/// Encode a message into a versioned frame.
///
/// # Errors
///
/// Returns `CodecError::Encode` if serialization fails and
/// `CodecError::TooLarge` if the frame would exceed [`MAX_FRAME_SIZE`].
pub fn encode_message(message: &XferMessage) -> Result<Vec<u8>, CodecError> {
    let body = bincode::serde::encode_to_vec(message, config())
        .map_err(|e| CodecError::Encode(e.to_string()))?;
    if body.len() + 1 > MAX_FRAME_SIZE {
        return Err(CodecError::TooLarge(body.len() + 1));
    }

    let mut frame = Vec::with_capacity(body.len() + 1);
    frame.push(FRAME_VERSION);
    frame.extend_from_slice(&body);
    Ok(frame)
}

/// Decode a versioned frame into a message.
///
/// # Errors
///
/// Returns an error for empty, oversized, unknown-version, malformed or
/// over-long frames.
pub fn decode_message(frame: &[u8]) -> Result<XferMessage, CodecError> {
    let (&version, body) = frame.split_first().ok_or(CodecError::Empty)?;
    if frame.len() > MAX_FRAME_SIZE {
        return Err(CodecError::TooLarge(frame.len()));
    }
    if version != FRAME_VERSION {
        return Err(CodecError::UnsupportedVersion(version));
    }

    let (message, consumed): (XferMessage, usize) =
        bincode::serde::decode_from_slice(body, config())
            .map_err(|e| CodecError::Decode(e.to_string()))?;
    if consumed != body.len() {
        return Err(CodecError::TrailingBytes(body.len() - consumed));
    }
    Ok(message)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::{AbortTransfer, ConfirmPacket, RequestTransfer, SendDataPacket};
    use uuid::Uuid;

    fn sample_messages() -> Vec<XferMessage> {
        vec![
            XferMessage::Request(RequestTransfer {
                transfer_id: 0x0123_4567_89AB_CDEF,
                filename: "inventory_d8ab59d2-baf0-0e79-c4c2-a3f99b9fcf45.tmp".into(),
                location: 4,
                delete_on_completion: true,
                use_big_packets: false,
                object_id: Uuid::nil(),
                object_type: -1,
            }),
            XferMessage::Data(SendDataPacket {
                transfer_id: 1,
                packet_number: i32::MIN | 7,
                data: vec![0xAB; 7684],
            }),
            XferMessage::Confirm(ConfirmPacket {
                transfer_id: 1,
                packet_number: 7,
            }),
            XferMessage::Abort(AbortTransfer {
                transfer_id: 1,
                result_code: -23016,
            }),
        ]
    }

    #[test]
    fn test_frames_decode_to_same_message() {
        for msg in sample_messages() {
            let frame = encode_message(&msg).unwrap();
            assert_eq!(frame[0], FRAME_VERSION);
            assert_eq!(decode_message(&frame).unwrap(), msg);
        }
    }

    #[test]
    fn test_reject_empty_and_bad_version() {
        assert!(matches!(decode_message(&[]), Err(CodecError::Empty)));

        let mut frame = encode_message(&sample_messages()[2]).unwrap();
        frame[0] = 0x7F;
        assert!(matches!(
            decode_message(&frame),
            Err(CodecError::UnsupportedVersion(0x7F))
        ));
    }

    #[test]
    fn test_reject_trailing_bytes() {
        let mut frame = encode_message(&sample_messages()[3]).unwrap();
        frame.extend_from_slice(&[0, 0]);
        assert!(matches!(
            decode_message(&frame),
            Err(CodecError::TrailingBytes(2))
        ));
    }

    #[test]
    fn test_reject_truncated() {
        let frame = encode_message(&sample_messages()[1]).unwrap();
        assert!(decode_message(&frame[..frame.len() / 2]).is_err());
    }

    #[test]
    fn test_reject_oversized_payload() {
        let msg = XferMessage::Data(SendDataPacket {
            transfer_id: 1,
            packet_number: 0,
            data: vec![0; MAX_FRAME_SIZE],
        });
        assert!(encode_message(&msg).is_err());
    }

    mod props {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn prop_decode_never_panics(bytes in prop::collection::vec(any::<u8>(), 0..512)) {
                let _ = decode_message(&bytes);
            }

            #[test]
            fn prop_data_packets_survive_framing(
                id in any::<u64>(),
                num in any::<i32>(),
                data in prop::collection::vec(any::<u8>(), 0..2048),
            ) {
                let msg = XferMessage::Data(SendDataPacket {
                    transfer_id: id,
                    packet_number: num,
                    data,
                });
                let frame = encode_message(&msg).unwrap();
                prop_assert_eq!(decode_message(&frame).unwrap(), msg);
            }
        }
    }
}
